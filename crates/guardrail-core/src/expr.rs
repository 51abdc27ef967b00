//! Custom composition expressions.
//!
//! Grammar (whitespace-insensitive):
//!
//! ```text
//! expr  := call | guard
//! call  := ("allOf" | "anyOf" | "not") "(" expr ("," expr)* ")"
//! guard := [A-Za-z0-9_.:-]+
//! ```
//!
//! `all_of` / `any_of` are accepted as spellings of the combinators.
//! Evaluation is three-valued: a guard whose result was skipped carries no
//! information (`None`) and is ignored by the combinators it appears in.
//! The parser is panic-free and bounds nesting depth.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{GuardrailError, Result};

const MAX_DEPTH: usize = 32;

/// Parsed boolean expression over guard outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Guard(String),
    AllOf(Vec<Expr>),
    AnyOf(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn parse(src: &str) -> Result<Expr> {
        let mut p = Parser {
            src,
            chars: src.char_indices().peekable(),
        };
        let expr = p.expr(0)?;
        p.skip_ws();
        if let Some((pos, c)) = p.chars.next() {
            return Err(GuardrailError::Config(format!(
                "unexpected '{c}' at offset {pos} in expression: {src}"
            )));
        }
        Ok(expr)
    }

    /// Every guard key the expression references.
    pub fn guards(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Guard(g) => {
                out.insert(g.as_str());
            }
            Expr::AllOf(xs) | Expr::AnyOf(xs) => xs.iter().for_each(|x| x.collect(out)),
            Expr::Not(x) => x.collect(out),
        }
    }

    /// Evaluate against completed outcomes.
    ///
    /// `outcomes[key] = Some(passed)` for counted results, `None` for skipped
    /// ones. A key absent from the map is an aggregation error.
    pub fn evaluate(&self, outcomes: &HashMap<String, Option<bool>>) -> Result<Option<bool>> {
        match self {
            Expr::Guard(g) => outcomes.get(g).copied().ok_or_else(|| {
                GuardrailError::Aggregation(format!("expression references unknown guard: {g}"))
            }),
            Expr::AllOf(xs) => {
                let mut seen = false;
                for x in xs {
                    match x.evaluate(outcomes)? {
                        Some(false) => return Ok(Some(false)),
                        Some(true) => seen = true,
                        None => {}
                    }
                }
                Ok(seen.then_some(true))
            }
            Expr::AnyOf(xs) => {
                let mut seen = false;
                for x in xs {
                    match x.evaluate(outcomes)? {
                        Some(true) => return Ok(Some(true)),
                        Some(false) => seen = true,
                        None => {}
                    }
                }
                Ok(seen.then_some(false))
            }
            Expr::Not(x) => Ok(x.evaluate(outcomes)?.map(|v| !v)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, xs: &[Expr]) -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{x}")?;
            }
            f.write_str(")")
        }
        match self {
            Expr::Guard(g) => f.write_str(g),
            Expr::AllOf(xs) => list(f, "allOf", xs),
            Expr::AnyOf(xs) => list(f, "anyOf", xs),
            Expr::Not(x) => write!(f, "not({x})"),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn err(&self, msg: impl fmt::Display) -> GuardrailError {
        GuardrailError::Config(format!("{msg} in expression: {}", self.src))
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn ident(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let start = match self.chars.peek() {
            Some(&(pos, c)) if is_ident_char(c) => pos,
            Some(&(pos, c)) => return Err(self.err(format!("unexpected '{c}' at offset {pos}"))),
            None => return Err(self.err("unexpected end")),
        };
        let mut end = start;
        while let Some(&(pos, c)) = self.chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            end = pos + c.len_utf8();
            self.chars.next();
        }
        Ok(&self.src[start..end])
    }

    fn expect(&mut self, want: char) -> Result<()> {
        self.skip_ws();
        match self.chars.next() {
            Some((_, c)) if c == want => Ok(()),
            Some((pos, c)) => Err(self.err(format!(
                "expected '{want}' but found '{c}' at offset {pos}"
            ))),
            None => Err(self.err(format!("expected '{want}' but reached end"))),
        }
    }

    fn expr(&mut self, depth: usize) -> Result<Expr> {
        if depth > MAX_DEPTH {
            return Err(self.err("nesting too deep"));
        }
        let name = self.ident()?;
        self.skip_ws();
        if !matches!(self.chars.peek(), Some((_, '('))) {
            return Ok(Expr::Guard(name.to_string()));
        }
        self.chars.next();

        let mut args = vec![self.expr(depth + 1)?];
        loop {
            self.skip_ws();
            match self.chars.next() {
                Some((_, ',')) => args.push(self.expr(depth + 1)?),
                Some((_, ')')) => break,
                Some((pos, c)) => return Err(self.err(format!("unexpected '{c}' at offset {pos}"))),
                None => return Err(self.err("unclosed '('")),
            }
        }

        match name {
            "allOf" | "all_of" => Ok(Expr::AllOf(args)),
            "anyOf" | "any_of" => Ok(Expr::AnyOf(args)),
            "not" => {
                if args.len() != 1 {
                    return Err(self.err("not() takes exactly one argument"));
                }
                let inner = args.pop().ok_or_else(|| self.err("not() takes exactly one argument"))?;
                Ok(Expr::Not(Box::new(inner)))
            }
            other => Err(self.err(format!("unknown combinator '{other}'"))),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn display_is_canonical() {
        let e = Expr::parse(" all_of( a ,anyOf(b,not(c)) ) ").unwrap();
        assert_eq!(e.to_string(), "allOf(a, anyOf(b, not(c)))");
    }

    #[test]
    fn expect_reports_offset() {
        let err = Expr::parse("allOf(a b)").unwrap_err();
        assert!(err.to_string().contains("offset 8"), "{err}");
    }
}

//! JSON test vector loader shared by expression tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::fs;

use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct ExprVector {
    pub description: String,
    pub expression: String,
    /// guard key -> passed (null = skipped)
    #[serde(default)]
    pub outcomes: HashMap<String, Option<bool>>,
    /// Missing = no expectation; `null` = expect "no information".
    #[serde(default, deserialize_with = "present")]
    pub expect: Option<Option<bool>>,
    #[serde(default)]
    pub expect_guards: Option<Vec<String>>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

fn present<'de, D>(d: D) -> Result<Option<Option<bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(d).map(Some)
}

pub fn load(name: &str) -> Vec<ExprVector> {
    let s = fs::read_to_string(format!("tests/vectors/{name}"))
        .unwrap_or_else(|e| panic!("read vector file {name}: {e}"));
    serde_json::from_str(&s).expect("invalid vector json")
}

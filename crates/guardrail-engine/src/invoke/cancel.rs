//! Cooperative cancellation token.
//!
//! Built on `tokio::sync::watch`: cancelling flips the channel to `true` and
//! every clone or child observes it. Children are cancelled with their parent
//! but can also be cancelled on their own (per-guard timeout).

use std::sync::Arc;

use futures_util::future::select_all;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    /// Own receiver first, then every ancestor's.
    chain: Vec<watch::Receiver<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            chain: vec![rx],
        }
    }

    /// Token cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        let (tx, rx) = watch::channel(false);
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(rx);
        chain.extend(self.chain.iter().cloned());
        Self {
            tx: Arc::new(tx),
            chain,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once cancelled. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let waits = self.chain.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                if rx.wait_for(|v| *v).await.is_err() {
                    // sender dropped without cancelling
                    std::future::pending::<()>().await;
                }
            })
        });
        select_all(waits).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn child_observes_parent_cancel() {
        let parent = CancelToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        let waiter = tokio::spawn({
            let child = child.clone();
            async move { child.cancelled().await }
        });
        parent.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("child wakes")
            .expect("join");
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn child_cancel_does_not_reach_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}

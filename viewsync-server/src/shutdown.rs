//! Process-wide shutdown signal.

use std::sync::Arc;

use tokio::sync::watch;

/// One-shot, cloneable shutdown flag.
///
/// Triggered by ctrl-c or by the `closeAll` call; every clone observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Start shutting down. Returns `false` if already triggered.
    pub fn trigger(&self) -> bool {
        let first = !self.tx.send_replace(true);
        if first {
            tracing::info!("Shutdown requested");
        }
        first
    }

    /// Whether shutdown has started.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has started.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this can only end by seeing `true`.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

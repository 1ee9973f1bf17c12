//! Process lifecycle state shared by the check loops

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Whether periodic checks may run
///
/// Cloned into every loop. Application up/down signals flip it; while it is
/// down each cycle is a no-op.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<bool>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let (tx, _) = watch::channel(enabled);
        Self { tx: Arc::new(tx) }
    }

    /// Enable checks
    pub fn up(&self) {
        if !self.tx.send_replace(true) {
            info!("application up, checks enabled");
        }
    }

    /// Disable checks
    pub fn down(&self) {
        if self.tx.send_replace(false) {
            info!("application down, checks disabled");
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Watch for lifecycle changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let lifecycle = Lifecycle::new(false);
        let other = lifecycle.clone();

        other.up();
        assert!(lifecycle.is_enabled());

        lifecycle.down();
        assert!(!other.is_enabled());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let lifecycle = Lifecycle::new(false);
        let mut rx = lifecycle.subscribe();

        lifecycle.up();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}

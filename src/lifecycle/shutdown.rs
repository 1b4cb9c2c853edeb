//! Shutdown coordination for the server and its background tasks.

use tokio::sync::broadcast;

/// Broadcast handle for graceful shutdown.
///
/// The server and the config watcher subscribe; whoever owns the handle
/// triggers it once.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Returns how many were listening.
    pub fn trigger(&self) -> usize {
        let listeners = self.tx.send(()).unwrap_or(0);
        tracing::info!(listeners, "Shutdown triggered");
        listeners
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Resolves on `trigger` or Ctrl+C, whichever comes first.
    pub async fn signalled(&self) {
        let mut rx = self.subscribe();
        tokio::select! {
            _ = rx.recv() => tracing::info!("Shutdown requested"),
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
            },
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);
        assert_eq!(shutdown.trigger(), 1);
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_signalled_resolves_on_trigger() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.signalled().await })
        };
        while shutdown.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("signalled() did not resolve")
            .unwrap();
    }

    #[test]
    fn test_trigger_without_listeners() {
        assert_eq!(Shutdown::default().trigger(), 0);
    }
}

//! Shutdown coordination.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::routing::DispatchTable;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
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

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Future that completes once [`Shutdown::trigger`] has been called.
    pub fn signalled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove every registration and wait up to `timeout` for in-flight requests to drain.
///
/// Returns the number of registrations still draining when the deadline passed.
pub async fn drain_table(table: &DispatchTable, timeout: Duration) -> usize {
    let registrations = table.shutdown();

    let drained = futures_util::future::join_all(registrations.iter().map(|r| r.drained()));
    let pending = if tokio::time::timeout(timeout, drained).await.is_ok() {
        tracing::info!(registrations = registrations.len(), "All registrations drained");
        0
    } else {
        let pending = registrations.iter().filter(|r| !r.is_destroyed()).count();
        tracing::warn!(pending, timeout = ?timeout, "Drain deadline passed");
        pending
    };
    drop(registrations);
    table.attributes().sweep();
    pending
}

pub mod pending_sweeper;

use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Owns the host's background tasks and the shutdown signal they listen on.
pub struct BackgroundCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn `make(shutdown_rx)` and keep its handle for [`shutdown`](Self::shutdown).
    pub fn spawn<F, Fut>(&mut self, name: &'static str, make: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(make(self.subscribe_shutdown()));
        self.tasks.push((name, handle));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task, then wait for each to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::warn!("background task {} ended abnormally: {}", name, e);
            }
        }
    }
}

impl Default for BackgroundCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

use crate::metadata::MetadataStore;
use crate::tenant::TenantRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Background loop
// ---------------------------------------------------------------------------

/// Periodically retries tenants whose records are still `pending_init`.
pub async fn run(
    store: Arc<MetadataStore>,
    registry: Arc<TenantRegistry>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so startup is not delayed.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&store, &registry).await;
            }
            _ = shutdown_rx.recv() => {
                info!("pending_sweeper: shutdown signal received");
                break;
            }
        }
    }
}

/// One pass. Returns how many pending tenants came up.
pub async fn sweep(store: &MetadataStore, registry: &TenantRegistry) -> usize {
    let pending = match store.list_pending() {
        Ok(records) => records,
        Err(e) => {
            warn!("pending_sweeper: failed to list pending tenants: {}", e);
            return 0;
        }
    };

    let mut recovered = 0;
    for record in pending {
        if registry.has(&record.name) {
            continue;
        }
        match registry.get_or_create(&record.name).await {
            Ok(_) => {
                recovered += 1;
                info!("pending_sweeper: tenant {} initialized", record.name);
            }
            Err(e) => debug!("pending_sweeper: tenant {} still failing: {}", record.name, e),
        }
    }
    recovered
}

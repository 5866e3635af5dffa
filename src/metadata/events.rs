//! Metadata event bus: created/destroyed notifications for tenant records.
//!
//! Created handlers run sequentially and are awaited before `create` returns,
//! so their failure can abort the create. Destroyed handlers run after the
//! delete is durable; their errors are only logged.

use crate::metadata::TenantRecord;
use crate::tenant::TenantError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ── Handler ─────────────────────────────────────────────────────

#[async_trait]
pub trait TenantEventHandler: Send + Sync {
    async fn on_created(&self, _record: &TenantRecord) -> Result<(), TenantError> {
        Ok(())
    }

    async fn on_destroyed(&self, _name: &str) -> Result<(), TenantError> {
        Ok(())
    }
}

// ── Bus ─────────────────────────────────────────────────────────

pub struct MetadataEvents {
    handlers: RwLock<Vec<(u64, Arc<dyn TenantEventHandler>)>>,
    next_handler_id: AtomicU64,
}

impl Default for MetadataEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataEvents {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to events. Returns a handle ID for unsubscribing.
    pub fn subscribe(&self, handler: Arc<dyn TenantEventHandler>) -> u64 {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.handlers.write().retain(|(hid, _)| *hid != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn TenantEventHandler>> {
        self.handlers.read().iter().map(|(_, h)| h.clone()).collect()
    }

    /// Stops at the first failing handler.
    pub async fn emit_created(&self, record: &TenantRecord) -> Result<(), TenantError> {
        for handler in self.snapshot() {
            handler.on_created(record).await?;
        }
        Ok(())
    }

    pub async fn emit_destroyed(&self, name: &str) {
        for handler in self.snapshot() {
            if let Err(e) = handler.on_destroyed(name).await {
                tracing::warn!("destroyed handler failed for tenant {}: {}", name, e);
            }
        }
    }
}

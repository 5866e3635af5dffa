//! Keeps the registry in step with the metadata store.
//!
//! [`LifecycleSync`] reacts to created/destroyed events; [`MetadataGate`]
//! guards registry misses so only tenants with a record are initialized.

use crate::metadata::{MetadataStore, TenantEventHandler, TenantRecord};
use crate::tenant::error::TenantError;
use crate::tenant::registry::{TenantGate, TenantRegistry};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// Holds the registry weakly: the registry owns the gate, which owns the
/// store, which owns this handler.
pub struct LifecycleSync {
    registry: Weak<TenantRegistry>,
}

impl LifecycleSync {
    pub fn new(registry: &Arc<TenantRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    /// Subscribe a new handler to `store`'s events.
    pub fn attach(store: &MetadataStore, registry: &Arc<TenantRegistry>) -> u64 {
        store.events().subscribe(Arc::new(Self::new(registry)))
    }
}

#[async_trait]
impl TenantEventHandler for LifecycleSync {
    async fn on_created(&self, record: &TenantRecord) -> Result<(), TenantError> {
        let Some(registry) = self.registry.upgrade() else {
            tracing::debug!("registry gone, skipping init of {}", record.name);
            return Ok(());
        };
        registry.register(&record.name).await.map(|_| ())
    }

    async fn on_destroyed(&self, name: &str) -> Result<(), TenantError> {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(name).await;
        }
        Ok(())
    }
}

/// Admits registry misses that have a backing record and clears the
/// `pending_init` mark once they come up.
pub struct MetadataGate {
    store: Arc<MetadataStore>,
}

impl MetadataGate {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TenantGate for MetadataGate {
    async fn admit(&self, id: &str) -> Result<(), TenantError> {
        match self.store.find_by_name(id) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(TenantError::UnknownTenant(id.to_string())),
            Err(e) => Err(TenantError::metadata(e)),
        }
    }

    async fn ready(&self, id: &str) {
        match self.store.mark_active(id) {
            Ok(true) => tracing::info!("tenant {} initialized, pending mark cleared", id),
            Ok(false) => {}
            Err(e) => tracing::warn!("failed to clear pending mark for {}: {}", id, e),
        }
    }
}

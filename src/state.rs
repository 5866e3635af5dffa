use crate::config::HostConfig;
use crate::db::pool::DbPool;
use crate::metadata::MetadataStore;
use crate::runtime::EmbeddedRuntime;
use crate::tenant::{HostTemplate, LifecycleSync, MetadataGate, TenantBootstrap, TenantRegistry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: HostConfig,
    pub store: Arc<MetadataStore>,
    pub registry: Arc<TenantRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: HostConfig,
        store: Arc<MetadataStore>,
        registry: Arc<TenantRegistry>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            registry,
            started_at: Utc::now(),
        })
    }

    /// Wire store, registry and lifecycle sync with the default strategies.
    pub fn build(config: HostConfig, db: DbPool) -> SharedState {
        Self::build_with(config, db, |bootstrap| bootstrap)
    }

    /// Like [`AppState::build`], letting the caller swap the deriver,
    /// provisioner or runtime before the registry is created.
    pub fn build_with(
        config: HostConfig,
        db: DbPool,
        customize: impl FnOnce(TenantBootstrap) -> TenantBootstrap,
    ) -> SharedState {
        let store = Arc::new(MetadataStore::new(db, config.hook_mode));

        let host = HostTemplate {
            storage: config.storage.clone(),
            api_prefix: config.api_prefix.clone(),
        };
        let bootstrap = customize(TenantBootstrap::new(host, Arc::new(EmbeddedRuntime)));
        let registry = Arc::new(
            TenantRegistry::new(bootstrap, Arc::new(MetadataGate::new(store.clone())))
                .with_init_timeout(Duration::from_secs(config.init_timeout_secs.max(1))),
        );
        LifecycleSync::attach(&store, &registry);

        Self::new(config, store, registry)
    }
}

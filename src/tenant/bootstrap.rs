use crate::runtime::{TenantApp, TenantRuntime};
use crate::tenant::derive::{ConfigDeriver, DefaultConfigDeriver, HostTemplate};
use crate::tenant::error::TenantError;
use crate::tenant::provisioner::{Provisioner, StorageProvisioner};
use std::sync::Arc;
use std::time::Instant;

/// The derive -> provision -> start sequence for one tenant.
///
/// The deriver and provisioner are strategy objects; swap them with
/// [`TenantBootstrap::with_deriver`] and [`TenantBootstrap::with_provisioner`].
pub struct TenantBootstrap {
    pub host: HostTemplate,
    pub deriver: Arc<dyn ConfigDeriver>,
    pub provisioner: Arc<dyn StorageProvisioner>,
    pub runtime: Arc<dyn TenantRuntime>,
}

impl TenantBootstrap {
    pub fn new(host: HostTemplate, runtime: Arc<dyn TenantRuntime>) -> Self {
        Self {
            host,
            deriver: Arc::new(DefaultConfigDeriver),
            provisioner: Arc::new(Provisioner::default()),
            runtime,
        }
    }

    pub fn with_deriver(mut self, deriver: Arc<dyn ConfigDeriver>) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn StorageProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Errors come back collapsed into [`TenantError::Initialization`].
    pub async fn initialize(&self, id: &str) -> Result<Arc<dyn TenantApp>, TenantError> {
        let started = Instant::now();

        let config = self
            .deriver
            .derive(id, &self.host)
            .map_err(|e| e.into_initialization(id))?;

        self.provisioner
            .ensure(id, &config)
            .await
            .map_err(|e| e.into_initialization(id))?;

        let app = self.runtime.start(config).await.map_err(|e| {
            TenantError::RuntimeStart(format!("{:#}", e)).into_initialization(id)
        })?;

        tracing::info!(
            "tenant {} initialized in {}ms",
            id,
            started.elapsed().as_millis()
        );
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageTemplate, MEMORY_PATH};
    use crate::runtime::EmbeddedRuntime;
    use crate::tenant::derive::TenantConfig;
    use crate::tenant::error::FailureKind;
    use async_trait::async_trait;
    use std::path::PathBuf;

    fn memory_host() -> HostTemplate {
        HostTemplate {
            storage: StorageTemplate {
                path: Some(PathBuf::from(MEMORY_PATH)),
                ..StorageTemplate::default()
            },
            api_prefix: "/api".into(),
        }
    }

    struct FailingProvisioner;

    #[async_trait]
    impl StorageProvisioner for FailingProvisioner {
        async fn ensure(&self, _name: &str, _config: &TenantConfig) -> Result<(), TenantError> {
            Err(TenantError::Provisioning("disk full".into()))
        }
    }

    #[tokio::test]
    async fn initializes_a_servable_app() {
        let bootstrap = TenantBootstrap::new(memory_host(), Arc::new(EmbeddedRuntime));
        let app = bootstrap.initialize("acme").await.unwrap();
        assert_eq!(app.name(), "acme");
    }

    #[tokio::test]
    async fn provisioning_failure_is_collapsed_with_its_kind() {
        let bootstrap = TenantBootstrap::new(memory_host(), Arc::new(EmbeddedRuntime))
            .with_provisioner(Arc::new(FailingProvisioner));
        let err = bootstrap.initialize("bad").await.err().unwrap();
        assert_eq!(err.kind(), Some(FailureKind::Provisioning));
    }

    #[tokio::test]
    async fn runtime_start_failure_is_collapsed_with_its_kind() {
        let mut host = memory_host();
        host.storage.backend = crate::config::StorageBackend::Postgres;
        // Accept any storage so the runtime is the step that fails.
        struct NoopProvisioner;
        #[async_trait]
        impl StorageProvisioner for NoopProvisioner {
            async fn ensure(&self, _: &str, _: &TenantConfig) -> Result<(), TenantError> {
                Ok(())
            }
        }
        let bootstrap = TenantBootstrap::new(host, Arc::new(EmbeddedRuntime))
            .with_provisioner(Arc::new(NoopProvisioner));
        let err = bootstrap.initialize("acme").await.err().unwrap();
        assert_eq!(err.kind(), Some(FailureKind::RuntimeStart));
    }

    #[tokio::test]
    async fn invalid_identifier_fails_derivation() {
        let bootstrap = TenantBootstrap::new(memory_host(), Arc::new(EmbeddedRuntime));
        let err = bootstrap.initialize("Not Valid").await.err().unwrap();
        assert_eq!(err.kind(), Some(FailureKind::ConfigDerivation));
    }

    /// Files tenants under `tenant_<name>.sqlite` instead of `<name>.sqlite`.
    struct PrefixedFiles;

    impl ConfigDeriver for PrefixedFiles {
        fn derive(&self, name: &str, host: &HostTemplate) -> Result<TenantConfig, TenantError> {
            let mut config = DefaultConfigDeriver.derive(name, host)?;
            let dir = host.storage.path.as_deref().and_then(|p| p.parent());
            config.storage.path = dir.map(|d| d.join(format!("tenant_{}.sqlite", name)));
            Ok(config)
        }
    }

    #[tokio::test]
    async fn custom_deriver_decides_where_storage_lands() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostTemplate {
            storage: StorageTemplate {
                path: Some(dir.path().join("host.sqlite")),
                ..StorageTemplate::default()
            },
            api_prefix: "/api".into(),
        };
        let bootstrap = TenantBootstrap::new(host, Arc::new(EmbeddedRuntime))
            .with_deriver(Arc::new(PrefixedFiles));

        let app = bootstrap.initialize("acme").await.unwrap();
        assert_eq!(app.name(), "acme");
        assert!(dir.path().join("tenant_acme.sqlite").exists());
        assert!(!dir.path().join("acme.sqlite").exists());
        app.shutdown().await.unwrap();
    }
}

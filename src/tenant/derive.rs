use crate::config::{StorageBackend, StorageTemplate};
use crate::tenant::error::TenantError;
use crate::tenant::naming;
use std::path::{Path, PathBuf};

/// Runtime configuration for one tenant. Owned by whoever derived it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConfig {
    pub name: String,
    pub storage: StorageTemplate,
    /// Path prefix the tenant app mounts its API under.
    pub api_prefix: String,
}

/// Host-level settings every tenant config inherits from.
#[derive(Debug, Clone)]
pub struct HostTemplate {
    pub storage: StorageTemplate,
    pub api_prefix: String,
}

/// Maps a tenant identifier and the shared host template to a tenant config.
///
/// Implementations must not mutate the host template.
pub trait ConfigDeriver: Send + Sync {
    fn derive(&self, name: &str, host: &HostTemplate) -> Result<TenantConfig, TenantError>;
}

/// Database backends get `database = name`; SQLite gets a sibling file named
/// after the tenant. In-memory SQLite templates are passed through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConfigDeriver;

impl ConfigDeriver for DefaultConfigDeriver {
    fn derive(&self, name: &str, host: &HostTemplate) -> Result<TenantConfig, TenantError> {
        if !naming::is_valid_name(name) {
            return Err(TenantError::ConfigDerivation(format!(
                "'{}' is not a valid tenant identifier",
                name
            )));
        }

        let mut storage = host.storage.clone();
        match storage.backend {
            StorageBackend::Sqlite => {
                let host_path = storage.path.as_deref().ok_or_else(|| {
                    TenantError::ConfigDerivation(
                        "sqlite storage template has no path to derive tenant files from".into(),
                    )
                })?;
                if !storage.is_memory() {
                    storage.path = Some(sibling_path(host_path, name));
                }
            }
            StorageBackend::Postgres | StorageBackend::Mysql => {
                storage.database = Some(name.to_string());
            }
        }
        storage.table_prefix.clear();

        Ok(TenantConfig {
            name: name.to_string(),
            storage,
            api_prefix: host.api_prefix.clone(),
        })
    }
}

fn sibling_path(host_path: &Path, name: &str) -> PathBuf {
    let file = format!("{}.sqlite", name);
    match host_path.parent() {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}

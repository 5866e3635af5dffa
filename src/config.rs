use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file holding tenant metadata records.
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_reader_count")]
    pub db_readers: usize,
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,
    /// Interval for retrying `pending_init` tenants; 0 disables the sweeper.
    #[serde(default = "default_pending_retry")]
    pub pending_retry_secs: u64,
    #[serde(default)]
    pub hook_mode: HookMode,
    #[serde(default)]
    pub storage: StorageTemplate,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

/// How tenant creation reacts when the created-event handlers fail.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookMode {
    /// Initialization failure aborts the create and removes the record.
    #[default]
    Strict,
    /// The record is kept and marked `pending_init` for a later retry.
    Deferred,
}

impl std::str::FromStr for HookMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(HookMode::Strict),
            "deferred" => Ok(HookMode::Deferred),
            other => anyhow::bail!("unknown hook mode '{}' (expected strict or deferred)", other),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Postgres => "postgres",
            StorageBackend::Mysql => "mysql",
        }
    }
}

pub const MEMORY_PATH: &str = ":memory:";

/// Host-level storage template. Tenant configs are derived from a copy of it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StorageTemplate {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite database file, or `:memory:`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table_prefix: String,
}

impl Default for StorageTemplate {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: Some(PathBuf::from("data/host.sqlite")),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            table_prefix: String::new(),
        }
    }
}

impl StorageTemplate {
    pub fn is_memory(&self) -> bool {
        self.backend == StorageBackend::Sqlite
            && self
                .path
                .as_deref()
                .map(|p| p.as_os_str() == MEMORY_PATH)
                .unwrap_or(false)
    }

    /// Human-readable location without credentials.
    pub fn describe(&self) -> String {
        match self.backend {
            StorageBackend::Sqlite => match &self.path {
                Some(p) => format!("sqlite:{}", p.display()),
                None => "sqlite:<unset>".into(),
            },
            backend => format!(
                "{}://{}:{}/{}",
                backend.as_str(),
                self.host.as_deref().unwrap_or("localhost"),
                self.port.map(|p| p.to_string()).unwrap_or_default(),
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    /// Header carrying an explicit tenant identifier.
    #[serde(default = "default_override_header")]
    pub override_header: String,
    /// Header carrying a routing alias (hostname) to resolve against records.
    #[serde(default = "default_alias_header")]
    pub alias_header: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            override_header: default_override_header(),
            alias_header: default_alias_header(),
        }
    }
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/apphost.db")
}
fn default_reader_count() -> usize {
    4
}
fn default_init_timeout() -> u64 {
    60
}
fn default_pending_retry() -> u64 {
    60
}
fn default_api_prefix() -> String {
    "/api".into()
}
fn default_override_header() -> String {
    "x-app".into()
}
fn default_alias_header() -> String {
    "x-hostname".into()
}

/// Load config from TOML file with env var overrides.
pub fn load(path: &str) -> anyhow::Result<HostConfig> {
    let content = if std::path::Path::new(path).exists() {
        std::fs::read_to_string(path)?
    } else {
        tracing::warn!("Config file not found at {}, using defaults", path);
        String::new()
    };

    let mut config: HostConfig = toml::from_str(&content)?;

    // Env var overrides
    if let Ok(v) = std::env::var("APPHOST_HOST") {
        config.host = v;
    }
    if let Ok(v) = std::env::var("APPHOST_PORT") {
        config.port = v.parse()?;
    }
    if let Ok(v) = std::env::var("APPHOST_DB_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("APPHOST_STORAGE_PATH") {
        config.storage.path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("APPHOST_HOOK_MODE") {
        config.hook_mode = v.parse()?;
    }

    Ok(config)
}

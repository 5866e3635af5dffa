use crate::config::{StorageBackend, StorageTemplate};
use crate::tenant::derive::TenantConfig;
use crate::tenant::error::TenantError;
use async_trait::async_trait;
use std::path::Path;

/// Ensures a tenant's dedicated storage namespace exists.
///
/// Must be idempotent and keep no state between calls: an existing namespace
/// is success, never an error.
#[async_trait]
pub trait StorageProvisioner: Send + Sync {
    async fn ensure(&self, name: &str, config: &TenantConfig) -> Result<(), TenantError>;
}

/// Default provisioner covering the built-in storage backends.
pub struct Provisioner {
    mysql_bin: String,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new("mysql")
    }
}

impl Provisioner {
    pub fn new(mysql_bin: &str) -> Self {
        Self {
            mysql_bin: mysql_bin.to_string(),
        }
    }
}

#[async_trait]
impl StorageProvisioner for Provisioner {
    async fn ensure(&self, name: &str, config: &TenantConfig) -> Result<(), TenantError> {
        let storage = &config.storage;
        let database = target_database(storage, name);
        let result = match storage.backend {
            StorageBackend::Sqlite => ensure_sqlite(storage).await,
            StorageBackend::Postgres => ensure_postgres(storage, database).await,
            StorageBackend::Mysql => self.ensure_mysql(storage, database).await,
        };
        match &result {
            Ok(()) => tracing::debug!(
                "storage ready for tenant {} ({})",
                name,
                storage.describe()
            ),
            Err(e) => tracing::warn!("storage provisioning failed for tenant {}: {}", name, e),
        }
        result
    }
}

/// The database the derived config points at, falling back to the tenant name.
fn target_database<'a>(storage: &'a StorageTemplate, name: &'a str) -> &'a str {
    storage.database.as_deref().unwrap_or(name)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

async fn ensure_sqlite(storage: &StorageTemplate) -> Result<(), TenantError> {
    if storage.is_memory() {
        return Ok(());
    }
    let path = storage
        .path
        .clone()
        .ok_or_else(|| TenantError::Provisioning("sqlite config has no path".into()))?;

    tokio::task::spawn_blocking(move || create_sqlite_file(&path))
        .await
        .map_err(|e| TenantError::Provisioning(format!("provisioning task failed: {}", e)))?
}

fn create_sqlite_file(path: &Path) -> Result<(), TenantError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TenantError::Provisioning(format!(
                    "failed to create dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_CREATE;
    let conn = rusqlite::Connection::open_with_flags(path, flags).map_err(|e| {
        TenantError::Provisioning(format!("failed to open {}: {}", path.display(), e))
    })?;
    // Switching to WAL writes the header, so the file exists on disk afterwards.
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|e| TenantError::Provisioning(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

#[cfg(feature = "backend-postgres")]
async fn ensure_postgres(storage: &StorageTemplate, name: &str) -> Result<(), TenantError> {
    use tokio_postgres::error::SqlState;

    let mut pg = tokio_postgres::Config::new();
    pg.host(storage.host.as_deref().unwrap_or("localhost"));
    pg.port(storage.port.unwrap_or(5432));
    if let Some(user) = storage.username.as_deref() {
        pg.user(user);
    }
    if let Some(password) = storage.password.as_deref() {
        pg.password(password);
    }
    // Databases are created from the maintenance database, not the target.
    pg.dbname("postgres");

    let (client, connection) = pg
        .connect(tokio_postgres::NoTls)
        .await
        .map_err(|e| TenantError::Provisioning(format!("postgres connect failed: {}", e)))?;
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!("postgres provisioning connection error: {}", e);
        }
    });

    let result = client
        .batch_execute(&format!("CREATE DATABASE {}", quote_pg_ident(name)))
        .await;
    drop(client);
    let _ = driver.await;

    match result {
        Ok(()) => {
            tracing::info!("created postgres database {}", name);
            Ok(())
        }
        Err(e) if e.code() == Some(&SqlState::DUPLICATE_DATABASE) => Ok(()),
        Err(e) => Err(TenantError::Provisioning(format!(
            "CREATE DATABASE {} failed: {}",
            name, e
        ))),
    }
}

#[cfg(not(feature = "backend-postgres"))]
async fn ensure_postgres(_storage: &StorageTemplate, name: &str) -> Result<(), TenantError> {
    Err(TenantError::Provisioning(format!(
        "cannot provision postgres database {}: built without the backend-postgres feature",
        name
    )))
}

fn quote_pg_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ---------------------------------------------------------------------------
// MySQL
// ---------------------------------------------------------------------------

impl Provisioner {
    async fn ensure_mysql(&self, storage: &StorageTemplate, name: &str) -> Result<(), TenantError> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS {}", quote_mysql_ident(name));
        let mut cmd = tokio::process::Command::new(&self.mysql_bin);
        cmd.args(mysql_args(storage, &sql));
        if let Some(password) = storage.password.as_deref() {
            cmd.env("MYSQL_PWD", password);
        }

        let output = cmd.output().await.map_err(|e| {
            TenantError::Provisioning(format!("failed to run {}: {}", self.mysql_bin, e))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TenantError::Provisioning(format!(
                "mysql CREATE DATABASE {} failed: {}",
                name,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Client arguments for one statement. The password travels via `MYSQL_PWD`.
fn mysql_args(storage: &StorageTemplate, sql: &str) -> Vec<String> {
    let mut args = vec![
        "-h".to_string(),
        storage.host.clone().unwrap_or_else(|| "localhost".into()),
        "-P".to_string(),
        storage.port.unwrap_or(3306).to_string(),
    ];
    if let Some(user) = &storage.username {
        args.push("-u".into());
        args.push(user.clone());
    }
    args.push("-e".into());
    args.push(sql.to_string());
    args
}

fn quote_mysql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

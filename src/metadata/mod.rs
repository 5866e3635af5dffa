pub mod events;

use crate::audit;
use crate::config::HookMode;
use crate::db::pool::DbPool;
use crate::tenant::naming;
use crate::tenant::TenantError;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

pub use events::{MetadataEvents, TenantEventHandler};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    /// Created, but the runtime has not come up yet.
    PendingInit,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::PendingInit => "pending_init",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "pending_init" => RecordStatus::PendingInit,
            _ => RecordStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantRecord {
    pub name: String,
    pub title: Option<String>,
    pub pinned: bool,
    /// Routing alias (hostname).
    pub cname: Option<String>,
    pub status: RecordStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cname: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("tenant '{0}' not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("tenant initialization failed: {0}")]
    Hook(TenantError),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

const RECORD_COLUMNS: &str = "name, title, pinned, cname, status, created_at";

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantRecord> {
    let status: String = row.get(4)?;
    Ok(TenantRecord {
        name: row.get(0)?,
        title: row.get(1)?,
        pinned: row.get::<_, i64>(2)? != 0,
        cname: row.get(3)?,
        status: RecordStatus::parse(&status),
        created_at: row.get(5)?,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Tenant records in the host's SQLite database, plus the event bus that
/// keeps the registry in step with them.
pub struct MetadataStore {
    db: DbPool,
    events: MetadataEvents,
    hook_mode: HookMode,
}

impl MetadataStore {
    pub fn new(db: DbPool, hook_mode: HookMode) -> Self {
        Self {
            db,
            events: MetadataEvents::new(),
            hook_mode,
        }
    }

    pub fn events(&self) -> &MetadataEvents {
        &self.events
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<TenantRecord>, MetadataError> {
        let sql = format!("SELECT {} FROM tenants WHERE name = ?1", RECORD_COLUMNS);
        Ok(self.db.read(|conn| {
            Ok(conn
                .query_row(&sql, rusqlite::params![name], map_record)
                .optional()?)
        })?)
    }

    pub fn find_by_alias(&self, alias: &str) -> Result<Option<TenantRecord>, MetadataError> {
        let sql = format!("SELECT {} FROM tenants WHERE cname = ?1", RECORD_COLUMNS);
        Ok(self.db.read(|conn| {
            Ok(conn
                .query_row(&sql, rusqlite::params![alias], map_record)
                .optional()?)
        })?)
    }

    pub fn list(&self) -> Result<Vec<TenantRecord>, MetadataError> {
        self.query_list("1 = 1")
    }

    pub fn list_pinned(&self) -> Result<Vec<TenantRecord>, MetadataError> {
        self.query_list("pinned = 1")
    }

    pub fn list_pending(&self) -> Result<Vec<TenantRecord>, MetadataError> {
        self.query_list("status = 'pending_init'")
    }

    fn query_list(&self, filter: &str) -> Result<Vec<TenantRecord>, MetadataError> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE {} ORDER BY created_at, name",
            RECORD_COLUMNS, filter
        );
        Ok(self.db.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?)
    }

    /// Insert a record and run the created handlers.
    ///
    /// The insert commits before the handlers run. In strict mode a handler
    /// failure deletes the record again and is returned as
    /// [`MetadataError::Hook`]; in deferred mode the record is kept with status
    /// `pending_init`.
    pub async fn create(&self, new: NewTenant) -> Result<TenantRecord, MetadataError> {
        let mut record = self.insert(new)?;
        audit::record(
            &self.db,
            "tenant.create",
            &record.name,
            record.cname.as_deref().map(|c| format!("cname={}", c)).as_deref(),
        );

        let mut unsettled = PendingOnDrop {
            db: &self.db,
            name: record.name.clone(),
            armed: true,
        };
        let outcome = self.events.emit_created(&record).await;
        unsettled.armed = false;
        let Err(err) = outcome else {
            return Ok(record);
        };

        match self.hook_mode {
            HookMode::Strict => {
                self.delete_row(&record.name)?;
                audit::record(&self.db, "tenant.create_aborted", &record.name, Some(err.to_string().as_str()));
                tracing::warn!("create of tenant {} rolled back: {}", record.name, err);
                // A demand miss may have started the tenant while the record
                // was still visible.
                self.events.emit_destroyed(&record.name).await;
                Err(MetadataError::Hook(err))
            }
            HookMode::Deferred => {
                self.mark_pending(&record.name)?;
                record.status = RecordStatus::PendingInit;
                tracing::warn!(
                    "tenant {} created but not initialized, marked pending: {}",
                    record.name,
                    err
                );
                Ok(record)
            }
        }
    }

    fn insert(&self, new: NewTenant) -> Result<TenantRecord, MetadataError> {
        if !naming::is_valid_name(&new.name) {
            return Err(MetadataError::Invalid(format!(
                "invalid tenant name '{}': use 1-{} lowercase letters, digits, '-' or '_'",
                new.name,
                naming::MAX_NAME_LEN
            )));
        }
        let cname = match new.cname.as_deref().map(naming::normalize_alias) {
            Some(alias) if alias.is_empty() => None,
            Some(alias) if !naming::is_valid_alias(&alias) => {
                return Err(MetadataError::Invalid(format!("invalid cname '{}'", alias)));
            }
            other => other,
        };
        let title = new.title.filter(|t| !t.trim().is_empty());

        let inserted = self.db.write(|conn| {
            Ok(conn.execute(
                "INSERT INTO tenants (name, title, pinned, cname) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new.name, title, new.pinned as i64, cname],
            ))
        })?;
        if let Err(e) = inserted {
            let unique = matches!(
                &e,
                rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
            );
            if !unique {
                return Err(MetadataError::Db(e.into()));
            }
            return Err(if e.to_string().contains("cname") {
                MetadataError::Conflict(format!(
                    "cname '{}' is already in use",
                    cname.unwrap_or_default()
                ))
            } else {
                MetadataError::Conflict(format!("tenant '{}' already exists", new.name))
            });
        }

        self.find_by_name(&new.name)?
            .ok_or_else(|| MetadataError::NotFound(new.name.clone()))
    }

    /// Delete the record, then run the destroyed handlers.
    pub async fn destroy(&self, name: &str) -> Result<(), MetadataError> {
        if !self.delete_row(name)? {
            return Err(MetadataError::NotFound(name.to_string()));
        }
        audit::record(&self.db, "tenant.destroy", name, None);
        self.events.emit_destroyed(name).await;
        Ok(())
    }

    fn delete_row(&self, name: &str) -> Result<bool, MetadataError> {
        let removed = self.db.write(|conn| {
            Ok(conn.execute("DELETE FROM tenants WHERE name = ?1", rusqlite::params![name])?)
        })?;
        Ok(removed > 0)
    }

    pub fn mark_pending(&self, name: &str) -> Result<bool, MetadataError> {
        self.set_status(name, RecordStatus::PendingInit)
    }

    /// Returns true only when the record was pending.
    pub fn mark_active(&self, name: &str) -> Result<bool, MetadataError> {
        let changed = self.db.write(|conn| {
            Ok(conn.execute(
                "UPDATE tenants SET status = 'active' WHERE name = ?1 AND status = 'pending_init'",
                rusqlite::params![name],
            )?)
        })?;
        Ok(changed > 0)
    }

    fn set_status(&self, name: &str, status: RecordStatus) -> Result<bool, MetadataError> {
        let changed = self.db.write(|conn| {
            Ok(conn.execute(
                "UPDATE tenants SET status = ?1 WHERE name = ?2",
                rusqlite::params![status.as_str(), name],
            )?)
        })?;
        Ok(changed > 0)
    }
}

/// Marks a freshly inserted record `pending_init` if `create` is dropped while
/// its created handlers are still running.
struct PendingOnDrop<'a> {
    db: &'a DbPool,
    name: String,
    armed: bool,
}

impl Drop for PendingOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let marked = self.db.write(|conn| {
            Ok(conn.execute(
                "UPDATE tenants SET status = 'pending_init' WHERE name = ?1",
                rusqlite::params![self.name],
            )?)
        });
        match marked {
            Ok(_) => tracing::warn!("create of tenant {} abandoned, marked pending", self.name),
            Err(e) => tracing::error!("failed to mark abandoned tenant {} pending: {}", self.name, e),
        }
    }
}

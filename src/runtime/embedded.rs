use crate::config::StorageBackend;
use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::runtime::{TenantApp, TenantRuntime};
use crate::tenant::derive::TenantConfig;
use anyhow::{bail, Context};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Runs each tenant as an in-process axum app over its own SQLite database.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedRuntime;

#[async_trait]
impl TenantRuntime for EmbeddedRuntime {
    async fn start(&self, config: TenantConfig) -> anyhow::Result<Arc<dyn TenantApp>> {
        if config.storage.backend != StorageBackend::Sqlite {
            bail!(
                "embedded runtime serves sqlite storage only, got {}",
                config.storage.backend.as_str()
            );
        }
        let table = entries_table(&config.storage.table_prefix)?;

        let storage = config.storage.clone();
        let schema_table = table.clone();
        let db = tokio::task::spawn_blocking(move || -> anyhow::Result<DbPool> {
            let db = if storage.is_memory() {
                DbPool::open_in_memory()?
            } else {
                let path = storage.path.as_deref().context("sqlite config has no path")?;
                let path = path.to_str().context("storage path is not valid UTF-8")?;
                DbPool::open(path, 2).with_context(|| format!("failed to open {}", path))?
            };
            db.write(|conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        key TEXT PRIMARY KEY NOT NULL,
                        value TEXT NOT NULL,
                        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                    )",
                    schema_table
                ))?;
                Ok(())
            })?;
            Ok(db)
        })
        .await??;

        tracing::info!(
            "embedded app started for tenant {} ({})",
            config.name,
            config.storage.describe()
        );
        Ok(Arc::new(EmbeddedApp::new(config, db, table)))
    }
}

fn entries_table(prefix: &str) -> anyhow::Result<String> {
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!("table prefix '{}' contains unsupported characters", prefix);
    }
    Ok(format!("{}entries", prefix))
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

struct AppCtx {
    name: String,
    storage: String,
    table: String,
    db: DbPool,
}

pub struct EmbeddedApp {
    name: String,
    router: Router,
    stopped: AtomicBool,
}

impl EmbeddedApp {
    fn new(config: TenantConfig, db: DbPool, table: String) -> Self {
        let ctx = Arc::new(AppCtx {
            name: config.name.clone(),
            storage: config.storage.describe(),
            table,
            db,
        });

        let api = Router::new()
            .route("/info", get(info))
            .route("/entries", get(list_entries))
            .route(
                "/entries/{key}",
                get(get_entry).put(put_entry).delete(delete_entry),
            );

        let prefix = config.api_prefix.trim_end_matches('/');
        let router = Router::new().route("/health", get(health));
        let router = if prefix.is_empty() {
            router.merge(api)
        } else {
            router.nest(prefix, api)
        };

        Self {
            name: config.name,
            router: router.with_state(ctx),
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TenantApp for EmbeddedApp {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, req: Request<Body>) -> Response {
        if self.stopped.load(Ordering::Acquire) {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "tenant stopped" })),
            )
                .into_response();
        }
        match self.router.clone().oneshot(req).await {
            Ok(resp) => resp,
            Err(never) => match never {},
        }
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            bail!("tenant app {} already stopped", self.name);
        }
        tracing::info!("embedded app stopped for tenant {}", self.name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize)]
pub struct PutEntry {
    pub value: String,
}

async fn health(State(ctx): State<Arc<AppCtx>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "tenant": ctx.name }))
}

async fn info(State(ctx): State<Arc<AppCtx>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "tenant": ctx.name,
        "storage": ctx.storage,
    }))
}

async fn list_entries(State(ctx): State<Arc<AppCtx>>) -> Result<Json<Vec<Entry>>, AppError> {
    let sql = format!("SELECT key, value FROM {} ORDER BY key", ctx.table);
    let entries = ctx.db.read(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Entry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    Ok(Json(entries))
}

async fn get_entry(
    State(ctx): State<Arc<AppCtx>>,
    Path(key): Path<String>,
) -> Result<Json<Entry>, AppError> {
    let sql = format!("SELECT value FROM {} WHERE key = ?1", ctx.table);
    let value: Option<String> = ctx.db.read(|conn| {
        Ok(conn
            .query_row(&sql, rusqlite::params![key], |row| row.get(0))
            .optional()?)
    })?;
    match value {
        Some(value) => Ok(Json(Entry { key, value })),
        None => Err(AppError::NotFound(format!("entry {}", key))),
    }
}

async fn put_entry(
    State(ctx): State<Arc<AppCtx>>,
    Path(key): Path<String>,
    Json(body): Json<PutEntry>,
) -> Result<Json<Entry>, AppError> {
    let sql = format!(
        "INSERT INTO {} (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        ctx.table
    );
    ctx.db.write(|conn| {
        conn.execute(&sql, rusqlite::params![key, body.value])?;
        Ok(())
    })?;
    Ok(Json(Entry {
        key,
        value: body.value,
    }))
}

async fn delete_entry(
    State(ctx): State<Arc<AppCtx>>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    let sql = format!("DELETE FROM {} WHERE key = ?1", ctx.table);
    let removed = ctx
        .db
        .write(|conn| Ok(conn.execute(&sql, rusqlite::params![key])?))?;
    if removed == 0 {
        return Err(AppError::NotFound(format!("entry {}", key)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageTemplate, MEMORY_PATH};
    use axum::body::to_bytes;
    use std::path::PathBuf;

    fn config(name: &str, path: PathBuf) -> TenantConfig {
        TenantConfig {
            name: name.into(),
            storage: StorageTemplate {
                path: Some(path),
                ..StorageTemplate::default()
            },
            api_prefix: "/api".into(),
        }
    }

    async fn send(app: &Arc<dyn TenantApp>, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let resp = app.dispatch(req).await;
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn serves_info_and_entries() {
        let app = EmbeddedRuntime
            .start(config("acme", PathBuf::from(MEMORY_PATH)))
            .await
            .unwrap();
        assert_eq!(app.name(), "acme");

        let (status, json) = send(&app, "GET", "/api/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tenant"], "acme");

        let (status, _) = send(&app, "PUT", "/api/entries/color", Some(r#"{"value":"blue"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = send(&app, "GET", "/api/entries/color", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["value"], "blue");

        let (status, json) = send(&app, "GET", "/api/entries", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(|a| a.len()), Some(1));

        let (status, _) = send(&app, "DELETE", "/api/entries/color", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/api/entries/color", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn file_backed_tenants_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = EmbeddedRuntime
            .start(config("a", dir.path().join("a.sqlite")))
            .await
            .unwrap();
        let b = EmbeddedRuntime
            .start(config("b", dir.path().join("b.sqlite")))
            .await
            .unwrap();

        send(&a, "PUT", "/api/entries/k", Some(r#"{"value":"from-a"}"#)).await;
        let (status, _) = send(&b, "GET", "/api/entries/k", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, json) = send(&a, "GET", "/api/entries/k", None).await;
        assert_eq!(json["value"], "from-a");
    }

    #[tokio::test]
    async fn stopped_app_answers_503_and_refuses_second_stop() {
        let app = EmbeddedRuntime
            .start(config("acme", PathBuf::from(MEMORY_PATH)))
            .await
            .unwrap();
        EmbeddedRuntime.stop(app.clone()).await.unwrap();
        let (status, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(app.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn non_sqlite_config_fails_to_start() {
        let mut cfg = config("acme", PathBuf::from(MEMORY_PATH));
        cfg.storage.backend = StorageBackend::Postgres;
        assert!(EmbeddedRuntime.start(cfg).await.is_err());
    }

    #[test]
    fn table_prefix_is_validated() {
        assert_eq!(entries_table("").unwrap(), "entries");
        assert_eq!(entries_table("main_").unwrap(), "main_entries");
        assert!(entries_table("x; DROP TABLE y").is_err());
    }
}

use crate::db::pool::DbPool;

/// Log an audit event to the audit_log table.
pub fn log(
    db: &DbPool,
    action: &str,
    resource: &str,
    resource_id: &str,
    details: Option<&str>,
) -> anyhow::Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    db.write(|conn| {
        conn.execute(
            "INSERT INTO audit_log (id, action, resource, resource_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, action, resource, resource_id, details],
        )?;
        Ok(())
    })
}

/// Best-effort variant: failures are logged and swallowed.
pub fn record(db: &DbPool, action: &str, resource_id: &str, details: Option<&str>) {
    if let Err(e) = log(db, action, "tenant", resource_id, details) {
        tracing::warn!("audit: failed to record {} for {}: {:#}", action, resource_id, e);
    }
}

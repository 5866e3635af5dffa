pub mod pool;

use pool::DbPool;

/// Embedded schema steps, applied in order and recorded by name.
const MIGRATIONS: &[(&str, &str)] = &[("001_initial", include_str!("migrations/001_initial.sql"))];

/// Bring the metadata schema up to date. Each step runs in its own
/// transaction together with its `_migrations` row. Returns the names applied
/// by this call.
pub fn run_migrations(pool: &DbPool) -> anyhow::Result<Vec<&'static str>> {
    pool.write(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            )",
        )?;

        let mut applied = Vec::new();
        for &(name, sql) in MIGRATIONS {
            let done: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = ?1)",
                [name],
                |row| row.get(0),
            )?;
            if done {
                continue;
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tx.commit()?;
            tracing::info!("applied migration: {}", name);
            applied.push(name);
        }
        Ok(applied)
    })
}

use rusqlite::Connection;
use std::sync::Mutex;

/// One writer connection plus a set of reader connections over the same database.
///
/// In-memory databases are private to a single connection, so
/// [`DbPool::open_in_memory`] keeps no readers and serves reads from the writer.
pub struct DbPool {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
}

impl DbPool {
    pub fn open(path: &str, reader_count: usize) -> anyhow::Result<Self> {
        let writer = Connection::open(path)?;
        writer.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let mut readers = Vec::with_capacity(reader_count);
        for _ in 0..reader_count {
            let r = Connection::open(path)?;
            r.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            readers.push(Mutex::new(r));
        }

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let writer = Connection::open_in_memory()?;
        writer.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
        })
    }

    pub fn write<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("writer lock poisoned"))?;
        f(&conn)
    }

    pub fn read<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let Some(first) = self.readers.first() else {
            return self.write(f);
        };
        for reader in &self.readers {
            if let Ok(conn) = reader.try_lock() {
                return f(&conn);
            }
        }
        let conn = first
            .lock()
            .map_err(|_| anyhow::anyhow!("reader lock poisoned"))?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_reads_its_own_writes() {
        let pool = DbPool::open_in_memory().unwrap();
        pool.write(|conn| {
            conn.execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('x');")?;
            Ok(())
        })
        .unwrap();
        let v: String = pool
            .read(|conn| Ok(conn.query_row("SELECT v FROM t", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(v, "x");
    }

    #[test]
    fn file_pool_readers_see_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let pool = DbPool::open(path.to_str().unwrap(), 2).unwrap();
        pool.write(|conn| {
            conn.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);")?;
            Ok(())
        })
        .unwrap();
        let v: i64 = pool
            .read(|conn| Ok(conn.query_row("SELECT v FROM t", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(v, 7);
    }
}

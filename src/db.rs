use crate::config::Config;
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) if e.to_string().contains("no such table") => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = cfg.app.database_path(data_dir);
        tracing::info!(path = ?path, "[db] opening local database");
        Self::open(&path).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:")).await
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            tx_lock: Mutex::new(()),
        })
    }

    /// Starts a write transaction. Writers are serialised until the returned guard drops,
    /// so the guard must outlive the matching [`Database::finish`] call.
    pub async fn begin(&self) -> Result<MutexGuard<'_, ()>, libsql::Error> {
        let guard = self.tx_lock.lock().await;
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(guard)
    }

    /// Commits on `Ok`, rolls back on `Err`, passing the result through.
    pub async fn finish<T, E>(&self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<libsql::Error>,
    {
        match result {
            Ok(value) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute("ROLLBACK", ()).await {
                    tracing::error!(error = %rollback, "failed to roll back transaction");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &Database, sql: &str) -> i64 {
        let mut rows = db.connection().query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM _migrations").await, 2);

        for (filename, sql) in SYSTEM_MIGRATIONS.iter().chain(MIGRATIONS) {
            Database::run_migration(db.connection(), filename, sql).await.unwrap();
        }
        assert_eq!(count(&db, "SELECT COUNT(*) FROM _migrations").await, 2);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = Database::in_memory().await.unwrap();

        let tx = db.begin().await.unwrap();
        let result: Result<(), anyhow::Error> = async {
            db.connection()
                .execute("INSERT INTO users (name) VALUES ('Alice')", ())
                .await?;
            anyhow::bail!("abort")
        }
        .await;
        assert!(db.finish(result).await.is_err());
        drop(tx);

        assert_eq!(count(&db, "SELECT COUNT(*) FROM users").await, 0);
    }

    #[tokio::test]
    async fn schema_rejects_inconsistent_books() {
        let db = Database::in_memory().await.unwrap();
        let res = db
            .connection()
            .execute(
                "INSERT INTO books (title, author, available, due_date) VALUES ('t', 'a', 1, '2024-01-01')",
                (),
            )
            .await;
        assert!(res.is_err());
    }
}

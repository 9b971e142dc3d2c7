//! Connection pools
//!
//! One [`Database`] wraps either a SQLite or a MySQL pool. Everything above
//! this module sees it as a [`DynDatabasePool`] and reaches the typed sqlx
//! pool through [`with_pool!`](crate::with_pool).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 16;
const MYSQL_MAX_CONNECTIONS: u32 = 30;
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// What repositories and migrations need from a pool.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run a statement that returns no rows, giving the affected row count
    async fn execute(&self, sql: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

enum Backend {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

/// A connected database of either flavour
pub struct Database {
    backend: Backend,
}

/// Where a SQLite database lives
#[derive(Debug, PartialEq)]
enum SqliteLocation {
    Memory,
    File(PathBuf),
}

impl SqliteLocation {
    /// Accepts `:memory:`, `sqlite::memory:`, `sqlite:` URLs and plain paths.
    /// Query parameters are dropped; the file is always opened read-write.
    fn parse(url: &str) -> Self {
        let url = url.trim();
        if url == ":memory:" || url.starts_with("sqlite::memory:") {
            return Self::Memory;
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        let path = path.split('?').next().unwrap_or(path);
        Self::File(PathBuf::from(path))
    }
}

impl Database {
    pub async fn sqlite(url: &str) -> Result<Self> {
        let location = SqliteLocation::parse(url);

        let options = match &location {
            SqliteLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .context("Invalid in-memory SQLite options")?,
            SqliteLocation::File(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("Failed to create database directory {:?}", dir))?;
                }
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
            }
        }
        .foreign_keys(true)
        .busy_timeout(SQLITE_BUSY_TIMEOUT);

        // Each connection to an in-memory database sees its own empty schema.
        let max_connections = match location {
            SqliteLocation::Memory => 1,
            SqliteLocation::File(_) => SQLITE_MAX_CONNECTIONS,
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {}", url))?;

        tracing::debug!(url, max_connections, "SQLite pool ready");
        Ok(Self {
            backend: Backend::Sqlite(pool),
        })
    }

    pub async fn mysql(url: &str) -> Result<Self> {
        let url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(MYSQL_MAX_CONNECTIONS)
            .connect(&url)
            .await
            .context("Failed to connect to MySQL")?;

        tracing::debug!("MySQL pool ready");
        Ok(Self {
            backend: Backend::Mysql(pool),
        })
    }
}

#[async_trait]
impl DatabasePool for Database {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let affected = match &self.backend {
            Backend::Sqlite(pool) => sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected()),
        };
        affected.with_context(|| format!("Statement failed: {}", sql))
    }

    async fn ping(&self) -> Result<()> {
        match &self.backend {
            Backend::Sqlite(pool) => sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await?,
            Backend::Mysql(pool) => sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await?,
        };
        Ok(())
    }

    async fn close(&self) {
        match &self.backend {
            Backend::Sqlite(pool) => pool.close().await,
            Backend::Mysql(pool) => pool.close().await,
        }
    }

    fn driver(&self) -> DatabaseDriver {
        match self.backend {
            Backend::Sqlite(_) => DatabaseDriver::Sqlite,
            Backend::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        match &self.backend {
            Backend::Sqlite(pool) => Some(pool),
            Backend::Mysql(_) => None,
        }
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        match &self.backend {
            Backend::Mysql(pool) => Some(pool),
            Backend::Sqlite(_) => None,
        }
    }
}

/// Connect to the configured database
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let database = match config.driver {
        DatabaseDriver::Sqlite => Database::sqlite(&config.url).await?,
        DatabaseDriver::Mysql => Database::mysql(&config.url).await?,
    };
    Ok(Arc::new(database))
}

/// Fresh in-memory SQLite database, used by the test suites
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    Ok(Arc::new(Database::sqlite(":memory:").await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_location() {
        assert_eq!(SqliteLocation::parse(":memory:"), SqliteLocation::Memory);
        assert_eq!(SqliteLocation::parse("sqlite::memory:"), SqliteLocation::Memory);
        assert_eq!(
            SqliteLocation::parse("data/goroda.db"),
            SqliteLocation::File(PathBuf::from("data/goroda.db"))
        );
        assert_eq!(
            SqliteLocation::parse("sqlite:data/goroda.db?mode=rwc"),
            SqliteLocation::File(PathBuf::from("data/goroda.db"))
        );
        assert_eq!(
            SqliteLocation::parse("sqlite:///var/lib/goroda.db"),
            SqliteLocation::File(PathBuf::from("/var/lib/goroda.db"))
        );
    }

    #[tokio::test]
    async fn test_memory_database() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.as_mysql().is_none());
        pool.ping().await.unwrap();

        pool.execute("CREATE TABLE sample (id INTEGER PRIMARY KEY, title TEXT)")
            .await
            .unwrap();
        let inserted = pool
            .execute("INSERT INTO sample (title) VALUES ('Тверь'), ('Ржев')")
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sample")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE region (id INTEGER PRIMARY KEY)").await.unwrap();
        pool.execute("CREATE TABLE city (id INTEGER PRIMARY KEY, region_id INTEGER NOT NULL REFERENCES region(id))")
            .await
            .unwrap();

        assert!(pool.execute("INSERT INTO city (region_id) VALUES (42)").await.is_err());
    }

    #[tokio::test]
    async fn test_file_database_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("var").join("goroda.db");

        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: path.to_string_lossy().to_string(),
        };
        let pool = create_pool(&config).await.unwrap();
        pool.ping().await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_database() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/moi_goroda_test".to_string());
        let pool = Database::mysql(&url).await.unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        pool.ping().await.unwrap();
    }
}

//! SQL dialect helpers
//!
//! Queries are written once and run on both backends. The few places where
//! SQLite and MySQL disagree (date part extraction, unsigned window
//! function results, `INSERT ... IGNORE`) go through [`Dialect`].

use sqlx::mysql::MySqlQueryResult;
use sqlx::sqlite::SqliteQueryResult;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;

/// Run the same body against whichever concrete sqlx pool backs `$db`.
///
/// The body is expanded once per backend with `$pool` bound to
/// `&SqlitePool` or `&MySqlPool`, so it must only use queries and types
/// both drivers support. Must be used inside a function returning
/// `anyhow::Result`.
#[macro_export]
macro_rules! with_pool {
    ($db:expr, |$pool:ident| $body:expr) => {
        match $db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $pool = $db
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool is not available"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $pool = $db
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool is not available"))?;
                $body
            }
        }
    };
}

/// Id of the row created by an `INSERT`
pub trait InsertId {
    fn insert_id(&self) -> i64;
}

impl InsertId for SqliteQueryResult {
    fn insert_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl InsertId for MySqlQueryResult {
    fn insert_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}

/// SQL fragments that differ between backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect(DatabaseDriver);

impl Dialect {
    pub fn new(driver: DatabaseDriver) -> Self {
        Self(driver)
    }

    pub fn of(pool: &DynDatabasePool) -> Self {
        Self(pool.driver())
    }

    /// Calendar year of a date column as a signed 64-bit integer
    pub fn year(&self, column: &str) -> String {
        match self.0 {
            DatabaseDriver::Sqlite => format!("CAST(strftime('%Y', {}) AS INTEGER)", column),
            DatabaseDriver::Mysql => format!("CAST(YEAR({}) AS SIGNED)", column),
        }
    }

    /// Month (1-12) of a date column as a signed 64-bit integer
    pub fn month(&self, column: &str) -> String {
        match self.0 {
            DatabaseDriver::Sqlite => format!("CAST(strftime('%m', {}) AS INTEGER)", column),
            DatabaseDriver::Mysql => format!("CAST(MONTH({}) AS SIGNED)", column),
        }
    }

    /// Wrap an integer expression so it decodes as `i64`.
    ///
    /// MySQL reports `RANK()`/`ROW_NUMBER()` as unsigned.
    pub fn int(&self, expr: &str) -> String {
        match self.0 {
            DatabaseDriver::Sqlite => expr.to_string(),
            DatabaseDriver::Mysql => format!("CAST({} AS SIGNED)", expr),
        }
    }

    /// Wrap an expression so it decodes as `f64` (MySQL `AVG` yields DECIMAL)
    pub fn float(&self, expr: &str) -> String {
        match self.0 {
            DatabaseDriver::Sqlite => format!("CAST({} AS REAL)", expr),
            DatabaseDriver::Mysql => format!("CAST({} AS DOUBLE)", expr),
        }
    }

    /// Integer division rounding toward zero
    pub fn div(&self, dividend: &str, divisor: &str) -> String {
        match self.0 {
            DatabaseDriver::Sqlite => format!("(({}) / ({}))", dividend, divisor),
            DatabaseDriver::Mysql => format!("CAST((({}) DIV ({})) AS SIGNED)", dividend, divisor),
        }
    }

    /// `part * 100 / total` as a whole percentage, 0 for an empty total
    pub fn ratio(&self, part: &str, total: &str) -> String {
        format!(
            "CASE WHEN {total} = 0 THEN 0 ELSE {} END",
            self.div(&format!("{} * 100", part), total),
            total = total
        )
    }

    pub fn insert_ignore(&self) -> &'static str {
        match self.0 {
            DatabaseDriver::Sqlite => "INSERT OR IGNORE",
            DatabaseDriver::Mysql => "INSERT IGNORE",
        }
    }
}

/// `?, ?, ?` for an `IN (...)` list of `n` bound values
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[test]
    fn test_year_fragments() {
        assert_eq!(
            Dialect::new(DatabaseDriver::Sqlite).year("v.date_of_visit"),
            "CAST(strftime('%Y', v.date_of_visit) AS INTEGER)"
        );
        assert_eq!(
            Dialect::new(DatabaseDriver::Mysql).year("v.date_of_visit"),
            "CAST(YEAR(v.date_of_visit) AS SIGNED)"
        );
    }

    #[test]
    fn test_int_is_noop_on_sqlite() {
        let expr = "RANK() OVER (ORDER BY n DESC)";
        assert_eq!(Dialect::new(DatabaseDriver::Sqlite).int(expr), expr);
        assert!(Dialect::new(DatabaseDriver::Mysql).int(expr).starts_with("CAST("));
    }

    #[tokio::test]
    async fn test_ratio_floors_and_handles_zero() -> anyhow::Result<()> {
        let pool = create_test_pool().await?;
        let dialect = Dialect::of(&pool);
        let sql = format!(
            "SELECT {} AS a, {} AS b, {} AS c",
            dialect.ratio("2", "3"),
            dialect.ratio("5", "0"),
            dialect.ratio("7", "7")
        );

        let (a, b, c): (i64, i64, i64) = crate::with_pool!(pool, |p| {
            sqlx::query_as(&sql).fetch_one(p).await?
        });
        assert_eq!((a, b, c), (66, 0, 100));
        Ok(())
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[tokio::test]
    async fn test_date_parts_on_sqlite() -> anyhow::Result<()> {
        let pool = create_test_pool().await?;
        let dialect = Dialect::of(&pool);
        let sql = format!(
            "SELECT {} AS y, {} AS m",
            dialect.year("'2024-03-15'"),
            dialect.month("'2024-03-15'")
        );

        let (year, month): (i64, i64) = crate::with_pool!(pool, |p| {
            sqlx::query_as(&sql).fetch_one(p).await?
        });
        assert_eq!(year, 2024);
        assert_eq!(month, 3);
        Ok(())
    }
}

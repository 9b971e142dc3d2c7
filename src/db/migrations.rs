//! Database migrations
//!
//! Migrations are embedded SQL, one script per backend, applied in version
//! order and recorded in the `_migrations` table.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;
use crate::with_pool;

/// A schema change with SQL for both backends
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, increasing version number
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// Row of the `_migrations` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(30) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(30) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at DATETIME NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                KEY idx_sessions_user_id (user_id),
                KEY idx_sessions_expires_at (expires_at),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 3,
        name: "create_geography",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS areas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS regions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                area_id INTEGER,
                title VARCHAR(100) NOT NULL,
                region_type VARCHAR(30) NOT NULL,
                iso3166 VARCHAR(10) NOT NULL UNIQUE,
                FOREIGN KEY (area_id) REFERENCES areas(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_regions_area_id ON regions(area_id);
            CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(100) NOT NULL,
                region_id INTEGER NOT NULL,
                population INTEGER NOT NULL DEFAULT 0,
                date_of_foundation INTEGER,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                wiki VARCHAR(255),
                image VARCHAR(255),
                UNIQUE (title, region_id),
                FOREIGN KEY (region_id) REFERENCES regions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_cities_region_id ON cities(region_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS areas (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS regions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                area_id BIGINT,
                title VARCHAR(100) NOT NULL,
                region_type VARCHAR(30) NOT NULL,
                iso3166 VARCHAR(10) NOT NULL UNIQUE,
                KEY idx_regions_area_id (area_id),
                FOREIGN KEY (area_id) REFERENCES areas(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS cities (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(100) NOT NULL,
                region_id BIGINT NOT NULL,
                population BIGINT NOT NULL DEFAULT 0,
                date_of_foundation BIGINT,
                latitude DOUBLE NOT NULL,
                longitude DOUBLE NOT NULL,
                wiki VARCHAR(255),
                image VARCHAR(255),
                UNIQUE KEY uq_cities_title_region (title, region_id),
                KEY idx_cities_region_id (region_id),
                FOREIGN KEY (region_id) REFERENCES regions(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 4,
        name: "create_visited_cities",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS visited_cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                region_id INTEGER NOT NULL,
                city_id INTEGER NOT NULL,
                date_of_visit DATE,
                has_magnet BOOLEAN NOT NULL DEFAULT 0,
                impression TEXT,
                rating INTEGER NOT NULL,
                is_first_visit BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, city_id, date_of_visit),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (region_id) REFERENCES regions(id) ON DELETE CASCADE,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_visited_cities_user ON visited_cities(user_id);
            CREATE INDEX IF NOT EXISTS idx_visited_cities_city ON visited_cities(city_id);
            CREATE INDEX IF NOT EXISTS idx_visited_cities_region ON visited_cities(region_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS visited_cities (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                region_id BIGINT NOT NULL,
                city_id BIGINT NOT NULL,
                date_of_visit DATE,
                has_magnet BOOLEAN NOT NULL DEFAULT FALSE,
                impression TEXT,
                rating BIGINT NOT NULL,
                is_first_visit BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_visit (user_id, city_id, date_of_visit),
                KEY idx_visited_cities_city (city_id),
                KEY idx_visited_cities_region (region_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (region_id) REFERENCES regions(id) ON DELETE CASCADE,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 5,
        name: "create_collections",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS collection_cities (
                collection_id INTEGER NOT NULL,
                city_id INTEGER NOT NULL,
                PRIMARY KEY (collection_id, city_id),
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS favorite_collections (
                user_id INTEGER NOT NULL,
                collection_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, collection_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS personal_collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                is_public BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_personal_collections_user ON personal_collections(user_id);
            CREATE TABLE IF NOT EXISTS personal_collection_cities (
                personal_collection_id INTEGER NOT NULL,
                city_id INTEGER NOT NULL,
                PRIMARY KEY (personal_collection_id, city_id),
                FOREIGN KEY (personal_collection_id) REFERENCES personal_collections(id) ON DELETE CASCADE,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS collections (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL UNIQUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS collection_cities (
                collection_id BIGINT NOT NULL,
                city_id BIGINT NOT NULL,
                PRIMARY KEY (collection_id, city_id),
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
            CREATE TABLE IF NOT EXISTS favorite_collections (
                user_id BIGINT NOT NULL,
                collection_id BIGINT NOT NULL,
                PRIMARY KEY (user_id, collection_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
            CREATE TABLE IF NOT EXISTS personal_collections (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                is_public BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                KEY idx_personal_collections_user (user_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS personal_collection_cities (
                personal_collection_id BIGINT NOT NULL,
                city_id BIGINT NOT NULL,
                PRIMARY KEY (personal_collection_id, city_id),
                FOREIGN KEY (personal_collection_id) REFERENCES personal_collections(id) ON DELETE CASCADE,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
        "#,
    },
    Migration {
        version: 6,
        name: "create_news",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_news_created_at ON news(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS news (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                content LONGTEXT NOT NULL,
                content_html LONGTEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                KEY idx_news_created_at (created_at)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 7,
        name: "create_blog",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS blog_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                is_published BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS blog_article_tags (
                article_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (article_id, tag_id),
                FOREIGN KEY (article_id) REFERENCES blog_articles(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES blog_tags(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS blog_article_views (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL,
                user_id INTEGER,
                ip_address VARCHAR(45) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (article_id) REFERENCES blog_articles(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_views_article ON blog_article_views(article_id, ip_address);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(100) NOT NULL UNIQUE,
                slug VARCHAR(100) NOT NULL UNIQUE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS blog_articles (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                content LONGTEXT NOT NULL,
                content_html LONGTEXT NOT NULL,
                is_published BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS blog_article_tags (
                article_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (article_id, tag_id),
                FOREIGN KEY (article_id) REFERENCES blog_articles(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES blog_tags(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
            CREATE TABLE IF NOT EXISTS blog_article_views (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                article_id BIGINT NOT NULL,
                user_id BIGINT,
                ip_address VARCHAR(45) NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                KEY idx_blog_views_article (article_id, ip_address),
                FOREIGN KEY (article_id) REFERENCES blog_articles(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            ) ENGINE=InnoDB;
        "#,
    },
    Migration {
        version: 8,
        name: "create_share_and_subscribe",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS share_settings (
                user_id INTEGER PRIMARY KEY,
                can_share BOOLEAN NOT NULL DEFAULT 0,
                can_share_dashboard BOOLEAN NOT NULL DEFAULT 0,
                can_share_city_map BOOLEAN NOT NULL DEFAULT 0,
                can_share_region_map BOOLEAN NOT NULL DEFAULT 0,
                can_subscribe BOOLEAN NOT NULL DEFAULT 0,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS subscribes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscribe_from INTEGER NOT NULL,
                subscribe_to INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (subscribe_from, subscribe_to),
                FOREIGN KEY (subscribe_from) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (subscribe_to) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS share_settings (
                user_id BIGINT PRIMARY KEY,
                can_share BOOLEAN NOT NULL DEFAULT FALSE,
                can_share_dashboard BOOLEAN NOT NULL DEFAULT FALSE,
                can_share_city_map BOOLEAN NOT NULL DEFAULT FALSE,
                can_share_region_map BOOLEAN NOT NULL DEFAULT FALSE,
                can_subscribe BOOLEAN NOT NULL DEFAULT FALSE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
            CREATE TABLE IF NOT EXISTS subscribes (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                subscribe_from BIGINT NOT NULL,
                subscribe_to BIGINT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_subscribe (subscribe_from, subscribe_to),
                FOREIGN KEY (subscribe_from) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (subscribe_to) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
        "#,
    },
    Migration {
        version: 9,
        name: "create_advertisement_exceptions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS advertisement_exceptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                deadline DATE NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS advertisement_exceptions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL UNIQUE,
                deadline DATE NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB;
        "#,
    },
];

/// Run all pending migrations and return how many were applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied: Vec<i64> = get_applied_migrations(pool)
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    let records = with_pool!(pool, |p| {
        sqlx::query_as::<_, MigrationRecord>(
            "SELECT version, name, applied_at FROM _migrations ORDER BY version",
        )
        .fetch_all(p)
        .await
        .context("Failed to read applied migrations")?
    });
    Ok(records)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let script = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    with_pool!(pool, |p| {
        for statement in split_sql_statements(script) {
            sqlx::query(statement)
                .execute(p)
                .await
                .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
        }

        sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version as i64)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(p)
            .await
            .context("Failed to record migration")?;
    });

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a script on `;`, dropping empty and comment-only fragments.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_comment_only(s))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Whether every known migration has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        let applied = run_migrations(&pool).await.unwrap();
        assert_eq!(applied, total_migrations());
        assert!(is_up_to_date(&pool).await.unwrap());

        let applied_again = run_migrations(&pool).await.unwrap();
        assert_eq!(applied_again, 0);
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pending_count_on_fresh_database() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), total_migrations());
    }

    #[tokio::test]
    async fn test_city_cascade_removes_visits() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let p = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('u', 'u@example.com', 'h')")
            .execute(p)
            .await
            .unwrap();
        sqlx::query("INSERT INTO regions (title, region_type, iso3166) VALUES ('Тверская', 'oblast', 'RU-TVE')")
            .execute(p)
            .await
            .unwrap();
        sqlx::query("INSERT INTO cities (title, region_id, latitude, longitude) VALUES ('Тверь', 1, 56.86, 35.9)")
            .execute(p)
            .await
            .unwrap();
        sqlx::query("INSERT INTO visited_cities (user_id, region_id, city_id, rating) VALUES (1, 1, 1, 5)")
            .execute(p)
            .await
            .unwrap();

        sqlx::query("DELETE FROM cities WHERE id = 1").execute(p).await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visited_cities")
            .fetch_one(p)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_duplicate_dated_visit_rejected() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let p = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('u', 'u@example.com', 'h')")
            .execute(p)
            .await
            .unwrap();
        sqlx::query("INSERT INTO regions (title, region_type, iso3166) VALUES ('Тверская', 'oblast', 'RU-TVE')")
            .execute(p)
            .await
            .unwrap();
        sqlx::query("INSERT INTO cities (title, region_id, latitude, longitude) VALUES ('Тверь', 1, 56.86, 35.9)")
            .execute(p)
            .await
            .unwrap();

        let insert = "INSERT INTO visited_cities (user_id, region_id, city_id, date_of_visit, rating) VALUES (1, 1, 1, '2024-05-01', 4)";
        sqlx::query(insert).execute(p).await.unwrap();
        assert!(sqlx::query(insert).execute(p).await.is_err());
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).map(|m| m.name), Some("create_users"));
        assert!(get_migration(999).is_none());
    }

    #[test]
    fn test_versions_are_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn test_split_sql_statements() {
        let statements = split_sql_statements("CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);

        let statements = split_sql_statements("-- Comment\nCREATE TABLE a (id INT);\n-- trailing");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }
}

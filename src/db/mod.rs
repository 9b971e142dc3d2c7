//! Database layer
//!
//! SQLite (default, single file) or MySQL, chosen by `database.driver`.
//! Repositories hold a [`DynDatabasePool`] and write each query once; the
//! [`with_pool!`](crate::with_pool) macro runs it against the concrete
//! backend and [`dialect::Dialect`] supplies the fragments that differ.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let cities = SqlxCityRepository::boxed(pool.clone());
//! ```

pub mod dialect;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, Database, DatabasePool, DynDatabasePool};

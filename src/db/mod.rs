//! Database layer
//!
//! SQLite is the default (single-file deployment); MySQL is available for
//! larger installations. The driver is chosen by configuration and hidden
//! behind [`DatabasePool`].
//!
//! Repositories write each query once. Both backends accept `?` placeholders,
//! so [`with_driver!`] simply runs the same body against whichever concrete
//! pool is active.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let users = SqlxUserRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, LastInsertId, MysqlDatabase,
    SqliteDatabase,
};

/// Run `$body` with `$conn` bound to the concrete pool of `$pool`'s driver.
///
/// The body is expanded once per backend, so it must type-check against
/// both `&SqlitePool` and `&MySqlPool`.
macro_rules! with_driver {
    ($pool:expr, $conn:ident => $body:expr) => {{
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool
                    .as_sqlite()
                    .ok_or_else(|| anyhow::anyhow!("SQLite pool unavailable"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool
                    .as_mysql()
                    .ok_or_else(|| anyhow::anyhow!("MySQL pool unavailable"))?;
                $body
            }
        }
    }};
}

pub(crate) use with_driver;

/// Whether `err` (or anything it wraps) is a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}

/// Open an in-memory database with every migration applied.
#[cfg(test)]
pub async fn migrated_test_pool() -> DynDatabasePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

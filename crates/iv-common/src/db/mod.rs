//! Postgres-backed persistence under the `iv` schema.

/// Declare a storage error enum that already carries the pool and driver
/// failure variants every query path can produce.
macro_rules! db_error {
    ($name:ident { $($variants:tt)* }) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("failed to get postgres connection: {0}")]
            Pool(#[from] deadpool_postgres::PoolError),
            #[error("postgres query failed: {0}")]
            Postgres(#[from] tokio_postgres::Error),
            $($variants)*
        }
    };
}

pub(crate) use db_error;

pub mod applications;
pub mod interviews;
pub mod messages;
pub mod migrations;
pub mod pg_store;
pub mod pool;
pub mod settings;
pub mod util;

pub use migrations::{run_migrations, MigrationError};
pub use pg_store::PgStore;
pub use pool::{create_pool_from_url, DbPoolError, PgPool};

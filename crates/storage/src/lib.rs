pub mod entity;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use entity::Entity;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use sqlx::postgres::PgPool;
pub use store::{Store, StoreTx};

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Schema migrations shared by the indexer and the API.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Connect to PostgreSQL with a production-ready connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await
}

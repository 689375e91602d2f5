pub mod clock;
pub mod collaborators;
pub mod dto;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use error::{ErrorClass, Result, ScoringError, StorageError};
pub use repository::{MemoryStore, PgProjectRepository, ProjectStore};
pub use services::{LifecycleSettings, ProjectLifecycle};

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> std::result::Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> std::result::Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Repository over this database's pool.
    pub fn repository(&self) -> PgProjectRepository {
        PgProjectRepository::new(self.pool.clone())
    }
}

//! Database module
//!
//! PostgreSQL integration using sqlx with:
//! - Connection pool management
//! - Row types with FromRow
//! - Repository pattern for data access
//! - `MediaStore` trait over the repositories

pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

// Re-export commonly used items
pub use pool::{create_pool, health_check, run_migrations};
pub use store::{materialize, MediaFilter, MediaStore, PgStore};

/// Failure of a store operation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt row: {0}")]
    Decode(String),
    #[error("Record not found: {0}")]
    NotFound(String),
}

//! Database repositories
//!
//! Repository pattern for database access, separating data access logic
//! from business logic.

pub mod genres;
pub mod media;
pub mod streams;

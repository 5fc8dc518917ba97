//! Service layer

pub mod cache;
pub mod catalog;
pub mod endpoint;
pub mod http;
pub mod omdb;
pub mod provider_urls;
pub mod providers;
pub mod scheduler;
pub mod streams;
pub mod tmdb;
pub mod trending;

//! HTTP request handlers.

pub mod cache_entries;
pub mod health;
pub mod maven;

pub use cache_entries::*;
pub use health::*;
pub use maven::*;

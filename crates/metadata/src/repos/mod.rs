//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod cache_entries;
pub mod catalog;
pub mod eviction;
pub mod registries;
pub mod tokens;

pub use bootstrap::BootstrapRepo;
pub use cache_entries::CacheEntryRepo;
pub use catalog::CatalogRepo;
pub use eviction::{EvictionClaim, EvictionRepo};
pub use registries::RegistryRepo;
pub use tokens::TokenRepo;

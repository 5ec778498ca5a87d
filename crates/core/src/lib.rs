//! Core domain types and shared logic for the depot artifact cache.
//!
//! This crate defines the data model used across all other crates:
//! - Request path splitting and digest requests
//! - Cache entry status lifecycle
//! - Checksum formats reported for cached artifacts
//! - Request scopes for catalog lookups
//! - Upstream registrations, staleness and object keys
//! - Token scopes and authorization

pub mod checksum;
pub mod config;
pub mod error;
pub mod path;
pub mod scope;
pub mod status;
pub mod token;
pub mod upstream;

pub use checksum::{Md5Hex, Sha1Hex};
pub use error::{Error, Result};
pub use path::{DigestFormat, digest_request, split};
pub use scope::RequestScope;
pub use status::CacheEntryStatus;
pub use token::{Token, TokenId, TokenScope};
pub use upstream::Upstream;

/// Maximum combined number of project and group ids in one catalog lookup.
pub const MAX_SCOPE_IDS: usize = 20;

/// Maximum size of an artifact written through the proxy: 5 GiB
pub const MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024 * 1024;

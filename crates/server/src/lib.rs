//! HTTP orchestrator for Maven virtual registries.
//!
//! This crate decides how each artifact request is answered:
//! - serve a locally hosted package file or a cached upstream response
//! - instruct the streaming proxy to fetch from the upstream and call back
//! - answer checksum requests from cached metadata
//!
//! Artifact bytes normally never pass through here; the proxy moves them.

pub mod auth;
pub mod bootstrap;
pub mod browser;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod proxy;
pub mod reaper;
pub mod resolve;
pub mod routes;
pub mod state;
pub mod upstream;

pub use auth::{Action, AuthenticatedUser, Authorizer, TokenAuthorizer, TraceId};
pub use error::{ApiError, ResolveFailure};
pub use reaper::{ReapStats, reap};
pub use routes::create_router;
pub use state::AppState;
pub use upstream::{FetchError, ReqwestFetcher, UpstreamFetcher, UpstreamProbe};

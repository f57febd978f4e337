//! Feature modules implementing the claims API
//!
//! Each feature is a vertical slice with its own routes and error
//! mapping. The only slice at the moment is **claims**: QD3176 claim
//! file upload plus the SSE progress stream that mirrors pipeline
//! events back to the uploader.

pub mod claims;

use axum::Router;

use crate::events::ProgressHub;
use crate::ingest::IngestProducer;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Producer staging uploads and feeding the ingest queue
    pub producer: IngestProducer,
    /// Fan-out hub for per-caller progress streams
    pub hub: ProgressHub,
}

/// Creates the main API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest("/claims", claims::claims_routes().with_state(state))
}

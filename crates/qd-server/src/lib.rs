//! QD3176 Claims Server Library
//!
//! HTTP server ingesting Vietnamese social-insurance (QD3176) medical
//! claim files.
//!
//! # Overview
//!
//! A claim file is a `GIAMDINHHS` XML envelope carrying up to fifteen
//! base64-embedded sub-documents (XML1..XML15: claim summary, drug and
//! service detail lines, discharge papers, sick-leave certificates and
//! so on). The server accepts batches of these files over multipart
//! upload, stages them to disk and processes them asynchronously:
//!
//! - **Queue**: jobs live in Postgres; workers claim them with
//!   `FOR UPDATE SKIP LOCKED`, retries use exponential backoff and
//!   malformed client input fails fast without retrying
//! - **Decoding**: the envelope is deserialized with quick-xml, each
//!   sub-document fragment is parsed into dynamic JSON with
//!   `SNAKE_CASE` element names camelized
//! - **Persistence**: one root row per claim plus a descriptor-driven
//!   fan-out into one table per sub-document type, all in a single
//!   transaction with per-type failure isolation
//! - **Progress**: pipeline events flow through Postgres
//!   `NOTIFY`/`LISTEN` to per-caller SSE streams
//!
//! ## Framework Stack
//!
//! - **Axum**: Modern, ergonomic web framework
//! - **SQLx**: PostgreSQL pool, transactions and LISTEN/NOTIFY
//! - **Tower**: Middleware and service abstractions

pub mod api;
pub mod bundle;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod normalize;
pub mod queue;
pub mod xml;

// Re-export commonly used types
pub use bundle::{ClaimBundle, SubDocType};
pub use error::AppError;

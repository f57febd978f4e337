//! Claim ingestion pipeline
//!
//! Producer side stages uploaded files to disk and enqueues one parse
//! job per file plus a trailing per-session finalize job. Worker side
//! claims jobs, decodes the claim envelope into a bundle of typed
//! sub-documents, and hands the bundle to the persistence layer.

pub mod persist;
pub mod producer;
pub mod worker;

pub use persist::{PersistHandler, PersistOutcome, SubDocOutcome, SubDocStatus};
pub use producer::{EnqueueOutcome, IngestProducer, StagedFile};
pub use worker::{spawn_workers, WorkerContext};

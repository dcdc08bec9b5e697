//! SPL workflow engine.
//!
//! # Features
//!
//! - **Import**: batches of payloads parsed, resolved and committed together
//! - **Export**: synchronous, pretty or minified
//! - **Comparison**: fidelity reports against the source or a re-import
//! - **Job tracking**: progress polling, cancellation, retention of results
//!
//! # Architecture
//!
//! - [`Engine`]: the facade callers use
//! - [`JobTracker`]: operation state machine on the tokio blocking pool
//! - [`EngineConfig`]: TOML configuration

pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod work;

pub use config::{EngineConfig, ExportSettings, JobSettings, StoreSettings};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use jobs::{
    JobContext, JobState, JobStatus, JobTracker, OperationId, OperationKind, Progress,
};
pub use work::{ImportSummary, ImportedDocument, JobOutput};

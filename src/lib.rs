// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod ratelimit;
pub mod session;
pub mod stats;
pub mod store;

// Channel ingestion (fetch, normalize, dedupe)
pub mod ingest;

// Batch scoring, discovery and reply drafting
pub mod analyze;

pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::analyze::{AnalysisResult, AnalyzedItem};
pub use crate::ingest::types::{ContentSource, Item, RawItem, SourceError};
pub use crate::pipeline::{ConnectionReport, LeadQuery, Pipeline, QueryError, QueryOutcome};

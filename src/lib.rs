//! Callscope - behavioral analytics for call transcripts
//!
//! Callscope turns transcripts into reproducible per-call feature records and
//! compares them across outcome cohorts through a deterministic pipeline:
//! chunking → marker extraction (external) → aggregation → cohort comparison.
//!
//! ## Modules
//!
//! - **Chunker**: time-windowed, overlapping transcript segmentation
//! - **Schema**: v2 agent markers and v3 decision markers
//! - **Features**: per-call aggregation into versioned feature records
//! - **Cohort**: success/failure profiles and ranked differentiators
//! - **Pipeline**: per-call state machine and bounded-concurrency batch runner

pub mod cache;
pub mod chunker;
pub mod cohort;
pub mod config;
pub mod error;
pub mod extract;
pub mod features;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod store;

pub use cache::{compare_cached, ComparisonCache};
pub use chunker::{chunk_transcript, Chunk, ChunkerConfig, TranscriptChunker, WordTimestamp};
pub use cohort::{compare, CohortComparison, CohortProfile, Differentiator};
pub use config::{ConfigError, PipelineConfig};
pub use error::{AnalysisError, ExtractionError, StoreError};
pub use extract::{ChunkExtraction, ExtractionRequest, MarkerExtractor};
pub use features::{AgentAggregator, DecisionAggregator, FeatureRecord};
pub use pipeline::{CallOutcome, CallPipeline, CallStatus};
pub use schema::{MarkerSet, SchemaVersion};
pub use store::{CallRecord, InMemoryRecordStore, RecordStore, Transcript};

/// Callscope version
pub const CALLSCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded by tools built on this crate
pub const PRODUCER_NAME: &str = "callscope";

//! Error types for Callscope

use thiserror::Error;

use crate::pipeline::CallStatus;

/// Errors that can occur while analyzing a call
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Transcript missing for call {0}")]
    MissingTranscript(String),

    #[error("Transcript for call {call_id} is not ready (status: {status})")]
    TranscriptNotReady { call_id: String, status: String },

    #[error("Transcript for call {0} is empty")]
    EmptyTranscript(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: CallStatus, to: CallStatus },

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by the external record store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the marker extraction collaborator
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("Extraction request failed: {0}")]
    RequestFailed(String),

    #[error("Extraction response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("Extraction rate limited")]
    RateLimited,

    #[error("Extractor returned {found} markers but is configured for {expected}")]
    SchemaMismatch { expected: String, found: String },
}

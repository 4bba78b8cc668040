//! Record store seam
//!
//! The orchestrator persists call status, markers and aggregates through
//! [`RecordStore`]. [`InMemoryRecordStore`] backs the tests and the CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::chunker::WordTimestamp;
use crate::error::StoreError;
use crate::features::FeatureRecord;
use crate::pipeline::CallStatus;
use crate::schema::MarkerSet;

/// Transcription progress for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "pending",
            TranscriptStatus::Processing => "processing",
            TranscriptStatus::Ready => "ready",
            TranscriptStatus::Failed => "failed",
        }
    }
}

/// Transcript text with optional timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub words: Option<Vec<WordTimestamp>>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    pub status: TranscriptStatus,
}

impl Transcript {
    /// A finished transcript
    pub fn ready(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            words: None,
            duration_seconds: None,
            status: TranscriptStatus::Ready,
        }
    }

    pub fn with_words(mut self, words: Vec<WordTimestamp>) -> Self {
        self.words = Some(words);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Call length: explicit duration, else the last word's end time
    pub fn effective_duration(&self) -> Option<f64> {
        self.duration_seconds.or_else(|| {
            self.words
                .as_ref()
                .and_then(|w| w.iter().map(|w| w.end).reduce(f64::max))
        })
    }
}

/// A persisted call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub transcript: Option<Transcript>,
    pub status: CallStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    /// A pending call with a freshly generated id
    pub fn new(transcript: Option<Transcript>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), transcript)
    }

    pub fn with_id(id: impl Into<String>, transcript: Option<Transcript>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            transcript,
            status: CallStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence operations the orchestrator relies on
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_call(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError>;

    async fn create_call(&self, record: CallRecord) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Replace the call's markers, returning how many were stored
    async fn create_markers(&self, call_id: &str, markers: MarkerSet) -> Result<usize, StoreError>;

    /// Replace the call's aggregate
    async fn create_aggregate(&self, call_id: &str, record: FeatureRecord) -> Result<(), StoreError>;

    async fn find_aggregate(&self, call_id: &str) -> Result<Option<FeatureRecord>, StoreError>;
}

#[derive(Default)]
struct Tables {
    calls: HashMap<String, CallRecord>,
    markers: HashMap<String, MarkerSet>,
    aggregates: HashMap<String, FeatureRecord>,
}

/// Process-local [`RecordStore`]
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn find_markers(&self, call_id: &str) -> Option<MarkerSet> {
        self.tables.read().await.markers.get(call_id).cloned()
    }

    pub async fn call_count(&self) -> usize {
        self.tables.read().await.calls.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_call(&self, call_id: &str) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.tables.read().await.calls.get(call_id).cloned())
    }

    async fn create_call(&self, record: CallRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.calls.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        tables.calls.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_status(
        &self,
        call_id: &str,
        status: CallStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let call = tables
            .calls
            .get_mut(call_id)
            .ok_or_else(|| StoreError::NotFound(call_id.to_string()))?;
        call.status = status;
        call.error = error;
        call.updated_at = Utc::now();
        Ok(())
    }

    async fn create_markers(&self, call_id: &str, markers: MarkerSet) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.calls.contains_key(call_id) {
            return Err(StoreError::NotFound(call_id.to_string()));
        }
        let count = markers.len();
        tables.markers.insert(call_id.to_string(), markers);
        Ok(count)
    }

    async fn create_aggregate(&self, call_id: &str, record: FeatureRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.calls.contains_key(call_id) {
            return Err(StoreError::NotFound(call_id.to_string()));
        }
        tables.aggregates.insert(call_id.to_string(), record);
        Ok(())
    }

    async fn find_aggregate(&self, call_id: &str) -> Result<Option<FeatureRecord>, StoreError> {
        Ok(self.tables.read().await.aggregates.get(call_id).cloned())
    }
}

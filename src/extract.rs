//! Marker extraction seam
//!
//! Marker detection happens outside this crate (typically a language model).
//! The orchestrator sends one [`ExtractionRequest`] per chunk and consumes the
//! typed [`ChunkExtraction`] that comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::chunker::Chunk;
use crate::error::ExtractionError;
use crate::schema::nlu::NluResults;
use crate::schema::v2::AgentCallMetrics;
use crate::schema::v3::DecisionCallMetrics;
use crate::schema::{MarkerSet, SchemaVersion};

/// One chunk to run through the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub call_id: String,
    pub chunk: Chunk,
    pub schema_version: SchemaVersion,
}

/// Per-call metrics reported alongside a chunk's markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_version", content = "metrics", rename_all = "lowercase")]
pub enum CallMetrics {
    V2(AgentCallMetrics),
    V3(DecisionCallMetrics),
}

/// What the extractor found in one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkExtraction {
    pub markers: MarkerSet,
    #[serde(default)]
    pub metrics: Option<CallMetrics>,
    #[serde(default)]
    pub nlu: Option<NluResults>,
}

impl ChunkExtraction {
    pub fn new(markers: MarkerSet) -> Self {
        Self {
            markers,
            metrics: None,
            nlu: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CallMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_nlu(mut self, nlu: NluResults) -> Self {
        self.nlu = Some(nlu);
        self
    }
}

/// Produces markers for a chunk of transcript
#[async_trait]
pub trait MarkerExtractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> Result<ChunkExtraction, ExtractionError>;

    fn name(&self) -> &str;
}

/// Extractor that replays queued responses in order.
///
/// Once the queue is drained every request yields an empty marker set in the
/// requested schema.
pub struct ScriptedExtractor {
    responses: Mutex<VecDeque<Result<ChunkExtraction, ExtractionError>>>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn add_response(&self, response: Result<ChunkExtraction, ExtractionError>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    pub fn add_responses(
        &self,
        responses: impl IntoIterator<Item = Result<ChunkExtraction, ExtractionError>>,
    ) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.extend(responses);
        }
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for ScriptedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarkerExtractor for ScriptedExtractor {
    async fn extract(&self, request: ExtractionRequest) -> Result<ChunkExtraction, ExtractionError> {
        let version = request.schema_version;
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }

        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(extraction)) if extraction.markers.schema_version() != version => {
                Err(ExtractionError::SchemaMismatch {
                    expected: version.to_string(),
                    found: extraction.markers.schema_version().to_string(),
                })
            }
            Some(response) => response,
            None => Ok(ChunkExtraction::new(MarkerSet::empty(version))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

//! Call pipeline orchestration
//!
//! Drives one call through chunk -> extract -> persist markers -> aggregate
//! -> persist aggregate, moving its status along
//! `pending -> extracting -> aggregating -> complete`. Any fatal step moves
//! the call to `error`; callers always get a [`CallOutcome`] back, never an
//! `Err`.
//!
//! Batch and submit modes share one semaphore, so the number of calls in
//! flight never exceeds `batch_concurrency`.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunker::{Chunk, TranscriptChunker};
use crate::config::{ConfigError, PipelineConfig};
use crate::error::AnalysisError;
use crate::extract::{CallMetrics, ExtractionRequest, MarkerExtractor};
use crate::features::{AgentAggregator, DecisionAggregator, FeatureRecord};
use crate::schema::nlu::NluResults;
use crate::schema::MarkerSet;
use crate::store::{RecordStore, Transcript, TranscriptStatus};

/// Processing status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Extracting,
    Aggregating,
    Complete,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Extracting => "extracting",
            CallStatus::Aggregating => "aggregating",
            CallStatus::Complete => "complete",
            CallStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Complete | CallStatus::Error)
    }

    /// Whether the orchestrator may move a call from `self` to `next`.
    ///
    /// Extraction may (re)start from pending, error or complete.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        match (self, next) {
            (Pending | Error | Complete, Extracting) => true,
            (Extracting, Aggregating) => true,
            (Aggregating, Complete) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settled result of processing one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub call_id: String,
    pub status: CallStatus,
    /// Markers persisted for the call (after dedup)
    pub marker_count: usize,
    pub error: Option<String>,
}

impl CallOutcome {
    fn complete(call_id: &str, marker_count: usize) -> Self {
        Self {
            call_id: call_id.to_string(),
            status: CallStatus::Complete,
            marker_count,
            error: None,
        }
    }

    fn failed(call_id: &str, error: &AnalysisError) -> Self {
        Self {
            call_id: call_id.to_string(),
            status: CallStatus::Error,
            marker_count: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Complete
    }
}

/// Markers and side-channel results collected across a call's chunks
struct Collected {
    markers: MarkerSet,
    metrics: Option<CallMetrics>,
    nlu: Option<NluResults>,
    failed_chunks: usize,
}

/// Orchestrates calls against a record store and a marker extractor
#[derive(Clone)]
pub struct CallPipeline {
    store: Arc<dyn RecordStore>,
    extractor: Arc<dyn MarkerExtractor>,
    config: PipelineConfig,
    chunker: TranscriptChunker,
    permits: Arc<Semaphore>,
}

impl CallPipeline {
    /// Build a pipeline, rejecting configs whose chunk windows would not
    /// advance or whose concurrency is zero.
    pub fn new(
        store: Arc<dyn RecordStore>,
        extractor: Arc<dyn MarkerExtractor>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let chunker = TranscriptChunker::new(config.chunking.clone())?;
        let permits = Arc::new(Semaphore::new(config.batch_concurrency));
        Ok(Self {
            store,
            extractor,
            config,
            chunker,
            permits,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one call to a settled outcome.
    ///
    /// Concurrent invocations for the same call id are not guarded against;
    /// callers must serialize them.
    pub async fn process_call(&self, call_id: &str) -> CallOutcome {
        info!(call_id, schema = %self.config.schema_version, "Processing call");

        match self.run(call_id).await {
            Ok(marker_count) => {
                info!(call_id, marker_count, "Call complete");
                CallOutcome::complete(call_id, marker_count)
            }
            Err(err) => {
                error!(call_id, error = %err, "Call failed");
                self.mark_failed(call_id, &err).await;
                CallOutcome::failed(call_id, &err)
            }
        }
    }

    /// Spawn `process_call` as a task. The task waits for a free slot on
    /// the pipeline's semaphore before starting.
    pub fn submit(&self, call_id: impl Into<String>) -> JoinHandle<CallOutcome> {
        let pipeline = self.clone();
        let call_id = call_id.into();
        debug!(call_id = %call_id, "Submitting call");
        tokio::spawn(async move { pipeline.process_gated(&call_id).await })
    }

    /// Process calls in groups of `batch_concurrency`, finishing each group
    /// before starting the next. Every id gets an outcome, in input order.
    pub async fn process_batch(&self, call_ids: &[String]) -> Vec<CallOutcome> {
        let group_size = self.config.batch_concurrency.max(1);
        let mut outcomes = Vec::with_capacity(call_ids.len());

        for (group, ids) in call_ids.chunks(group_size).enumerate() {
            info!(group, calls = ids.len(), "Starting batch group");
            let settled = join_all(ids.iter().map(|id| self.process_gated(id))).await;
            let failed = settled.iter().filter(|o| !o.is_success()).count();
            info!(group, failed, "Batch group settled");
            outcomes.extend(settled);
        }

        outcomes
    }

    async fn process_gated(&self, call_id: &str) -> CallOutcome {
        // The semaphore is never closed, so acquiring only waits
        let _permit = self.permits.acquire().await.ok();
        self.process_call(call_id).await
    }

    async fn run(&self, call_id: &str) -> Result<usize, AnalysisError> {
        let record = self
            .store
            .find_call(call_id)
            .await?
            .ok_or_else(|| AnalysisError::CallNotFound(call_id.to_string()))?;

        let mut status = record.status;
        if !status.can_transition_to(CallStatus::Extracting) {
            return Err(AnalysisError::InvalidTransition {
                from: status,
                to: CallStatus::Extracting,
            });
        }

        let transcript = ready_transcript(call_id, record.transcript)?;

        self.advance(call_id, &mut status, CallStatus::Extracting).await?;

        let chunks = self.chunker.chunk(
            &transcript.text,
            transcript.words.as_deref(),
            transcript.duration_seconds,
        );
        debug!(call_id, chunks = chunks.len(), "Transcript chunked");

        let mut collected = self.extract_chunks(call_id, &chunks).await;
        let removed = collected.markers.dedup();
        if removed > 0 {
            debug!(call_id, removed, "Dropped duplicate markers from overlapping windows");
        }
        if collected.failed_chunks > 0 {
            warn!(
                call_id,
                failed = collected.failed_chunks,
                total = chunks.len(),
                "Some chunks produced no markers"
            );
        }

        let marker_count = self
            .store
            .create_markers(call_id, collected.markers.clone())
            .await?;

        self.advance(call_id, &mut status, CallStatus::Aggregating).await?;

        let duration = transcript
            .effective_duration()
            .or_else(|| chunks.last().map(|c| c.end_time))
            .unwrap_or(0.0);
        let aggregate = aggregate(collected, duration);
        self.store.create_aggregate(call_id, aggregate).await?;

        self.advance(call_id, &mut status, CallStatus::Complete).await?;
        Ok(marker_count)
    }

    /// Call the extractor once per chunk. Failures leave that chunk empty.
    async fn extract_chunks(&self, call_id: &str, chunks: &[Chunk]) -> Collected {
        let version = self.config.schema_version;
        let mut collected = Collected {
            markers: MarkerSet::empty(version),
            metrics: None,
            nlu: None,
            failed_chunks: 0,
        };

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.config.extraction_delay.is_zero() {
                tokio::time::sleep(self.config.extraction_delay).await;
            }

            let request = ExtractionRequest {
                call_id: call_id.to_string(),
                chunk: chunk.clone(),
                schema_version: version,
            };

            let extraction = match self.extractor.extract(request).await {
                Ok(extraction) => extraction,
                Err(err) => {
                    warn!(call_id, chunk = chunk.index, error = %err, "Extraction failed");
                    collected.failed_chunks += 1;
                    continue;
                }
            };

            if let Err(found) = collected.markers.extend(extraction.markers) {
                warn!(
                    call_id,
                    chunk = chunk.index,
                    expected = %version,
                    %found,
                    "Extractor returned markers in the wrong schema"
                );
                collected.failed_chunks += 1;
                continue;
            }

            if let Some(metrics) = extraction.metrics {
                collected.metrics = Some(metrics);
            }
            if let Some(nlu) = extraction.nlu {
                collected.nlu.get_or_insert_with(NluResults::default).merge(nlu);
            }
        }

        collected
    }

    async fn advance(
        &self,
        call_id: &str,
        status: &mut CallStatus,
        next: CallStatus,
    ) -> Result<(), AnalysisError> {
        if !status.can_transition_to(next) {
            return Err(AnalysisError::InvalidTransition {
                from: *status,
                to: next,
            });
        }
        self.store.update_status(call_id, next, None).await?;
        debug!(call_id, from = %status, to = %next, "Status updated");
        *status = next;
        Ok(())
    }

    async fn mark_failed(&self, call_id: &str, err: &AnalysisError) {
        // The record is missing, or another run owns it
        if matches!(
            err,
            AnalysisError::CallNotFound(_) | AnalysisError::InvalidTransition { .. }
        ) {
            return;
        }
        if let Err(store_err) = self
            .store
            .update_status(call_id, CallStatus::Error, Some(err.to_string()))
            .await
        {
            warn!(call_id, error = %store_err, "Could not record call failure");
        }
    }
}

fn ready_transcript(call_id: &str, transcript: Option<Transcript>) -> Result<Transcript, AnalysisError> {
    let transcript =
        transcript.ok_or_else(|| AnalysisError::MissingTranscript(call_id.to_string()))?;

    if transcript.status != TranscriptStatus::Ready {
        return Err(AnalysisError::TranscriptNotReady {
            call_id: call_id.to_string(),
            status: transcript.status.as_str().to_string(),
        });
    }

    let has_words = transcript.words.as_ref().is_some_and(|w| !w.is_empty());
    if transcript.text.trim().is_empty() && !has_words {
        return Err(AnalysisError::EmptyTranscript(call_id.to_string()));
    }

    Ok(transcript)
}

fn aggregate(collected: Collected, duration: f64) -> FeatureRecord {
    match collected.markers {
        MarkerSet::V2(markers) => {
            let metrics = match &collected.metrics {
                Some(CallMetrics::V2(m)) => Some(m),
                _ => None,
            };
            FeatureRecord::V2(AgentAggregator::aggregate(markers, duration, metrics))
        }
        MarkerSet::V3(markers) => {
            let metrics = match &collected.metrics {
                Some(CallMetrics::V3(m)) => Some(m),
                _ => None,
            };
            FeatureRecord::V3(DecisionAggregator::aggregate(
                markers,
                metrics,
                collected.nlu.as_ref(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::extract::{ChunkExtraction, ScriptedExtractor};
    use crate::schema::v3::{
        CommitmentQualityMarker, CommitmentType, ConstraintMarker, ConstraintType,
        DecisionCallMetrics, DecisionMarker, Severity,
    };
    use crate::schema::{CallTone, PredictedOutcome, SchemaVersion, Speaker};
    use crate::store::{CallRecord, InMemoryRecordStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_extraction_delay(Duration::ZERO)
    }

    fn constraint(time: f64) -> DecisionMarker {
        DecisionMarker::CustomerConstraint(ConstraintMarker {
            time,
            confidence: 0.9,
            description: "need to ask my wife".to_string(),
            constraint_type: ConstraintType::Authority,
            severity: Severity::Medium,
            explicit: true,
        })
    }

    fn commitment(time: f64) -> DecisionMarker {
        DecisionMarker::CommitmentQuality(CommitmentQualityMarker {
            time,
            confidence: 0.8,
            description: "will pay friday".to_string(),
            commitment_type: CommitmentType::Payment,
            initiator: Speaker::Customer,
            reversible: false,
            time_since_last_constraint: Some(10.0),
        })
    }

    async fn store_with(call: CallRecord) -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        store.create_call(call).await.unwrap();
        store
    }

    #[test]
    fn test_status_transitions() {
        use CallStatus::*;
        assert!(Pending.can_transition_to(Extracting));
        assert!(Error.can_transition_to(Extracting));
        assert!(Complete.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Aggregating));
        assert!(Aggregating.can_transition_to(Complete));
        assert!(Extracting.can_transition_to(Error));
        assert!(Pending.can_transition_to(Error));

        assert!(!Pending.can_transition_to(Complete));
        assert!(!Extracting.can_transition_to(Extracting));
        assert!(!Complete.can_transition_to(Error));
        assert!(Complete.is_terminal() && Error.is_terminal());
        assert!(!Aggregating.is_terminal());
    }

    #[tokio::test]
    async fn test_process_call_completes_and_persists() {
        let store = store_with(CallRecord::with_id(
            "c1",
            Some(Transcript::ready("I need to ask my wife but I will pay friday")),
        ))
        .await;
        let extractor = Arc::new(ScriptedExtractor::new());
        extractor.add_response(Ok(ChunkExtraction::new(MarkerSet::V3(vec![
            constraint(2.0),
            commitment(12.0),
            constraint(2.0),
        ]))
        .with_metrics(CallMetrics::V3(DecisionCallMetrics {
            predicted_outcome: PredictedOutcome::Success,
            outcome_confidence: 0.7,
            call_tone: CallTone::Neutral,
        }))));

        let pipeline = CallPipeline::new(store.clone(), extractor, config()).unwrap();
        let outcome = pipeline.process_call("c1").await;

        assert_eq!(outcome, CallOutcome::complete("c1", 2));
        let call = store.find_call("c1").await.unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Complete);

        let aggregate = store.find_aggregate("c1").await.unwrap().unwrap();
        let features = aggregate.as_v3().unwrap();
        assert_eq!(features.marker_count, 2);
        assert_eq!(features.outcome_confidence, 0.7);
        assert!(features.commitments.commitment_after_unresolved_constraint);
    }

    #[tokio::test]
    async fn test_extraction_failure_degrades_to_no_markers() {
        let store = store_with(CallRecord::with_id("c1", Some(Transcript::ready("hello")))).await;
        let extractor = Arc::new(ScriptedExtractor::new());
        extractor.add_response(Err(ExtractionError::RequestFailed("timeout".to_string())));

        let pipeline = CallPipeline::new(store.clone(), extractor, config()).unwrap();
        let outcome = pipeline.process_call("c1").await;

        assert!(outcome.is_success());
        assert_eq!(outcome.marker_count, 0);
        let aggregate = store.find_aggregate("c1").await.unwrap().unwrap();
        assert_eq!(aggregate.schema_version(), SchemaVersion::V3);
        assert_eq!(aggregate.marker_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_transcript_marks_error() {
        let store = store_with(CallRecord::with_id("c1", None)).await;
        let pipeline =
            CallPipeline::new(store.clone(), Arc::new(ScriptedExtractor::new()), config()).unwrap();

        let outcome = pipeline.process_call("c1").await;
        assert_eq!(outcome.status, CallStatus::Error);
        assert!(outcome.error.unwrap().contains("Transcript missing"));

        let call = store.find_call("c1").await.unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Error);
        assert!(call.error.is_some());
    }

    #[tokio::test]
    async fn test_transcript_not_ready_marks_error() {
        let mut transcript = Transcript::ready("hello");
        transcript.status = TranscriptStatus::Processing;
        let store = store_with(CallRecord::with_id("c1", Some(transcript))).await;
        let pipeline =
            CallPipeline::new(store.clone(), Arc::new(ScriptedExtractor::new()), config()).unwrap();

        let outcome = pipeline.process_call("c1").await;
        assert_eq!(outcome.status, CallStatus::Error);
        assert!(outcome.error.unwrap().contains("processing"));
    }

    #[tokio::test]
    async fn test_unknown_call_returns_error_outcome() {
        let store = Arc::new(InMemoryRecordStore::new());
        let pipeline =
            CallPipeline::new(store, Arc::new(ScriptedExtractor::new()), config()).unwrap();

        let outcome = pipeline.process_call("ghost").await;
        assert_eq!(outcome.status, CallStatus::Error);
        assert_eq!(outcome.marker_count, 0);
    }

    #[tokio::test]
    async fn test_errored_call_can_be_rerun() {
        let store = store_with(CallRecord::with_id("c1", Some(Transcript::ready("hello")))).await;
        store
            .update_status("c1", CallStatus::Error, Some("earlier failure".to_string()))
            .await
            .unwrap();

        let pipeline =
            CallPipeline::new(store.clone(), Arc::new(ScriptedExtractor::new()), config()).unwrap();
        assert!(pipeline.process_call("c1").await.is_success());

        let call = store.find_call("c1").await.unwrap().unwrap();
        assert_eq!(call.error, None);
    }

    #[tokio::test]
    async fn test_in_progress_call_is_not_restarted() {
        let store = store_with(CallRecord::with_id("c1", Some(Transcript::ready("hello")))).await;
        store
            .update_status("c1", CallStatus::Aggregating, None)
            .await
            .unwrap();

        let pipeline =
            CallPipeline::new(store.clone(), Arc::new(ScriptedExtractor::new()), config()).unwrap();
        let outcome = pipeline.process_call("c1").await;
        assert_eq!(outcome.status, CallStatus::Error);

        // The other run still owns the record
        let call = store.find_call("c1").await.unwrap().unwrap();
        assert_eq!(call.status, CallStatus::Aggregating);
    }

    #[tokio::test]
    async fn test_wrong_schema_chunk_is_skipped() {
        /// Answers in v2 whatever version was requested
        struct LegacyExtractor;

        #[async_trait::async_trait]
        impl MarkerExtractor for LegacyExtractor {
            async fn extract(
                &self,
                request: ExtractionRequest,
            ) -> Result<ChunkExtraction, ExtractionError> {
                assert_eq!(request.schema_version, SchemaVersion::V3);
                Ok(ChunkExtraction::new(MarkerSet::V2(Vec::new())).with_metrics(
                    CallMetrics::V3(DecisionCallMetrics {
                        predicted_outcome: PredictedOutcome::Failure,
                        outcome_confidence: 0.9,
                        call_tone: CallTone::Tense,
                    }),
                ))
            }

            fn name(&self) -> &str {
                "legacy"
            }
        }

        let store = store_with(CallRecord::with_id("c1", Some(Transcript::ready("hello")))).await;
        let pipeline =
            CallPipeline::new(store.clone(), Arc::new(LegacyExtractor), config()).unwrap();

        let chunks = pipeline.chunker.chunk("hello", None, None);
        let collected = pipeline.extract_chunks("c1", &chunks).await;
        assert_eq!(collected.failed_chunks, 1);
        assert_eq!(collected.markers, MarkerSet::empty(SchemaVersion::V3));
        // Nothing from a rejected chunk is kept
        assert_eq!(collected.metrics, None);

        let outcome = pipeline.process_call("c1").await;
        assert!(outcome.is_success());
        assert_eq!(outcome.marker_count, 0);
        let aggregate = store.find_aggregate("c1").await.unwrap().unwrap();
        assert_eq!(aggregate.schema_version(), SchemaVersion::V3);
        assert_eq!(aggregate.as_v3().unwrap().predicted_outcome, None);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_windows_that_cannot_advance() {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut stalled = config();
        stalled.chunking.overlap_seconds = stalled.chunking.window_seconds;

        let result =
            CallPipeline::new(store.clone(), Arc::new(ScriptedExtractor::new()), stalled);
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));

        let idle = config().with_batch_concurrency(0);
        let result = CallPipeline::new(store, Arc::new(ScriptedExtractor::new()), idle);
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_submit_returns_observable_handle() {
        let store = store_with(CallRecord::with_id("c1", Some(Transcript::ready("hello")))).await;
        let pipeline =
            CallPipeline::new(store, Arc::new(ScriptedExtractor::new()), config()).unwrap();

        let outcome = pipeline.submit("c1").await.unwrap();
        assert!(outcome.is_success());
    }
}

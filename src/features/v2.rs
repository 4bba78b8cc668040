//! Agent-marker aggregation (schema v2)
//!
//! Folds the v2 markers of one call into counts, density, a timing
//! distribution over call thirds, confidence summaries and a bigram table of
//! consecutive marker kinds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{mean_or_zero, ratio};
use crate::schema::v2::{AgentCallFlags, AgentCallMetrics, AgentMarker, AgentMarkerKind};
use crate::schema::{CallTone, PredictedOutcome};

/// Separator used in sequence keys (`"blocker->stall"`)
pub const SEQUENCE_SEPARATOR: &str = "->";

/// One value per v2 marker kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentKindValues<T> {
    pub commitment: T,
    pub blocker: T,
    pub resolution_attempt: T,
    pub control: T,
    pub stall: T,
}

impl<T: Copy> AgentKindValues<T> {
    pub fn get(&self, kind: AgentMarkerKind) -> T {
        match kind {
            AgentMarkerKind::Commitment => self.commitment,
            AgentMarkerKind::Blocker => self.blocker,
            AgentMarkerKind::ResolutionAttempt => self.resolution_attempt,
            AgentMarkerKind::Control => self.control,
            AgentMarkerKind::Stall => self.stall,
        }
    }

    pub fn get_mut(&mut self, kind: AgentMarkerKind) -> &mut T {
        match kind {
            AgentMarkerKind::Commitment => &mut self.commitment,
            AgentMarkerKind::Blocker => &mut self.blocker,
            AgentMarkerKind::ResolutionAttempt => &mut self.resolution_attempt,
            AgentMarkerKind::Control => &mut self.control,
            AgentMarkerKind::Stall => &mut self.stall,
        }
    }
}

/// Marker counts per third of the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdsDistribution {
    pub first_third: u32,
    pub middle_third: u32,
    pub final_third: u32,
}

/// v2 feature record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFeatures {
    pub marker_count: u32,
    pub call_duration_seconds: f64,
    pub counts: AgentKindValues<u32>,
    /// Markers per minute of call
    pub density_per_minute: f64,
    pub timing: ThirdsDistribution,
    pub avg_confidence: f64,
    pub confidence_by_type: AgentKindValues<f64>,
    /// Consecutive-kind transitions over the full sorted sequence
    pub sequences: BTreeMap<String, u32>,
    pub unresolved_blocker_count: u32,
    /// Resolved blockers / blockers
    pub resolution_rate: f64,

    // Objection/agreement timestamps kept for older consumers
    pub first_blocker_time: Option<f64>,
    pub last_blocker_time: Option<f64>,
    pub first_commitment_time: Option<f64>,
    pub last_commitment_time: Option<f64>,

    // Auxiliary metrics
    pub predicted_outcome: Option<PredictedOutcome>,
    pub outcome_confidence: f64,
    pub call_tone: Option<CallTone>,
    pub flags: AgentCallFlags,
    pub keywords: Vec<String>,
}

/// Aggregator for v2 agent markers
pub struct AgentAggregator;

impl AgentAggregator {
    /// Aggregate the markers of one call.
    ///
    /// A non-positive or non-finite duration is treated as unknown: density
    /// is reported as 0 and the thirds distribution is left empty.
    pub fn aggregate(
        mut markers: Vec<AgentMarker>,
        call_duration_seconds: f64,
        metrics: Option<&AgentCallMetrics>,
    ) -> AgentFeatures {
        let duration = if call_duration_seconds.is_finite() && call_duration_seconds > 0.0 {
            call_duration_seconds
        } else {
            0.0
        };

        // Stable sort keeps extraction order for simultaneous markers
        markers.sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));

        let marker_count = markers.len() as u32;

        let mut counts = AgentKindValues::<u32>::default();
        for marker in &markers {
            *counts.get_mut(marker.kind()) += 1;
        }

        let density_per_minute = ratio(marker_count as f64 * 60.0, duration);
        let timing = compute_thirds(&markers, duration);

        let avg_confidence = mean_or_zero(markers.iter().map(AgentMarker::confidence));
        let mut confidence_by_type = AgentKindValues::<f64>::default();
        for kind in AgentMarkerKind::ALL {
            *confidence_by_type.get_mut(kind) = mean_or_zero(
                markers
                    .iter()
                    .filter(|m| m.kind() == kind)
                    .map(AgentMarker::confidence),
            );
        }

        let sequences = compute_sequences(&markers);

        let (blockers, resolved_blockers) = markers.iter().fold((0u32, 0u32), |(all, resolved), m| {
            match m {
                AgentMarker::Blocker(b) => (all + 1, resolved + u32::from(b.resolved)),
                _ => (all, resolved),
            }
        });

        let (first_blocker_time, last_blocker_time) =
            first_and_last(&markers, AgentMarkerKind::Blocker);
        let (first_commitment_time, last_commitment_time) =
            first_and_last(&markers, AgentMarkerKind::Commitment);

        AgentFeatures {
            marker_count,
            call_duration_seconds: duration,
            counts,
            density_per_minute,
            timing,
            avg_confidence,
            confidence_by_type,
            sequences,
            unresolved_blocker_count: blockers - resolved_blockers,
            resolution_rate: ratio(resolved_blockers as f64, blockers as f64),
            first_blocker_time,
            last_blocker_time,
            first_commitment_time,
            last_commitment_time,
            predicted_outcome: metrics.map(|m| m.predicted_outcome),
            outcome_confidence: metrics.map(|m| m.outcome_confidence).unwrap_or(0.0),
            call_tone: metrics.map(|m| m.call_tone),
            flags: metrics.map(|m| m.flags.clone()).unwrap_or_default(),
            keywords: metrics.map(|m| sorted_keywords(&m.keywords)).unwrap_or_default(),
        }
    }
}

fn compute_thirds(markers: &[AgentMarker], duration: f64) -> ThirdsDistribution {
    let mut timing = ThirdsDistribution::default();
    if duration <= 0.0 {
        return timing;
    }

    let third = duration / 3.0;
    for marker in markers {
        let start = marker.start_time();
        if start < third {
            timing.first_third += 1;
        } else if start < 2.0 * third {
            timing.middle_third += 1;
        } else {
            timing.final_third += 1;
        }
    }
    timing
}

fn compute_sequences(sorted: &[AgentMarker]) -> BTreeMap<String, u32> {
    let mut sequences = BTreeMap::new();
    for pair in sorted.windows(2) {
        let key = format!(
            "{}{}{}",
            pair[0].kind().label(),
            SEQUENCE_SEPARATOR,
            pair[1].kind().label()
        );
        *sequences.entry(key).or_insert(0) += 1;
    }
    sequences
}

fn first_and_last(sorted: &[AgentMarker], kind: AgentMarkerKind) -> (Option<f64>, Option<f64>) {
    let mut of_kind = sorted.iter().filter(|m| m.kind() == kind);
    let first = of_kind.next().map(AgentMarker::start_time);
    let last = of_kind.last().map(AgentMarker::start_time).or(first);
    (first, last)
}

fn sorted_keywords(keywords: &[String]) -> Vec<String> {
    let mut keywords: Vec<String> = keywords.iter().map(|k| k.trim().to_lowercase()).collect();
    keywords.retain(|k| !k.is_empty());
    keywords.sort();
    keywords.dedup();
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::v2::{
        BlockerEvent, BlockerType, CommitmentEvent, CommitmentStrength, ResolutionApproach,
        ResolutionAttempt, StallEvent, StallType,
    };
    use crate::schema::Speaker;
    use pretty_assertions::assert_eq;

    fn blocker(start: f64, resolved: bool, confidence: f64) -> AgentMarker {
        AgentMarker::Blocker(BlockerEvent {
            start_time: start,
            end_time: start + 5.0,
            confidence,
            description: "too expensive".to_string(),
            blocker_type: BlockerType::Price,
            resolved,
        })
    }

    fn resolution(start: f64) -> AgentMarker {
        AgentMarker::ResolutionAttempt(ResolutionAttempt {
            start_time: start,
            end_time: start + 5.0,
            confidence: 0.6,
            description: "explains payment plan".to_string(),
            approach: ResolutionApproach::Reframe,
            successful: Some(true),
        })
    }

    fn commitment(start: f64) -> AgentMarker {
        AgentMarker::Commitment(CommitmentEvent {
            start_time: start,
            end_time: start + 2.0,
            confidence: 1.0,
            description: "agrees to pay".to_string(),
            strength: CommitmentStrength::Firm,
            committed_by: Speaker::Customer,
        })
    }

    fn stall(start: f64) -> AgentMarker {
        AgentMarker::Stall(StallEvent {
            start_time: start,
            end_time: start + 3.0,
            confidence: 0.5,
            description: "let me think about it".to_string(),
            stall_type: StallType::ThinkAboutIt,
        })
    }

    #[test]
    fn test_empty_markers_yield_zeroed_record() {
        let features = AgentAggregator::aggregate(Vec::new(), 300.0, None);

        assert_eq!(features.marker_count, 0);
        assert_eq!(features.counts, AgentKindValues::default());
        assert_eq!(features.density_per_minute, 0.0);
        assert_eq!(features.timing, ThirdsDistribution::default());
        assert_eq!(features.avg_confidence, 0.0);
        assert_eq!(features.confidence_by_type, AgentKindValues::default());
        assert!(features.sequences.is_empty());
        assert_eq!(features.resolution_rate, 0.0);
        assert_eq!(features.first_blocker_time, None);
        assert_eq!(features.last_blocker_time, None);
        assert_eq!(features.first_commitment_time, None);
        assert_eq!(features.last_commitment_time, None);
        assert_eq!(features.predicted_outcome, None);
    }

    #[test]
    fn test_zero_duration_does_not_divide_by_zero() {
        let features = AgentAggregator::aggregate(vec![blocker(10.0, false, 0.9)], 0.0, None);
        assert_eq!(features.density_per_minute, 0.0);
        assert_eq!(features.timing, ThirdsDistribution::default());
        assert_eq!(features.marker_count, 1);

        let features = AgentAggregator::aggregate(vec![stall(1.0)], f64::NAN, None);
        assert!(features.density_per_minute.is_finite());
    }

    #[test]
    fn test_counts_density_and_thirds() {
        let markers = vec![
            blocker(10.0, true, 0.8),
            resolution(20.0),
            blocker(100.0, false, 0.6),
            stall(150.0),
            commitment(250.0),
        ];
        let features = AgentAggregator::aggregate(markers, 300.0, None);

        assert_eq!(features.marker_count, 5);
        assert_eq!(features.counts.blocker, 2);
        assert_eq!(features.counts.resolution_attempt, 1);
        assert_eq!(features.counts.commitment, 1);
        assert_eq!(features.counts.control, 0);
        assert_eq!(features.density_per_minute, 1.0);
        assert_eq!(
            features.timing,
            ThirdsDistribution {
                first_third: 2,
                middle_third: 2,
                final_third: 1,
            }
        );
        assert_eq!(features.unresolved_blocker_count, 1);
        assert_eq!(features.resolution_rate, 0.5);
        assert!((features.confidence_by_type.blocker - 0.7).abs() < 1e-9);
        assert_eq!(features.confidence_by_type.control, 0.0);
    }

    #[test]
    fn test_sequences_use_sorted_order_across_thirds() {
        // Deliberately unsorted input
        let markers = vec![stall(200.0), blocker(10.0, false, 0.5), resolution(150.0)];
        let features = AgentAggregator::aggregate(markers, 300.0, None);

        let mut expected = BTreeMap::new();
        expected.insert("blocker->resolution_attempt".to_string(), 1);
        expected.insert("resolution_attempt->stall".to_string(), 1);
        assert_eq!(features.sequences, expected);
    }

    #[test]
    fn test_first_and_last_times() {
        let markers = vec![
            commitment(280.0),
            blocker(40.0, false, 0.5),
            blocker(90.0, false, 0.5),
            blocker(60.0, false, 0.5),
        ];
        let features = AgentAggregator::aggregate(markers, 300.0, None);

        assert_eq!(features.first_blocker_time, Some(40.0));
        assert_eq!(features.last_blocker_time, Some(90.0));
        assert_eq!(features.first_commitment_time, Some(280.0));
        assert_eq!(features.last_commitment_time, Some(280.0));
    }

    #[test]
    fn test_metrics_are_merged() {
        let metrics = AgentCallMetrics {
            predicted_outcome: PredictedOutcome::Success,
            outcome_confidence: 0.82,
            call_tone: CallTone::Positive,
            flags: AgentCallFlags {
                next_steps_agreed: true,
                ..Default::default()
            },
            keywords: vec!["Refund".to_string(), "refund".to_string(), " ".to_string()],
        };
        let features = AgentAggregator::aggregate(vec![commitment(5.0)], 60.0, Some(&metrics));

        assert_eq!(features.predicted_outcome, Some(PredictedOutcome::Success));
        assert_eq!(features.outcome_confidence, 0.82);
        assert_eq!(features.call_tone, Some(CallTone::Positive));
        assert!(features.flags.next_steps_agreed);
        assert_eq!(features.keywords, vec!["refund".to_string()]);
    }

    #[test]
    fn test_reaggregation_is_byte_identical() {
        let markers = vec![
            blocker(10.0, true, 0.8),
            resolution(20.0),
            stall(150.0),
            commitment(250.0),
        ];
        let a = AgentAggregator::aggregate(markers.clone(), 300.0, None);
        let b = AgentAggregator::aggregate(markers, 300.0, None);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}

//! Decision-marker aggregation (schema v3)
//!
//! Pairs customer constraints with the agent strategies that follow them,
//! tracks who holds conversational control, and flags commitments that were
//! made while a constraint was still open.
//!
//! Two tie-break rules are part of the record's meaning and must not drift:
//!
//! - A constraint is paired with the **first** strategy strictly after it in
//!   time, whatever constraint that strategy declares as its target.
//! - Control is "recovered before commitment" only when the **latest**
//!   recovery precedes the **first** commitment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{mean, mean_or_zero, ratio};
use crate::schema::nlu::{NluResults, REQUIRED_DISCLOSURES};
use crate::schema::v3::{
    CommitmentQualityMarker, CommitmentType, ConstraintMarker, ConstraintType,
    ControlDynamicsMarker, ControlEventType, DecisionCallMetrics, DecisionMarker, StrategyMarker,
};
use crate::schema::{CallTone, PredictedOutcome, Speaker};

/// Customer constraint statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintStats {
    pub total: u32,
    /// Count per constraint type (every type present, zero when unseen)
    pub by_type: BTreeMap<String, u32>,
    pub explicit_ratio: f64,
    /// Mean severity on a 1-3 scale (0 when no constraints)
    pub mean_severity: f64,
    pub first_constraint_time: Option<f64>,
}

/// Agent strategy statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub total: u32,
    /// Count per strategy name
    pub usage: BTreeMap<String, u32>,
    /// Strategies declaring a target constraint / strategies
    pub targeted_ratio: f64,
}

/// Constraint-to-strategy latency statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub resolved_constraints: u32,
    pub unresolved_constraints: u32,
    /// Mean latency over resolved pairs, in seconds
    pub avg_latency: Option<f64>,
    pub min_latency: Option<f64>,
    pub max_latency: Option<f64>,
}

/// Conversational control statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStats {
    pub total_events: u32,
    pub shifts: u32,
    pub recoveries: u32,
    pub agent_in_control: u32,
    pub customer_in_control: u32,
    pub agent_control_ratio: f64,
    pub control_recovery_before_commitment: bool,
}

/// Commitment statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentStats {
    pub total: u32,
    /// Count per commitment type (every type present, zero when unseen)
    pub by_type: BTreeMap<String, u32>,
    pub agent_initiated: u32,
    pub reversible: u32,
    pub avg_time_since_last_constraint: Option<f64>,
    /// Red flag: a commitment landed after a constraint no strategy answered
    pub commitment_after_unresolved_constraint: bool,
}

/// NLU rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NluStats {
    pub intents: BTreeMap<String, u32>,
    pub obligation_count: u32,
    pub obligations_with_deadline: u32,
    /// Fraction of required disclosures marked present
    pub regulatory_compliance_ratio: f64,
    pub entity_count: u32,
}

/// v3 feature record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFeatures {
    pub marker_count: u32,
    pub constraints: ConstraintStats,
    pub strategies: StrategyStats,
    pub resolution: ResolutionStats,
    pub control: ControlStats,
    pub commitments: CommitmentStats,
    pub nlu: NluStats,
    pub predicted_outcome: Option<PredictedOutcome>,
    pub outcome_confidence: f64,
    pub call_tone: Option<CallTone>,
}

/// Markers of one call split by kind, each list sorted by time
#[derive(Default)]
struct Partitioned {
    constraints: Vec<ConstraintMarker>,
    strategies: Vec<StrategyMarker>,
    control: Vec<ControlDynamicsMarker>,
    commitments: Vec<CommitmentQualityMarker>,
}

impl Partitioned {
    fn from_markers(markers: Vec<DecisionMarker>) -> Self {
        let mut parts = Partitioned::default();
        for marker in markers {
            match marker {
                DecisionMarker::CustomerConstraint(m) => parts.constraints.push(m),
                DecisionMarker::AgentResponseStrategy(m) => parts.strategies.push(m),
                DecisionMarker::ControlDynamics(m) => parts.control.push(m),
                DecisionMarker::CommitmentQuality(m) => parts.commitments.push(m),
            }
        }
        parts.constraints.sort_by(|a, b| a.time.total_cmp(&b.time));
        parts.strategies.sort_by(|a, b| a.time.total_cmp(&b.time));
        parts.control.sort_by(|a, b| a.time.total_cmp(&b.time));
        parts.commitments.sort_by(|a, b| a.time.total_cmp(&b.time));
        parts
    }
}

/// Aggregator for v3 decision markers
pub struct DecisionAggregator;

impl DecisionAggregator {
    /// Aggregate the markers of one call, merging auxiliary metrics and NLU
    /// results when supplied.
    pub fn aggregate(
        markers: Vec<DecisionMarker>,
        metrics: Option<&DecisionCallMetrics>,
        nlu: Option<&NluResults>,
    ) -> DecisionFeatures {
        let marker_count = markers.len() as u32;
        let parts = Partitioned::from_markers(markers);

        let constraints = constraint_stats(&parts.constraints);
        let strategies = strategy_stats(&parts.strategies);

        let latencies = pair_latencies(&parts.constraints, &parts.strategies);
        let resolution = resolution_stats(&latencies);

        let control = control_stats(&parts.control, &parts.commitments);
        let commitments = commitment_stats(&parts.commitments, &parts.constraints, &latencies);

        DecisionFeatures {
            marker_count,
            constraints,
            strategies,
            resolution,
            control,
            commitments,
            nlu: nlu.map(nlu_stats).unwrap_or_default(),
            predicted_outcome: metrics.map(|m| m.predicted_outcome),
            outcome_confidence: metrics.map(|m| m.outcome_confidence).unwrap_or(0.0),
            call_tone: metrics.map(|m| m.call_tone),
        }
    }
}

fn constraint_stats(constraints: &[ConstraintMarker]) -> ConstraintStats {
    let mut by_type: BTreeMap<String, u32> = ConstraintType::ALL
        .iter()
        .map(|t| (t.label().to_string(), 0))
        .collect();
    for c in constraints {
        *by_type.entry(c.constraint_type.label().to_string()).or_insert(0) += 1;
    }

    let total = constraints.len() as u32;
    let explicit = constraints.iter().filter(|c| c.explicit).count() as f64;

    ConstraintStats {
        total,
        by_type,
        explicit_ratio: ratio(explicit, total as f64),
        mean_severity: mean_or_zero(constraints.iter().map(|c| c.severity.score())),
        first_constraint_time: constraints.first().map(|c| c.time),
    }
}

fn strategy_stats(strategies: &[StrategyMarker]) -> StrategyStats {
    let mut usage = BTreeMap::new();
    for s in strategies {
        *usage.entry(s.strategy.clone()).or_insert(0) += 1;
    }

    let total = strategies.len() as u32;
    let targeted = strategies
        .iter()
        .filter(|s| s.target_constraint.is_some())
        .count() as f64;

    StrategyStats {
        total,
        usage,
        targeted_ratio: ratio(targeted, total as f64),
    }
}

/// For every constraint (time order), the latency to the first strategy
/// strictly after it, or `None` when no strategy follows.
fn pair_latencies(
    constraints: &[ConstraintMarker],
    strategies: &[StrategyMarker],
) -> Vec<Option<f64>> {
    constraints
        .iter()
        .map(|c| {
            strategies
                .iter()
                .find(|s| s.time > c.time)
                .map(|s| s.time - c.time)
        })
        .collect()
}

fn resolution_stats(latencies: &[Option<f64>]) -> ResolutionStats {
    let resolved: Vec<f64> = latencies.iter().flatten().copied().collect();

    ResolutionStats {
        resolved_constraints: resolved.len() as u32,
        unresolved_constraints: (latencies.len() - resolved.len()) as u32,
        avg_latency: mean(resolved.iter().copied()),
        min_latency: resolved.iter().copied().reduce(f64::min),
        max_latency: resolved.iter().copied().reduce(f64::max),
    }
}

fn control_stats(
    control: &[ControlDynamicsMarker],
    commitments: &[CommitmentQualityMarker],
) -> ControlStats {
    let count = |event: ControlEventType| control.iter().filter(|c| c.event == event).count() as u32;

    let total_events = control.len() as u32;
    let agent_in_control = count(ControlEventType::AgentInControl);

    let latest_recovery = control
        .iter()
        .filter(|c| c.event == ControlEventType::ControlRecovery)
        .map(|c| c.time)
        .reduce(f64::max);
    let first_commitment = commitments.iter().map(|c| c.time).reduce(f64::min);

    let control_recovery_before_commitment = match (latest_recovery, first_commitment) {
        (Some(recovery), Some(commitment)) => recovery < commitment,
        _ => false,
    };

    ControlStats {
        total_events,
        shifts: count(ControlEventType::ControlShift),
        recoveries: count(ControlEventType::ControlRecovery),
        agent_in_control,
        customer_in_control: count(ControlEventType::CustomerInControl),
        agent_control_ratio: ratio(agent_in_control as f64, total_events as f64),
        control_recovery_before_commitment,
    }
}

fn commitment_stats(
    commitments: &[CommitmentQualityMarker],
    constraints: &[ConstraintMarker],
    latencies: &[Option<f64>],
) -> CommitmentStats {
    let mut by_type: BTreeMap<String, u32> = CommitmentType::ALL
        .iter()
        .map(|t| (t.label().to_string(), 0))
        .collect();
    for c in commitments {
        *by_type.entry(c.commitment_type.label().to_string()).or_insert(0) += 1;
    }

    let avg_time_since_last_constraint = mean(
        commitments
            .iter()
            .filter_map(|c| c.time_since_last_constraint)
            .filter(|t| t.is_finite() && *t >= 0.0),
    );

    let commitment_after_unresolved_constraint = constraints
        .iter()
        .zip(latencies)
        .filter(|(_, latency)| latency.is_none())
        .any(|(constraint, _)| commitments.iter().any(|c| c.time > constraint.time));

    CommitmentStats {
        total: commitments.len() as u32,
        by_type,
        agent_initiated: commitments
            .iter()
            .filter(|c| c.initiator == Speaker::Agent)
            .count() as u32,
        reversible: commitments.iter().filter(|c| c.reversible).count() as u32,
        avg_time_since_last_constraint,
        commitment_after_unresolved_constraint,
    }
}

fn nlu_stats(nlu: &NluResults) -> NluStats {
    let mut intents = BTreeMap::new();
    for intent in &nlu.intents {
        *intents.entry(intent.intent.clone()).or_insert(0) += 1;
    }

    let present = REQUIRED_DISCLOSURES
        .iter()
        .filter(|required| {
            nlu.disclosures
                .iter()
                .any(|d| d.present && d.disclosure_type == **required)
        })
        .count();

    NluStats {
        intents,
        obligation_count: nlu.obligations.len() as u32,
        obligations_with_deadline: nlu
            .obligations
            .iter()
            .filter(|o| o.deadline.as_deref().is_some_and(|d| !d.trim().is_empty()))
            .count() as u32,
        regulatory_compliance_ratio: ratio(present as f64, REQUIRED_DISCLOSURES.len() as f64),
        entity_count: nlu.entities.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::nlu::{DisclosureCheck, EntityMention, IntentDetection, Obligation};
    use crate::schema::v3::Severity;
    use pretty_assertions::assert_eq;

    fn constraint(time: f64) -> DecisionMarker {
        constraint_of(time, ConstraintType::Trust, Severity::Medium, true)
    }

    fn constraint_of(
        time: f64,
        constraint_type: ConstraintType,
        severity: Severity,
        explicit: bool,
    ) -> DecisionMarker {
        DecisionMarker::CustomerConstraint(ConstraintMarker {
            time,
            confidence: 0.9,
            description: "constraint".to_string(),
            constraint_type,
            severity,
            explicit,
        })
    }

    fn strategy(time: f64, name: &str, target: Option<ConstraintType>) -> DecisionMarker {
        DecisionMarker::AgentResponseStrategy(StrategyMarker {
            time,
            confidence: 0.8,
            description: "strategy".to_string(),
            strategy: name.to_string(),
            target_constraint: target,
        })
    }

    fn control(time: f64, event: ControlEventType) -> DecisionMarker {
        DecisionMarker::ControlDynamics(ControlDynamicsMarker {
            time,
            confidence: 0.7,
            description: "control".to_string(),
            event,
            cause: None,
        })
    }

    fn commitment(time: f64) -> DecisionMarker {
        commitment_with(time, None)
    }

    fn commitment_with(time: f64, since_constraint: Option<f64>) -> DecisionMarker {
        DecisionMarker::CommitmentQuality(CommitmentQualityMarker {
            time,
            confidence: 0.9,
            description: "commitment".to_string(),
            commitment_type: CommitmentType::Payment,
            initiator: Speaker::Customer,
            reversible: false,
            time_since_last_constraint: since_constraint,
        })
    }

    #[test]
    fn test_empty_markers_yield_zeroed_record() {
        let features = DecisionAggregator::aggregate(Vec::new(), None, None);

        assert_eq!(features.marker_count, 0);
        assert_eq!(features.constraints.total, 0);
        assert!(features.constraints.by_type.values().all(|v| *v == 0));
        assert_eq!(features.constraints.by_type.len(), 6);
        assert_eq!(features.constraints.explicit_ratio, 0.0);
        assert_eq!(features.constraints.mean_severity, 0.0);
        assert_eq!(features.constraints.first_constraint_time, None);
        assert_eq!(features.strategies.targeted_ratio, 0.0);
        assert_eq!(features.resolution.avg_latency, None);
        assert_eq!(features.resolution.min_latency, None);
        assert_eq!(features.control.agent_control_ratio, 0.0);
        assert!(!features.control.control_recovery_before_commitment);
        assert_eq!(features.commitments.total, 0);
        assert_eq!(features.commitments.avg_time_since_last_constraint, None);
        assert!(!features.commitments.commitment_after_unresolved_constraint);
        assert_eq!(features.nlu, NluStats::default());
    }

    #[test]
    fn test_empty_markers_still_carry_metrics_and_nlu() {
        let metrics = DecisionCallMetrics {
            predicted_outcome: PredictedOutcome::Failure,
            outcome_confidence: 0.4,
            call_tone: CallTone::Tense,
        };
        let nlu = NluResults {
            entities: vec![EntityMention {
                entity_type: "date".to_string(),
                text: "Friday".to_string(),
            }],
            ..Default::default()
        };

        let features = DecisionAggregator::aggregate(Vec::new(), Some(&metrics), Some(&nlu));
        assert_eq!(features.predicted_outcome, Some(PredictedOutcome::Failure));
        assert_eq!(features.call_tone, Some(CallTone::Tense));
        assert_eq!(features.nlu.entity_count, 1);
    }

    #[test]
    fn test_resolution_latency_pairs_first_later_strategy() {
        let markers = vec![constraint(10.0), strategy(15.0, "reassure", None)];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.resolution.resolved_constraints, 1);
        assert_eq!(features.resolution.avg_latency, Some(5.0));
    }

    #[test]
    fn test_pairing_ignores_declared_target() {
        // The strategy at t=12 targets a different constraint but is still
        // the first one after t=10.
        let markers = vec![
            constraint_of(10.0, ConstraintType::Trust, Severity::High, true),
            strategy(12.0, "clarify_terms", Some(ConstraintType::Clarity)),
            strategy(30.0, "build_trust", Some(ConstraintType::Trust)),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.resolution.avg_latency, Some(2.0));
        assert_eq!(features.resolution.max_latency, Some(2.0));
    }

    #[test]
    fn test_strategy_at_same_time_does_not_resolve() {
        let markers = vec![constraint(10.0), strategy(10.0, "reassure", None)];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.resolution.resolved_constraints, 0);
        assert_eq!(features.resolution.unresolved_constraints, 1);
        assert_eq!(features.resolution.avg_latency, None);
    }

    #[test]
    fn test_latency_statistics_over_resolved_pairs() {
        let markers = vec![
            constraint(10.0),
            constraint(20.0),
            strategy(25.0, "reassure", None),
            constraint(50.0),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);

        // 10 -> 25 (15s), 20 -> 25 (5s), 50 unresolved
        assert_eq!(features.resolution.resolved_constraints, 2);
        assert_eq!(features.resolution.unresolved_constraints, 1);
        assert_eq!(features.resolution.avg_latency, Some(10.0));
        assert_eq!(features.resolution.min_latency, Some(5.0));
        assert_eq!(features.resolution.max_latency, Some(15.0));
    }

    #[test]
    fn test_recovery_without_commitment_is_false() {
        let markers = vec![control(30.0, ControlEventType::ControlRecovery)];
        let features = DecisionAggregator::aggregate(markers, None, None);
        assert!(!features.control.control_recovery_before_commitment);
    }

    #[test]
    fn test_recovery_uses_latest_recovery_and_first_commitment() {
        let markers = vec![
            control(10.0, ControlEventType::ControlRecovery),
            commitment(40.0),
            control(50.0, ControlEventType::ControlRecovery),
            commitment(90.0),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);
        // Latest recovery (50) is after first commitment (40)
        assert!(!features.control.control_recovery_before_commitment);

        let markers = vec![
            control(10.0, ControlEventType::ControlRecovery),
            control(20.0, ControlEventType::ControlRecovery),
            commitment(40.0),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);
        assert!(features.control.control_recovery_before_commitment);
    }

    #[test]
    fn test_control_counts_and_ratio() {
        let markers = vec![
            control(1.0, ControlEventType::AgentInControl),
            control(2.0, ControlEventType::ControlShift),
            control(3.0, ControlEventType::ControlRecovery),
            control(4.0, ControlEventType::AgentInControl),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.control.total_events, 4);
        assert_eq!(features.control.shifts, 1);
        assert_eq!(features.control.recoveries, 1);
        assert_eq!(features.control.agent_in_control, 2);
        assert_eq!(features.control.agent_control_ratio, 0.5);
    }

    #[test]
    fn test_commitment_after_unresolved_constraint() {
        let markers = vec![constraint(5.0), commitment(20.0)];
        let features = DecisionAggregator::aggregate(markers, None, None);
        assert!(features.commitments.commitment_after_unresolved_constraint);

        let markers = vec![constraint(5.0), commitment(2.0)];
        let features = DecisionAggregator::aggregate(markers, None, None);
        assert!(!features.commitments.commitment_after_unresolved_constraint);
    }

    #[test]
    fn test_resolved_constraint_is_not_a_red_flag() {
        let markers = vec![
            constraint(5.0),
            strategy(8.0, "reassure", None),
            commitment(20.0),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);
        assert!(!features.commitments.commitment_after_unresolved_constraint);
    }

    #[test]
    fn test_constraint_stats() {
        let markers = vec![
            constraint_of(30.0, ConstraintType::Risk, Severity::High, false),
            constraint_of(12.0, ConstraintType::Trust, Severity::Low, true),
            constraint_of(40.0, ConstraintType::Risk, Severity::Medium, true),
            constraint_of(50.0, ConstraintType::Time, Severity::High, false),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.constraints.total, 4);
        assert_eq!(features.constraints.by_type["risk"], 2);
        assert_eq!(features.constraints.by_type["authority"], 0);
        assert_eq!(features.constraints.explicit_ratio, 0.5);
        assert_eq!(features.constraints.mean_severity, 2.25);
        assert_eq!(features.constraints.first_constraint_time, Some(12.0));
    }

    #[test]
    fn test_average_time_since_constraint_skips_negative() {
        let markers = vec![
            commitment_with(10.0, Some(4.0)),
            commitment_with(20.0, Some(-1.0)),
            commitment_with(30.0, Some(8.0)),
            commitment_with(40.0, None),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.commitments.total, 4);
        assert_eq!(features.commitments.by_type["payment"], 4);
        assert_eq!(features.commitments.avg_time_since_last_constraint, Some(6.0));
    }

    #[test]
    fn test_strategy_usage() {
        let markers = vec![
            strategy(1.0, "reassure", Some(ConstraintType::Trust)),
            strategy(2.0, "reassure", None),
            strategy(3.0, "offer_discount", None),
            strategy(4.0, "offer_discount", Some(ConstraintType::Risk)),
        ];
        let features = DecisionAggregator::aggregate(markers, None, None);

        assert_eq!(features.strategies.total, 4);
        assert_eq!(features.strategies.usage["reassure"], 2);
        assert_eq!(features.strategies.targeted_ratio, 0.5);
    }

    #[test]
    fn test_nlu_rollup() {
        let nlu = NluResults {
            intents: vec![
                IntentDetection {
                    intent: "payment_arrangement".to_string(),
                    confidence: 0.9,
                },
                IntentDetection {
                    intent: "payment_arrangement".to_string(),
                    confidence: 0.7,
                },
                IntentDetection {
                    intent: "dispute".to_string(),
                    confidence: 0.6,
                },
            ],
            obligations: vec![
                Obligation {
                    party: Speaker::Customer,
                    description: "pay $50".to_string(),
                    deadline: Some("Friday".to_string()),
                },
                Obligation {
                    party: Speaker::Agent,
                    description: "send receipt".to_string(),
                    deadline: None,
                },
            ],
            disclosures: vec![
                DisclosureCheck {
                    disclosure_type: "recording_notice".to_string(),
                    present: true,
                },
                DisclosureCheck {
                    disclosure_type: "identity_verification".to_string(),
                    present: false,
                },
                DisclosureCheck {
                    disclosure_type: "marketing_opt_in".to_string(),
                    present: true,
                },
            ],
            entities: vec![],
        };

        let features = DecisionAggregator::aggregate(Vec::new(), None, Some(&nlu));
        assert_eq!(features.nlu.intents["payment_arrangement"], 2);
        assert_eq!(features.nlu.obligation_count, 2);
        assert_eq!(features.nlu.obligations_with_deadline, 1);
        assert!((features.nlu.regulatory_compliance_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(features.nlu.entity_count, 0);
    }

    #[test]
    fn test_reaggregation_is_byte_identical() {
        let markers = vec![
            constraint(5.0),
            strategy(8.0, "reassure", None),
            strategy(9.0, "anchor_value", None),
            control(12.0, ControlEventType::ControlShift),
            commitment(20.0),
        ];
        let a = DecisionAggregator::aggregate(markers.clone(), None, None);
        let b = DecisionAggregator::aggregate(markers, None, None);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}

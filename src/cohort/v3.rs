//! Cohort profile for v3 decision features

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{normalize_map, push_category, sum_maps, top_patterns, PatternFrequency, TOP_PATTERNS};
use crate::features::v3::DecisionFeatures;
use crate::features::{mean_or_zero, ratio};

/// Statistical summary of a cohort of v3 records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCohortProfile {
    pub call_count: u32,
    pub total_markers: u32,

    pub avg_marker_count: f64,
    pub avg_constraints: f64,
    pub avg_strategies: f64,
    pub avg_control_events: f64,
    pub avg_commitments: f64,

    pub avg_explicit_ratio: f64,
    pub avg_mean_severity: f64,
    pub avg_targeted_ratio: f64,
    /// Mean over calls that resolved at least one constraint
    pub avg_resolution_latency: f64,
    /// Resolved constraints / constraints, pooled across the cohort
    pub resolution_rate: f64,
    pub avg_agent_control_ratio: f64,
    pub avg_shifts: f64,
    pub avg_recoveries: f64,
    /// Fraction of calls where control was recovered before the first commitment
    pub recovery_before_commitment_rate: f64,
    /// Fraction of calls with a commitment after an unresolved constraint
    pub unresolved_commitment_rate: f64,
    pub avg_time_since_last_constraint: f64,

    pub avg_compliance_ratio: f64,
    pub avg_obligations: f64,
    pub avg_entities: f64,
    pub avg_outcome_confidence: f64,

    /// Constraint type counts / cohort marker total
    pub constraint_share: BTreeMap<String, f64>,
    /// Commitment type counts / cohort marker total
    pub commitment_share: BTreeMap<String, f64>,
    /// Strategy usage / cohort marker total
    pub strategy_share: BTreeMap<String, f64>,
    /// Intent detections per call
    pub intent_rates: BTreeMap<String, f64>,
    pub tone_distribution: BTreeMap<String, f64>,
    pub top_strategies: Vec<PatternFrequency>,
}

impl DecisionCohortProfile {
    pub fn build(records: &[&DecisionFeatures]) -> Self {
        let call_count = records.len() as u32;
        let calls = call_count as f64;
        let total_markers: u32 = records.iter().map(|r| r.marker_count).sum();
        let markers = total_markers as f64;

        let avg = |f: fn(&DecisionFeatures) -> f64| mean_or_zero(records.iter().map(|r| f(r)));
        let rate = |f: fn(&DecisionFeatures) -> bool| {
            ratio(records.iter().filter(|r| f(r)).count() as f64, calls)
        };

        let resolved: u32 = records.iter().map(|r| r.resolution.resolved_constraints).sum();
        let constraints: u32 = records.iter().map(|r| r.constraints.total).sum();

        let constraint_totals = sum_maps(records.iter().map(|r| &r.constraints.by_type));
        let commitment_totals = sum_maps(records.iter().map(|r| &r.commitments.by_type));
        let strategy_totals = sum_maps(records.iter().map(|r| &r.strategies.usage));
        let intent_totals = sum_maps(records.iter().map(|r| &r.nlu.intents));

        let mut tones: BTreeMap<String, u32> = BTreeMap::new();
        for tone in records.iter().filter_map(|r| r.call_tone) {
            *tones.entry(tone.label().to_string()).or_insert(0) += 1;
        }

        Self {
            call_count,
            total_markers,
            avg_marker_count: avg(|r| r.marker_count as f64),
            avg_constraints: avg(|r| r.constraints.total as f64),
            avg_strategies: avg(|r| r.strategies.total as f64),
            avg_control_events: avg(|r| r.control.total_events as f64),
            avg_commitments: avg(|r| r.commitments.total as f64),
            avg_explicit_ratio: avg(|r| r.constraints.explicit_ratio),
            avg_mean_severity: avg(|r| r.constraints.mean_severity),
            avg_targeted_ratio: avg(|r| r.strategies.targeted_ratio),
            avg_resolution_latency: mean_or_zero(
                records.iter().filter_map(|r| r.resolution.avg_latency),
            ),
            resolution_rate: ratio(resolved as f64, constraints as f64),
            avg_agent_control_ratio: avg(|r| r.control.agent_control_ratio),
            avg_shifts: avg(|r| r.control.shifts as f64),
            avg_recoveries: avg(|r| r.control.recoveries as f64),
            recovery_before_commitment_rate: rate(|r| r.control.control_recovery_before_commitment),
            unresolved_commitment_rate: rate(|r| r.commitments.commitment_after_unresolved_constraint),
            avg_time_since_last_constraint: mean_or_zero(
                records
                    .iter()
                    .filter_map(|r| r.commitments.avg_time_since_last_constraint),
            ),
            avg_compliance_ratio: avg(|r| r.nlu.regulatory_compliance_ratio),
            avg_obligations: avg(|r| r.nlu.obligation_count as f64),
            avg_entities: avg(|r| r.nlu.entity_count as f64),
            avg_outcome_confidence: avg(|r| r.outcome_confidence),
            constraint_share: normalize_map(&constraint_totals, markers),
            commitment_share: normalize_map(&commitment_totals, markers),
            strategy_share: normalize_map(&strategy_totals, markers),
            intent_rates: normalize_map(&intent_totals, calls),
            tone_distribution: normalize_map(&tones, calls),
            top_strategies: top_patterns(&strategy_totals, total_markers, TOP_PATTERNS),
        }
    }

    pub fn feature_values(&self) -> Vec<(String, f64)> {
        let scalars = [
            ("avg_marker_count", self.avg_marker_count),
            ("avg_constraints", self.avg_constraints),
            ("avg_strategies", self.avg_strategies),
            ("avg_control_events", self.avg_control_events),
            ("avg_commitments", self.avg_commitments),
            ("avg_explicit_ratio", self.avg_explicit_ratio),
            ("avg_mean_severity", self.avg_mean_severity),
            ("avg_targeted_ratio", self.avg_targeted_ratio),
            ("avg_resolution_latency", self.avg_resolution_latency),
            ("resolution_rate", self.resolution_rate),
            ("avg_agent_control_ratio", self.avg_agent_control_ratio),
            ("avg_shifts", self.avg_shifts),
            ("avg_recoveries", self.avg_recoveries),
            ("recovery_before_commitment_rate", self.recovery_before_commitment_rate),
            ("unresolved_commitment_rate", self.unresolved_commitment_rate),
            ("avg_time_since_last_constraint", self.avg_time_since_last_constraint),
            ("avg_compliance_ratio", self.avg_compliance_ratio),
            ("avg_obligations", self.avg_obligations),
            ("avg_entities", self.avg_entities),
            ("avg_outcome_confidence", self.avg_outcome_confidence),
        ];
        let mut out: Vec<(String, f64)> = scalars
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        push_category(&mut out, "constraint", &self.constraint_share);
        push_category(&mut out, "commitment", &self.commitment_share);
        push_category(&mut out, "strategy", &self.strategy_share);
        push_category(&mut out, "intent", &self.intent_rates);
        push_category(&mut out, "tone", &self.tone_distribution);
        out
    }
}

//! Cohort profile for v2 agent features

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{normalize_map, push_category, sum_maps, top_patterns, PatternFrequency, TOP_PATTERNS};
use crate::features::v2::{AgentFeatures, AgentKindValues};
use crate::features::{mean_or_zero, ratio};
use crate::schema::v2::AgentMarkerKind;

/// Share of a cohort's markers falling into each third of the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThirdsShare {
    pub first_third: f64,
    pub middle_third: f64,
    pub final_third: f64,
}

/// Statistical summary of a cohort of v2 records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCohortProfile {
    pub call_count: u32,
    pub total_markers: u32,

    pub avg_marker_count: f64,
    pub avg_duration_seconds: f64,
    pub avg_density_per_minute: f64,
    pub avg_confidence: f64,
    pub avg_resolution_rate: f64,
    pub avg_unresolved_blockers: f64,
    pub avg_outcome_confidence: f64,
    pub avg_counts: AgentKindValues<f64>,

    /// Markers of each kind / cohort marker total
    pub kind_share: AgentKindValues<f64>,
    pub timing_share: ThirdsShare,
    /// Fraction of calls with each flag set
    pub flag_rates: BTreeMap<String, f64>,
    /// Fraction of calls with each tone
    pub tone_distribution: BTreeMap<String, f64>,
    /// Transition counts / cohort marker total
    pub sequence_share: BTreeMap<String, f64>,
    pub top_sequences: Vec<PatternFrequency>,
}

impl AgentCohortProfile {
    pub fn build(records: &[&AgentFeatures]) -> Self {
        let call_count = records.len() as u32;
        let total_markers: u32 = records.iter().map(|r| r.marker_count).sum();
        let markers = total_markers as f64;

        let avg = |f: fn(&AgentFeatures) -> f64| mean_or_zero(records.iter().map(|r| f(r)));

        let mut avg_counts = AgentKindValues::<f64>::default();
        let mut kind_share = AgentKindValues::<f64>::default();
        for kind in AgentMarkerKind::ALL {
            let total: u32 = records.iter().map(|r| r.counts.get(kind)).sum();
            *avg_counts.get_mut(kind) = ratio(total as f64, call_count as f64);
            *kind_share.get_mut(kind) = ratio(total as f64, markers);
        }

        let timing_share = ThirdsShare {
            first_third: ratio(records.iter().map(|r| r.timing.first_third).sum::<u32>() as f64, markers),
            middle_third: ratio(records.iter().map(|r| r.timing.middle_third).sum::<u32>() as f64, markers),
            final_third: ratio(records.iter().map(|r| r.timing.final_third).sum::<u32>() as f64, markers),
        };

        let flag_rates = flag_rates(records);

        let mut tones: BTreeMap<String, u32> = BTreeMap::new();
        for tone in records.iter().filter_map(|r| r.call_tone) {
            *tones.entry(tone.label().to_string()).or_insert(0) += 1;
        }

        let sequence_totals = sum_maps(records.iter().map(|r| &r.sequences));

        Self {
            call_count,
            total_markers,
            avg_marker_count: avg(|r| r.marker_count as f64),
            avg_duration_seconds: avg(|r| r.call_duration_seconds),
            avg_density_per_minute: avg(|r| r.density_per_minute),
            avg_confidence: avg(|r| r.avg_confidence),
            avg_resolution_rate: avg(|r| r.resolution_rate),
            avg_unresolved_blockers: avg(|r| r.unresolved_blocker_count as f64),
            avg_outcome_confidence: avg(|r| r.outcome_confidence),
            avg_counts,
            kind_share,
            timing_share,
            flag_rates,
            tone_distribution: normalize_map(&tones, call_count as f64),
            sequence_share: normalize_map(&sequence_totals, markers),
            top_sequences: top_patterns(&sequence_totals, total_markers, TOP_PATTERNS),
        }
    }

    pub fn feature_values(&self) -> Vec<(String, f64)> {
        let mut out = vec![
            ("avg_marker_count".to_string(), self.avg_marker_count),
            ("avg_duration_seconds".to_string(), self.avg_duration_seconds),
            ("avg_density_per_minute".to_string(), self.avg_density_per_minute),
            ("avg_confidence".to_string(), self.avg_confidence),
            ("avg_resolution_rate".to_string(), self.avg_resolution_rate),
            ("avg_unresolved_blockers".to_string(), self.avg_unresolved_blockers),
            ("avg_outcome_confidence".to_string(), self.avg_outcome_confidence),
        ];

        for kind in AgentMarkerKind::ALL {
            out.push((format!("avg_count.{}", kind.label()), self.avg_counts.get(kind)));
        }
        for kind in AgentMarkerKind::ALL {
            out.push((format!("kind_share.{}", kind.label()), self.kind_share.get(kind)));
        }

        out.push(("timing_share.first_third".to_string(), self.timing_share.first_third));
        out.push(("timing_share.middle_third".to_string(), self.timing_share.middle_third));
        out.push(("timing_share.final_third".to_string(), self.timing_share.final_third));

        push_category(&mut out, "flag_rate", &self.flag_rates);
        push_category(&mut out, "tone", &self.tone_distribution);
        push_category(&mut out, "sequence", &self.sequence_share);
        out
    }
}

fn flag_rates(records: &[&AgentFeatures]) -> BTreeMap<String, f64> {
    let calls = records.len() as f64;
    let rate = |f: fn(&AgentFeatures) -> bool| {
        ratio(records.iter().filter(|r| f(r)).count() as f64, calls)
    };

    let mut rates = BTreeMap::new();
    rates.insert("price_discussed".to_string(), rate(|r| r.flags.price_discussed));
    rates.insert("competitor_mentioned".to_string(), rate(|r| r.flags.competitor_mentioned));
    rates.insert("decision_maker_present".to_string(), rate(|r| r.flags.decision_maker_present));
    rates.insert("next_steps_agreed".to_string(), rate(|r| r.flags.next_steps_agreed));
    rates.insert("escalation_requested".to_string(), rate(|r| r.flags.escalation_requested));
    rates
}

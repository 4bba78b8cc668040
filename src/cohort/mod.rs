//! Cohort comparison
//!
//! Summarizes the feature records of a success cohort and a failure cohort
//! into profiles and ranks the features that separate them. The
//! "significance" score is a descriptive heuristic
//! (`min(percent_diff / 100, 1)`), not a statistical test.

pub mod v2;
pub mod v3;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::features::{AgentFeatures, DecisionFeatures, FeatureRecord};
use crate::schema::SchemaVersion;

pub use v2::AgentCohortProfile;
pub use v3::DecisionCohortProfile;

/// Number of entries kept in top-N pattern rankings
pub const TOP_PATTERNS: usize = 5;

/// A single feature's comparison between the two cohorts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Differentiator {
    pub feature: String,
    pub success_value: f64,
    pub failure_value: f64,
    pub absolute_diff: f64,
    pub percent_diff: f64,
    pub significance: f64,
}

impl Differentiator {
    pub fn new(feature: impl Into<String>, success_value: f64, failure_value: f64) -> Self {
        let absolute_diff = (success_value - failure_value).abs();
        let average = (success_value + failure_value) / 2.0;
        let percent_diff = if average == 0.0 {
            0.0
        } else {
            absolute_diff / average * 100.0
        };

        Self {
            feature: feature.into(),
            success_value,
            failure_value,
            absolute_diff,
            percent_diff,
            significance: (percent_diff / 100.0).min(1.0),
        }
    }
}

/// How often a pattern (sequence or strategy) occurs in a cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFrequency {
    pub pattern: String,
    pub count: u32,
    /// Count relative to the cohort's total marker count
    pub share: f64,
}

/// Summary of one cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_version")]
pub enum CohortProfile {
    #[serde(rename = "v2")]
    V2(AgentCohortProfile),
    #[serde(rename = "v3")]
    V3(DecisionCohortProfile),
}

impl CohortProfile {
    pub fn call_count(&self) -> u32 {
        match self {
            CohortProfile::V2(p) => p.call_count,
            CohortProfile::V3(p) => p.call_count,
        }
    }

    /// Flattened `(feature name, value)` pairs: scalars first, then
    /// category keys in sorted order.
    pub fn feature_values(&self) -> Vec<(String, f64)> {
        match self {
            CohortProfile::V2(p) => p.feature_values(),
            CohortProfile::V3(p) => p.feature_values(),
        }
    }
}

/// Result of comparing a success cohort with a failure cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortComparison {
    pub schema_version: Option<SchemaVersion>,
    pub success_count: u32,
    pub failure_count: u32,
    pub success_profile: Option<CohortProfile>,
    pub failure_profile: Option<CohortProfile>,
    /// Sorted by descending significance
    pub differentiators: Vec<Differentiator>,
}

impl CohortComparison {
    /// The result for inputs that cannot be compared
    pub fn empty() -> Self {
        Self {
            schema_version: None,
            success_count: 0,
            failure_count: 0,
            success_profile: None,
            failure_profile: None,
            differentiators: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schema_version.is_none()
    }

    /// The `n` most significant differentiators
    pub fn top(&self, n: usize) -> &[Differentiator] {
        &self.differentiators[..n.min(self.differentiators.len())]
    }
}

/// Schema version shared by every record, if there is exactly one
pub fn detect_version(records: &[FeatureRecord]) -> Option<SchemaVersion> {
    let first = records.first()?.schema_version();
    records
        .iter()
        .all(|r| r.schema_version() == first)
        .then_some(first)
}

/// Compare two cohorts of feature records.
///
/// Empty cohorts and mixed schema versions yield [`CohortComparison::empty`].
pub fn compare(success: &[FeatureRecord], failure: &[FeatureRecord]) -> CohortComparison {
    let (Some(success_version), Some(failure_version)) =
        (detect_version(success), detect_version(failure))
    else {
        debug!(
            success = success.len(),
            failure = failure.len(),
            "Cohort empty or mixed-version, returning empty comparison"
        );
        return CohortComparison::empty();
    };

    if success_version != failure_version {
        debug!(
            %success_version,
            %failure_version,
            "Cohorts use different schema versions, returning empty comparison"
        );
        return CohortComparison::empty();
    }

    let (success_profile, failure_profile) = match success_version {
        SchemaVersion::V2 => {
            let s: Vec<&AgentFeatures> = success.iter().filter_map(FeatureRecord::as_v2).collect();
            let f: Vec<&AgentFeatures> = failure.iter().filter_map(FeatureRecord::as_v2).collect();
            (
                CohortProfile::V2(AgentCohortProfile::build(&s)),
                CohortProfile::V2(AgentCohortProfile::build(&f)),
            )
        }
        SchemaVersion::V3 => {
            let s: Vec<&DecisionFeatures> =
                success.iter().filter_map(FeatureRecord::as_v3).collect();
            let f: Vec<&DecisionFeatures> =
                failure.iter().filter_map(FeatureRecord::as_v3).collect();
            (
                CohortProfile::V3(DecisionCohortProfile::build(&s)),
                CohortProfile::V3(DecisionCohortProfile::build(&f)),
            )
        }
    };

    let differentiators = rank_differentiators(
        &success_profile.feature_values(),
        &failure_profile.feature_values(),
    );

    CohortComparison {
        schema_version: Some(success_version),
        success_count: success.len() as u32,
        failure_count: failure.len() as u32,
        success_profile: Some(success_profile),
        failure_profile: Some(failure_profile),
        differentiators,
    }
}

/// Build differentiators over the union of feature names, sorted by
/// descending significance. Names missing on one side count as 0.
pub fn rank_differentiators(
    success: &[(String, f64)],
    failure: &[(String, f64)],
) -> Vec<Differentiator> {
    let failure_values: BTreeMap<&str, f64> =
        failure.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let success_values: BTreeMap<&str, f64> =
        success.iter().map(|(k, v)| (k.as_str(), *v)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut differentiators = Vec::with_capacity(success.len().max(failure.len()));

    for (name, _) in success.iter().chain(failure.iter()) {
        if !seen.insert(name.as_str()) {
            continue;
        }
        let s = success_values.get(name.as_str()).copied().unwrap_or(0.0);
        let f = failure_values.get(name.as_str()).copied().unwrap_or(0.0);
        differentiators.push(Differentiator::new(name.clone(), s, f));
    }

    // Stable: equal significance keeps emission order
    differentiators.sort_by(|a, b| b.significance.total_cmp(&a.significance));
    differentiators
}

/// Top-N patterns by count, ties broken by name
pub(crate) fn top_patterns(
    totals: &BTreeMap<String, u32>,
    total_markers: u32,
    n: usize,
) -> Vec<PatternFrequency> {
    let mut patterns: Vec<(&String, &u32)> = totals.iter().filter(|(_, c)| **c > 0).collect();
    // BTreeMap order already sorts names; stable sort keeps it for ties
    patterns.sort_by(|a, b| b.1.cmp(a.1));
    patterns
        .into_iter()
        .take(n)
        .map(|(pattern, count)| PatternFrequency {
            pattern: pattern.clone(),
            count: *count,
            share: crate::features::ratio(*count as f64, total_markers as f64),
        })
        .collect()
}

/// Sum every map's counts per key
pub(crate) fn sum_maps<'a>(maps: impl IntoIterator<Item = &'a BTreeMap<String, u32>>) -> BTreeMap<String, u32> {
    let mut totals = BTreeMap::new();
    for map in maps {
        for (key, count) in map {
            *totals.entry(key.clone()).or_insert(0) += *count;
        }
    }
    totals
}

/// Each count divided by `denominator` (0 when the denominator is 0)
pub(crate) fn normalize_map(totals: &BTreeMap<String, u32>, denominator: f64) -> BTreeMap<String, f64> {
    totals
        .iter()
        .map(|(k, v)| (k.clone(), crate::features::ratio(*v as f64, denominator)))
        .collect()
}

/// Append `prefix.key` entries for a category map
pub(crate) fn push_category(out: &mut Vec<(String, f64)>, prefix: &str, map: &BTreeMap<String, f64>) {
    for (key, value) in map {
        out.push((format!("{}.{}", prefix, key), *value));
    }
}

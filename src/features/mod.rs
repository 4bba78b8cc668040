//! Per-call feature records
//!
//! Aggregators fold the marker list of one call into a fixed-shape record.
//! Each schema version has its own record type; [`FeatureRecord`] carries an
//! explicit `schema_version` tag so consumers never have to guess which shape
//! they are holding.

pub mod v2;
pub mod v3;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaVersion;

pub use v2::{AgentAggregator, AgentFeatures, AgentKindValues, ThirdsDistribution};
pub use v3::{
    CommitmentStats, ConstraintStats, ControlStats, DecisionAggregator, DecisionFeatures,
    NluStats, ResolutionStats, StrategyStats,
};

/// Versioned feature record for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_version")]
pub enum FeatureRecord {
    #[serde(rename = "v2")]
    V2(AgentFeatures),
    #[serde(rename = "v3")]
    V3(DecisionFeatures),
}

impl FeatureRecord {
    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            FeatureRecord::V2(_) => SchemaVersion::V2,
            FeatureRecord::V3(_) => SchemaVersion::V3,
        }
    }

    pub fn marker_count(&self) -> u32 {
        match self {
            FeatureRecord::V2(f) => f.marker_count,
            FeatureRecord::V3(f) => f.marker_count,
        }
    }

    pub fn as_v2(&self) -> Option<&AgentFeatures> {
        match self {
            FeatureRecord::V2(f) => Some(f),
            FeatureRecord::V3(_) => None,
        }
    }

    pub fn as_v3(&self) -> Option<&DecisionFeatures> {
        match self {
            FeatureRecord::V3(f) => Some(f),
            FeatureRecord::V2(_) => None,
        }
    }

    /// Load a record from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the record to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Mean of `values`, or 0 when empty
pub(crate) fn mean_or_zero(values: impl IntoIterator<Item = f64>) -> f64 {
    mean(values).unwrap_or(0.0)
}

/// Mean of `values`, or `None` when empty
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// `numerator / denominator`, or 0 when the denominator is 0
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

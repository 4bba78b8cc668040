//! Marker taxonomies
//!
//! Two marker schemas coexist. The legacy agent-marker set (`v2`) describes
//! span-based events (commitments, blockers, stalls...). The decision-marker
//! set (`v3`) describes point-in-time events around customer constraints and
//! how the agent responds to them. They share no base type; [`MarkerSet`] is
//! the envelope used where either may flow.

pub mod nlu;
pub mod v2;
pub mod v3;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use nlu::{DisclosureCheck, EntityMention, IntentDetection, NluResults, Obligation};
pub use v2::{AgentCallFlags, AgentCallMetrics, AgentMarker, AgentMarkerKind};
pub use v3::{DecisionCallMetrics, DecisionMarker, DecisionMarkerKind};

/// Feature/marker schema version discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V2,
    V3,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V2 => "v2",
            SchemaVersion::V3 => "v3",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v2" | "2" => Ok(SchemaVersion::V2),
            "v3" | "3" => Ok(SchemaVersion::V3),
            other => Err(format!("unknown schema version '{}' (expected v2 or v3)", other)),
        }
    }
}

/// Call participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Customer,
}

/// Outcome predicted by the extraction step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictedOutcome {
    Success,
    Failure,
    Uncertain,
}

/// Overall tone of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallTone {
    Positive,
    Neutral,
    Negative,
    Tense,
}

impl CallTone {
    pub fn label(&self) -> &'static str {
        match self {
            CallTone::Positive => "positive",
            CallTone::Neutral => "neutral",
            CallTone::Negative => "negative",
            CallTone::Tense => "tense",
        }
    }
}

/// All markers extracted for one call, in one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_version", content = "markers", rename_all = "lowercase")]
pub enum MarkerSet {
    V2(Vec<AgentMarker>),
    V3(Vec<DecisionMarker>),
}

impl MarkerSet {
    pub fn empty(version: SchemaVersion) -> Self {
        match version {
            SchemaVersion::V2 => MarkerSet::V2(Vec::new()),
            SchemaVersion::V3 => MarkerSet::V3(Vec::new()),
        }
    }

    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            MarkerSet::V2(_) => SchemaVersion::V2,
            MarkerSet::V3(_) => SchemaVersion::V3,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MarkerSet::V2(markers) => markers.len(),
            MarkerSet::V3(markers) => markers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another set of the same version. A set in another version is
    /// rejected and its version returned.
    pub fn extend(&mut self, other: MarkerSet) -> Result<(), SchemaVersion> {
        match (self, other) {
            (MarkerSet::V2(markers), MarkerSet::V2(more)) => markers.extend(more),
            (MarkerSet::V3(markers), MarkerSet::V3(more)) => markers.extend(more),
            (_, other) => return Err(other.schema_version()),
        }
        Ok(())
    }

    /// Drop exact duplicates produced by overlapping windows, keeping the
    /// first occurrence.
    pub fn dedup(&mut self) -> usize {
        let before = self.len();
        match self {
            MarkerSet::V2(markers) => dedup_in_order(markers),
            MarkerSet::V3(markers) => dedup_in_order(markers),
        }
        before - self.len()
    }
}

fn dedup_in_order<T: PartialEq>(items: &mut Vec<T>) {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    *items = kept;
}

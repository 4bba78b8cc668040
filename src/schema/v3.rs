//! Decision-marker schema (v3)
//!
//! v3 markers are point events (`time`, seconds from call start) describing
//! customer constraints, the agent's response strategies, shifts in
//! conversational control, and the quality of commitments.

use serde::{Deserialize, Serialize};

use super::{CallTone, PredictedOutcome, Speaker};

/// Customer-stated obstacle category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Trust,
    Capability,
    Time,
    Authority,
    Risk,
    Clarity,
}

impl ConstraintType {
    pub const ALL: [ConstraintType; 6] = [
        ConstraintType::Trust,
        ConstraintType::Capability,
        ConstraintType::Time,
        ConstraintType::Authority,
        ConstraintType::Risk,
        ConstraintType::Clarity,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConstraintType::Trust => "trust",
            ConstraintType::Capability => "capability",
            ConstraintType::Time => "time",
            ConstraintType::Authority => "authority",
            ConstraintType::Risk => "risk",
            ConstraintType::Clarity => "clarity",
        }
    }
}

/// How strongly a constraint was voiced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Numeric severity on a 1-3 scale
    pub fn score(&self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
        }
    }
}

/// Control dynamics event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlEventType {
    /// Control moved away from the agent
    ControlShift,
    /// Agent regained control
    ControlRecovery,
    AgentInControl,
    CustomerInControl,
}

/// Commitment category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentType {
    Payment,
    Purchase,
    Callback,
    FollowUp,
    Conditional,
    Deferral,
}

impl CommitmentType {
    pub const ALL: [CommitmentType; 6] = [
        CommitmentType::Payment,
        CommitmentType::Purchase,
        CommitmentType::Callback,
        CommitmentType::FollowUp,
        CommitmentType::Conditional,
        CommitmentType::Deferral,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CommitmentType::Payment => "payment",
            CommitmentType::Purchase => "purchase",
            CommitmentType::Callback => "callback",
            CommitmentType::FollowUp => "follow_up",
            CommitmentType::Conditional => "conditional",
            CommitmentType::Deferral => "deferral",
        }
    }
}

/// Customer constraint data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintMarker {
    pub time: f64,
    pub confidence: f64,
    pub description: String,
    pub constraint_type: ConstraintType,
    pub severity: Severity,
    /// Stated outright rather than implied
    pub explicit: bool,
}

/// Agent response strategy data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMarker {
    pub time: f64,
    pub confidence: f64,
    pub description: String,
    pub strategy: String,
    /// Constraint the agent says the strategy addresses
    #[serde(default)]
    pub target_constraint: Option<ConstraintType>,
}

/// Control dynamics data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDynamicsMarker {
    pub time: f64,
    pub confidence: f64,
    pub description: String,
    pub event: ControlEventType,
    #[serde(default)]
    pub cause: Option<String>,
}

/// Commitment quality data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentQualityMarker {
    pub time: f64,
    pub confidence: f64,
    pub description: String,
    pub commitment_type: CommitmentType,
    pub initiator: Speaker,
    pub reversible: bool,
    /// Seconds since the most recent constraint; negative values mean unknown
    #[serde(default)]
    pub time_since_last_constraint: Option<f64>,
}

/// A v3 decision marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionMarker {
    CustomerConstraint(ConstraintMarker),
    AgentResponseStrategy(StrategyMarker),
    ControlDynamics(ControlDynamicsMarker),
    CommitmentQuality(CommitmentQualityMarker),
}

/// Discriminant of [`DecisionMarker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMarkerKind {
    CustomerConstraint,
    AgentResponseStrategy,
    ControlDynamics,
    CommitmentQuality,
}

impl DecisionMarker {
    pub fn kind(&self) -> DecisionMarkerKind {
        match self {
            DecisionMarker::CustomerConstraint(_) => DecisionMarkerKind::CustomerConstraint,
            DecisionMarker::AgentResponseStrategy(_) => DecisionMarkerKind::AgentResponseStrategy,
            DecisionMarker::ControlDynamics(_) => DecisionMarkerKind::ControlDynamics,
            DecisionMarker::CommitmentQuality(_) => DecisionMarkerKind::CommitmentQuality,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            DecisionMarker::CustomerConstraint(m) => m.time,
            DecisionMarker::AgentResponseStrategy(m) => m.time,
            DecisionMarker::ControlDynamics(m) => m.time,
            DecisionMarker::CommitmentQuality(m) => m.time,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            DecisionMarker::CustomerConstraint(m) => m.confidence,
            DecisionMarker::AgentResponseStrategy(m) => m.confidence,
            DecisionMarker::ControlDynamics(m) => m.confidence,
            DecisionMarker::CommitmentQuality(m) => m.confidence,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            DecisionMarker::CustomerConstraint(m) => &m.description,
            DecisionMarker::AgentResponseStrategy(m) => &m.description,
            DecisionMarker::ControlDynamics(m) => &m.description,
            DecisionMarker::CommitmentQuality(m) => &m.description,
        }
    }
}

/// Per-call auxiliary metrics for the v3 schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCallMetrics {
    pub predicted_outcome: PredictedOutcome,
    pub outcome_confidence: f64,
    pub call_tone: CallTone,
}

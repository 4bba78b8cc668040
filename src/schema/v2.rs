//! Legacy agent-marker schema (v2)
//!
//! Every v2 marker covers a span of the call (`start_time`..`end_time`, in
//! seconds from call start).

use serde::{Deserialize, Serialize};

use super::{CallTone, PredictedOutcome, Speaker};

/// How firmly a commitment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStrength {
    Tentative,
    Conditional,
    Firm,
}

/// What stands in the way of progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerType {
    Price,
    Timing,
    Authority,
    Need,
    Trust,
    Competitor,
    Other,
}

/// Technique the agent used to work through a blocker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionApproach {
    Reframe,
    Evidence,
    Concession,
    Empathy,
    Escalation,
    Other,
}

/// Direction of a control change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlDirection {
    Gained,
    Lost,
}

/// Kind of stall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallType {
    ThinkAboutIt,
    SendInformation,
    CallBackLater,
    Silence,
    Other,
}

/// Commitment event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentEvent {
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub description: String,
    pub strength: CommitmentStrength,
    pub committed_by: Speaker,
}

/// Blocker (objection) event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockerEvent {
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub description: String,
    pub blocker_type: BlockerType,
    /// Whether the blocker was resolved before the call ended
    #[serde(default)]
    pub resolved: bool,
}

/// Resolution attempt data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub description: String,
    pub approach: ResolutionApproach,
    #[serde(default)]
    pub successful: Option<bool>,
}

/// Conversation control event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub description: String,
    pub holder: Speaker,
    pub direction: ControlDirection,
}

/// Stall event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallEvent {
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub description: String,
    pub stall_type: StallType,
}

/// A v2 agent marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentMarker {
    Commitment(CommitmentEvent),
    Blocker(BlockerEvent),
    ResolutionAttempt(ResolutionAttempt),
    Control(ControlEvent),
    Stall(StallEvent),
}

/// Discriminant of [`AgentMarker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMarkerKind {
    Commitment,
    Blocker,
    ResolutionAttempt,
    Control,
    Stall,
}

impl AgentMarkerKind {
    pub const ALL: [AgentMarkerKind; 5] = [
        AgentMarkerKind::Commitment,
        AgentMarkerKind::Blocker,
        AgentMarkerKind::ResolutionAttempt,
        AgentMarkerKind::Control,
        AgentMarkerKind::Stall,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgentMarkerKind::Commitment => "commitment",
            AgentMarkerKind::Blocker => "blocker",
            AgentMarkerKind::ResolutionAttempt => "resolution_attempt",
            AgentMarkerKind::Control => "control",
            AgentMarkerKind::Stall => "stall",
        }
    }
}

impl AgentMarker {
    pub fn kind(&self) -> AgentMarkerKind {
        match self {
            AgentMarker::Commitment(_) => AgentMarkerKind::Commitment,
            AgentMarker::Blocker(_) => AgentMarkerKind::Blocker,
            AgentMarker::ResolutionAttempt(_) => AgentMarkerKind::ResolutionAttempt,
            AgentMarker::Control(_) => AgentMarkerKind::Control,
            AgentMarker::Stall(_) => AgentMarkerKind::Stall,
        }
    }

    pub fn start_time(&self) -> f64 {
        match self {
            AgentMarker::Commitment(e) => e.start_time,
            AgentMarker::Blocker(e) => e.start_time,
            AgentMarker::ResolutionAttempt(e) => e.start_time,
            AgentMarker::Control(e) => e.start_time,
            AgentMarker::Stall(e) => e.start_time,
        }
    }

    pub fn end_time(&self) -> f64 {
        match self {
            AgentMarker::Commitment(e) => e.end_time,
            AgentMarker::Blocker(e) => e.end_time,
            AgentMarker::ResolutionAttempt(e) => e.end_time,
            AgentMarker::Control(e) => e.end_time,
            AgentMarker::Stall(e) => e.end_time,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            AgentMarker::Commitment(e) => e.confidence,
            AgentMarker::Blocker(e) => e.confidence,
            AgentMarker::ResolutionAttempt(e) => e.confidence,
            AgentMarker::Control(e) => e.confidence,
            AgentMarker::Stall(e) => e.confidence,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            AgentMarker::Commitment(e) => &e.description,
            AgentMarker::Blocker(e) => &e.description,
            AgentMarker::ResolutionAttempt(e) => &e.description,
            AgentMarker::Control(e) => &e.description,
            AgentMarker::Stall(e) => &e.description,
        }
    }
}

/// Boolean call-level flags reported alongside v2 markers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCallFlags {
    pub price_discussed: bool,
    pub competitor_mentioned: bool,
    pub decision_maker_present: bool,
    pub next_steps_agreed: bool,
    pub escalation_requested: bool,
}

/// Per-call auxiliary metrics for the v2 schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCallMetrics {
    pub predicted_outcome: PredictedOutcome,
    pub outcome_confidence: f64,
    pub call_tone: CallTone,
    #[serde(default)]
    pub flags: AgentCallFlags,
    /// Notable keywords detected in the call
    #[serde(default)]
    pub keywords: Vec<String>,
}

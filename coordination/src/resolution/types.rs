//! Shared resolution types: results, caller inputs, progress and events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::ArgumentSubmission;
use crate::points::{DivergencePoint, ResolutionStrategy};

/// How a resolution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    Consensus,
    Partial,
    Failed,
    Postponed,
    Escalated,
}

impl std::fmt::Display for OutcomeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consensus => write!(f, "consensus"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
            Self::Postponed => write!(f, "postponed"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// Terminal result of one strategy execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub success: bool,
    pub strategy_used: ResolutionStrategy,
    pub outcome_type: OutcomeType,
    /// Statements that become new consensus points on success.
    pub new_consensus_points: Vec<String>,
    pub participant_satisfaction: BTreeMap<String, f64>,
    pub summary: String,
    /// Estimated duration in minutes.
    pub duration_minutes: u32,
}

impl ResolutionResult {
    /// Result for an execution that ended without a usable outcome.
    pub fn inconclusive(strategy: ResolutionStrategy, summary: impl Into<String>) -> Self {
        Self {
            success: false,
            strategy_used: strategy,
            outcome_type: OutcomeType::Partial,
            new_consensus_points: Vec::new(),
            participant_satisfaction: BTreeMap::new(),
            summary: summary.into(),
            duration_minutes: 0,
        }
    }
}

/// Caller-supplied inputs that replace simulated executor values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionInputs {
    /// Arguments submitted during the argumentation phase of a debate.
    pub arguments: Vec<ArgumentSubmission>,
    /// voter -> position voted for.
    pub ballots: BTreeMap<String, String>,
    /// Mediation acceptance rate.
    pub acceptance_rate: Option<f64>,
    /// party -> flexibility for compromise.
    pub flexibility: BTreeMap<String, f64>,
    /// party -> evidence score for data-driven resolution.
    pub evidence_scores: BTreeMap<String, f64>,
}

impl ResolutionInputs {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One step reported by a running executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub strategy: ResolutionStrategy,
    pub step: String,
    pub detail: String,
}

impl ProgressEvent {
    pub fn new(strategy: ResolutionStrategy, step: &str, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            step: step.to_string(),
            detail: detail.into(),
        }
    }
}

/// Everything an executor needs to run. Owns a copy of the divergence so a
/// run can be serialized between steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub divergence_id: String,
    pub divergence: DivergencePoint,
    pub participants: Vec<String>,
    pub previous_attempts: u32,
    pub time_budget_minutes: u32,
    #[serde(default)]
    pub inputs: ResolutionInputs,
}

impl ResolutionContext {
    pub fn new(divergence_id: &str, divergence: &DivergencePoint, participants: &[String]) -> Self {
        let participants = if participants.is_empty() {
            divergence.participants()
        } else {
            participants.to_vec()
        };
        Self {
            divergence_id: divergence_id.to_string(),
            divergence: divergence.clone(),
            participants,
            previous_attempts: divergence.resolution_attempts(),
            time_budget_minutes: 30,
            inputs: ResolutionInputs::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: ResolutionInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_time_budget(mut self, minutes: u32) -> Self {
        self.time_budget_minutes = minutes;
        self
    }
}

/// Ordered record of what conflict handling did, returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionEvent {
    ConflictsDetected {
        round: u32,
        alert_ids: Vec<String>,
    },
    ConflictAcknowledged {
        alert_id: String,
        divergence_id: String,
        strategy: ResolutionStrategy,
    },
    ResolutionStarted {
        session_id: String,
        divergence_id: String,
        strategy: ResolutionStrategy,
    },
    Progress {
        session_id: String,
        event: ProgressEvent,
    },
    ResolutionEscalated {
        session_id: String,
        from: ResolutionStrategy,
        to: ResolutionStrategy,
    },
    ResolutionCompleted {
        session_id: String,
        divergence_id: String,
        outcome: OutcomeType,
        new_consensus_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    ResolutionFailed {
        session_id: String,
        divergence_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl ResolutionEvent {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ResolutionStarted { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::ResolutionEscalated { session_id, .. }
            | Self::ResolutionCompleted { session_id, .. }
            | Self::ResolutionFailed { session_id, .. } => Some(session_id),
            Self::ConflictsDetected { .. } | Self::ConflictAcknowledged { .. } => None,
        }
    }
}

//! Conflict detection and alert lifecycle.
//!
//! ```text
//!  divergences ──► ConflictDetector::monitor_divergences ──► ConflictAlert
//!                                                               │
//!                    TriggerManager: pending ─► acknowledged ─► triggered ─► resolved
//! ```

pub mod detector;
pub mod trigger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::points::{ResolutionStrategy, Severity, SeverityWeights};

pub use detector::{ConflictDetector, DetectionRecord};
pub use trigger::{ResolvedAlert, TriggerManager, TriggerStatistics};

/// Independent condition that can flag a divergence as a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    Intensity,
    OpposingPositions,
    Stagnation,
    Escalation,
    ExpertRequest,
    Polarization,
    Deadlock,
}

impl TriggerCondition {
    /// Conditions from most to least significant.
    pub const PRIORITY: [TriggerCondition; 7] = [
        Self::Deadlock,
        Self::Escalation,
        Self::Polarization,
        Self::ExpertRequest,
        Self::Intensity,
        Self::OpposingPositions,
        Self::Stagnation,
    ];

    /// Default strategy for a conflict whose primary condition is `self`.
    pub fn default_strategy(self) -> ResolutionStrategy {
        match self {
            Self::Intensity => ResolutionStrategy::Debate,
            Self::OpposingPositions => ResolutionStrategy::Mediation,
            Self::Stagnation => ResolutionStrategy::DataDriven,
            Self::Escalation => ResolutionStrategy::Debate,
            Self::ExpertRequest => ResolutionStrategy::ExpertReview,
            Self::Polarization => ResolutionStrategy::Compromise,
            Self::Deadlock => ResolutionStrategy::Voting,
        }
    }
}

impl std::fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intensity => write!(f, "intensity"),
            Self::OpposingPositions => write!(f, "opposing_positions"),
            Self::Stagnation => write!(f, "stagnation"),
            Self::Escalation => write!(f, "escalation"),
            Self::ExpertRequest => write!(f, "expert_request"),
            Self::Polarization => write!(f, "polarization"),
            Self::Deadlock => write!(f, "deadlock"),
        }
    }
}

/// A condition that fired, with the measured value and its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredCondition {
    pub condition: TriggerCondition,
    pub value: f64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// A divergence that needs intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictAlert {
    pub id: String,
    pub divergence_id: String,
    pub round: u32,
    /// Primary condition.
    pub trigger: TriggerCondition,
    /// Every condition that fired, primary included.
    pub conditions: Vec<FiredCondition>,
    pub recommended_strategy: ResolutionStrategy,
    pub urgency: f64,
    pub severity: Severity,
    pub participants: Vec<String>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConflictAlert {
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
        self.acknowledged_at = Some(Utc::now());
    }

    pub fn has_condition(&self, condition: TriggerCondition) -> bool {
        self.conditions.iter().any(|c| c.condition == condition)
    }

    /// One-line status summary.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} {} urgency={:.2} -> {}",
            self.severity, self.divergence_id, self.trigger, self.urgency, self.recommended_strategy
        )
    }
}

/// Detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictThresholds {
    pub intensity: f64,
    pub opposing_pairs: usize,
    /// Window of intensities inspected for stagnation.
    pub stagnation_rounds: usize,
    pub stagnation_variance: f64,
    pub stagnation_mean: f64,
    pub escalation_rate: f64,
    pub polarization: f64,
    pub deadlock_attempts: u32,
    pub deadlock_age: u32,
    pub deadlock_intensity: f64,
    pub auto_trigger_urgency: f64,
    pub severity_weights: SeverityWeights,
    /// Intensity samples kept per divergence.
    pub history_limit: usize,
}

impl Default for ConflictThresholds {
    fn default() -> Self {
        Self {
            intensity: 0.7,
            opposing_pairs: 2,
            stagnation_rounds: 3,
            stagnation_variance: 0.01,
            stagnation_mean: 0.5,
            escalation_rate: 0.15,
            polarization: 0.8,
            deadlock_attempts: 2,
            deadlock_age: 4,
            deadlock_intensity: 0.6,
            auto_trigger_urgency: 0.75,
            severity_weights: SeverityWeights::new(1.0, 0.8, 0.5, 0.3),
            history_limit: 20,
        }
    }
}

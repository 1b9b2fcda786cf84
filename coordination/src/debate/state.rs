//! Debate state machine: phases, transitions, and round tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Phase of a structured debate. Phases advance strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Each position states its case.
    Opening,
    /// Evidence-backed arguments.
    Argumentation,
    /// Positions question each other in turn.
    CrossExamination,
    /// Lowest-scoring speakers answer first.
    Rebuttal,
    /// Shared terms and jointly supported arguments are collected.
    CommonGround,
    /// Positions are ranked.
    Synthesis,
    /// Final statements; advancing past this ends the debate.
    Closing,
}

impl DebatePhase {
    /// All phases in order.
    pub const ORDER: [DebatePhase; 7] = [
        Self::Opening,
        Self::Argumentation,
        Self::CrossExamination,
        Self::Rebuttal,
        Self::CommonGround,
        Self::Synthesis,
        Self::Closing,
    ];

    /// Whether this is the last phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing)
    }

    /// The phase after this one, if any.
    pub fn next(self) -> Option<DebatePhase> {
        self.valid_transitions().first().copied()
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Opening => &[Self::Argumentation],
            Self::Argumentation => &[Self::CrossExamination],
            Self::CrossExamination => &[Self::Rebuttal],
            Self::Rebuttal => &[Self::CommonGround],
            Self::CommonGround => &[Self::Synthesis],
            Self::Synthesis => &[Self::Closing],
            Self::Closing => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opening => write!(f, "opening"),
            Self::Argumentation => write!(f, "argumentation"),
            Self::CrossExamination => write!(f, "cross_examination"),
            Self::Rebuttal => write!(f, "rebuttal"),
            Self::CommonGround => write!(f, "common_ground"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTransition {
    /// Previous phase.
    pub from: DebatePhase,
    /// New phase.
    pub to: DebatePhase,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Reason for the transition.
    pub reason: String,
}

/// Phase, round and lifecycle flags of one debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    pub phase: DebatePhase,
    /// Current round (1 after start).
    pub round: u32,
    pub max_rounds: u32,
    pub active: bool,
    pub transitions: Vec<DebateTransition>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DebateState {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            phase: DebatePhase::Opening,
            round: 0,
            max_rounds,
            active: false,
            transitions: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Mark the debate active in the opening phase, round 1.
    pub fn start(&mut self) {
        self.phase = DebatePhase::Opening;
        self.round = 1;
        self.active = true;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
    }

    /// Transition to a new phase with a reason.
    pub fn transition(
        &mut self,
        to: DebatePhase,
        reason: &str,
    ) -> Result<(), TransitionError<DebatePhase>> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;

        // Increment round when entering Argumentation
        if to == DebatePhase::Argumentation {
            self.round += 1;
        }

        Ok(())
    }

    /// End the debate. Idempotent.
    pub fn finish(&mut self) {
        if self.active {
            self.active = false;
            self.ended_at = Some(Utc::now());
        }
    }

    /// Whether the debate has ended.
    pub fn is_complete(&self) -> bool {
        !self.active && self.ended_at.is_some()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | {} transitions | {}",
            self.phase,
            self.round,
            self.max_rounds,
            self.transitions.len(),
            if self.active { "active" } else { "inactive" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = DebateState::new(4);
        assert_eq!(state.phase, DebatePhase::Opening);
        assert_eq!(state.round, 0);
        assert!(!state.active);
        assert!(!state.is_complete());
    }

    #[test]
    fn test_full_phase_walk() {
        let mut state = DebateState::new(4);
        state.start();
        assert_eq!(state.round, 1);
        for phase in &DebatePhase::ORDER[1..] {
            state.transition(*phase, "advance").unwrap();
        }
        assert_eq!(state.phase, DebatePhase::Closing);
        assert_eq!(state.round, 2);
        assert_eq!(state.transitions.len(), 6);
        state.finish();
        assert!(state.is_complete());
    }

    #[test]
    fn test_skip_rejected() {
        let mut state = DebateState::new(4);
        state.start();
        let err = state
            .transition(DebatePhase::Rebuttal, "skip")
            .unwrap_err();
        assert_eq!(err.from, DebatePhase::Opening);
        assert_eq!(err.to, DebatePhase::Rebuttal);
        assert!(state.transitions.is_empty());
    }

    #[test]
    fn test_closing_has_no_successor() {
        assert_eq!(DebatePhase::Closing.next(), None);
        assert_eq!(DebatePhase::Opening.next(), Some(DebatePhase::Argumentation));
        assert!(DebatePhase::Closing.is_terminal());
    }

    #[test]
    fn test_status_line() {
        let mut state = DebateState::new(4);
        state.start();
        let line = state.status_line();
        assert!(line.contains("[opening]"));
        assert!(line.contains("round 1/4"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(DebatePhase::CrossExamination.to_string(), "cross_examination");
        assert_eq!(DebatePhase::CommonGround.to_string(), "common_ground");
    }
}

//! Resolution session state machine.
//!
//! ```text
//! Pending → Active ⇄ Paused
//!             │
//!             ├─► Failed            (no executor)
//!             ▼
//!         Evaluating ─► Completed
//!             │
//!             ├─► Failed            (ladder exhausted)
//!             └─► Escalated ─► Active (next strategy)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::executors::ExecutionRun;
use super::types::{ProgressEvent, ResolutionResult};
use crate::error::TransitionError;
use crate::points::ResolutionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Active,
    Paused,
    Evaluating,
    Completed,
    Failed,
    Escalated,
}

impl SessionState {
    /// Valid transitions from this state.
    pub fn valid_transitions(self) -> &'static [SessionState] {
        match self {
            Self::Pending => &[Self::Active],
            Self::Active => &[Self::Paused, Self::Evaluating, Self::Failed],
            Self::Paused => &[Self::Active],
            Self::Evaluating => &[Self::Completed, Self::Failed, Self::Escalated],
            Self::Escalated => &[Self::Active],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// A session state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// One attempt to resolve a divergence, possibly across several strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSession {
    pub id: String,
    pub divergence_id: String,
    /// Alert that started the session, if any.
    pub alert_id: Option<String>,
    pub strategy: ResolutionStrategy,
    pub state: SessionState,
    pub participants: Vec<String>,
    pub history: Vec<SessionTransition>,
    pub intermediate_results: Vec<ProgressEvent>,
    /// Results of unsuccessful strategies, in order.
    pub attempt_results: Vec<ResolutionResult>,
    pub final_result: Option<ResolutionResult>,
    pub escalation_count: u32,
    pub strategies_tried: Vec<ResolutionStrategy>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Run of the current strategy.
    #[serde(default)]
    pub(crate) run: Option<ExecutionRun>,
}

impl ResolutionSession {
    pub fn new(divergence_id: &str, strategy: ResolutionStrategy, participants: &[String]) -> Self {
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            divergence_id: divergence_id.to_string(),
            alert_id: None,
            strategy,
            state: SessionState::Pending,
            participants: participants.to_vec(),
            history: Vec::new(),
            intermediate_results: Vec::new(),
            attempt_results: Vec::new(),
            final_result: None,
            escalation_count: 0,
            strategies_tried: Vec::new(),
            started_at: None,
            ended_at: None,
            run: None,
        }
    }

    pub fn with_alert(mut self, alert_id: &str) -> Self {
        self.alert_id = Some(alert_id.to_string());
        self
    }

    /// Transition to a new state with a reason.
    pub fn transition(
        &mut self,
        to: SessionState,
        reason: &str,
    ) -> Result<(), TransitionError<SessionState>> {
        if !self.state.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.state,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.state.valid_transitions()
                ),
            });
        }
        self.history.push(SessionTransition {
            from: self.state,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.state = to;
        if to.is_terminal() {
            self.ended_at = Some(Utc::now());
            self.run = None;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError<SessionState>> {
        self.transition(SessionState::Active, "session started")?;
        self.started_at = Some(Utc::now());
        self.strategies_tried.push(self.strategy);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), TransitionError<SessionState>> {
        self.transition(SessionState::Paused, "paused")
    }

    pub fn resume(&mut self) -> Result<(), TransitionError<SessionState>> {
        self.transition(SessionState::Active, "resumed")
    }

    /// Hand the finished run's result over for evaluation.
    pub fn begin_evaluation(&mut self) -> Result<(), TransitionError<SessionState>> {
        self.run = None;
        self.transition(SessionState::Evaluating, "strategy finished")
    }

    pub fn complete(&mut self, result: ResolutionResult) -> Result<(), TransitionError<SessionState>> {
        self.transition(SessionState::Completed, &result.summary)?;
        self.final_result = Some(result);
        Ok(())
    }

    /// Fail the session. A result, if given, becomes the final result.
    pub fn fail(
        &mut self,
        reason: &str,
        result: Option<ResolutionResult>,
    ) -> Result<(), TransitionError<SessionState>> {
        self.transition(SessionState::Failed, reason)?;
        if result.is_some() {
            self.final_result = result;
        }
        Ok(())
    }

    /// Switch to `next` after an unsuccessful evaluation and resume.
    pub fn escalate(
        &mut self,
        next: ResolutionStrategy,
        failed: ResolutionResult,
    ) -> Result<(), TransitionError<SessionState>> {
        let reason = format!("{} -> {}", self.strategy, next);
        self.transition(SessionState::Escalated, &reason)?;
        self.attempt_results.push(failed);
        self.escalation_count += 1;
        self.strategy = next;
        self.strategies_tried.push(next);
        self.transition(SessionState::Active, "escalated strategy started")
    }

    pub fn record_progress(&mut self, events: &[ProgressEvent]) {
        self.intermediate_results.extend_from_slice(events);
    }

    /// Progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        match self.state {
            SessionState::Pending => 0.0,
            SessionState::Completed => 1.0,
            SessionState::Failed | SessionState::Escalated => 0.5,
            _ => (self.intermediate_results.len() as f64 * 0.15).min(0.9),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Completed
            && self.final_result.as_ref().is_some_and(|r| r.success)
    }

    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} via {} | {} escalations | progress {:.0}%",
            self.state,
            self.divergence_id,
            self.strategy,
            self.escalation_count,
            self.progress() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::OutcomeType;

    fn session() -> ResolutionSession {
        ResolutionSession::new("divergence_0", ResolutionStrategy::Compromise, &["A".to_string()])
    }

    fn result(success: bool) -> ResolutionResult {
        let mut r = ResolutionResult::inconclusive(ResolutionStrategy::Compromise, "done");
        r.success = success;
        if success {
            r.outcome_type = OutcomeType::Consensus;
        }
        r
    }

    #[test]
    fn test_happy_path() {
        let mut s = session();
        assert_eq!(s.progress(), 0.0);
        s.start().unwrap();
        assert_eq!(s.strategies_tried, vec![ResolutionStrategy::Compromise]);
        s.record_progress(&[ProgressEvent::new(ResolutionStrategy::Compromise, "x", "")]);
        assert!((s.progress() - 0.15).abs() < 1e-12);
        s.begin_evaluation().unwrap();
        s.complete(result(true)).unwrap();
        assert!(s.succeeded());
        assert_eq!(s.progress(), 1.0);
        assert_eq!(s.history.len(), 3);
        assert!(s.ended_at.is_some());
    }

    #[test]
    fn test_pause_resume() {
        let mut s = session();
        assert!(s.pause().is_err());
        s.start().unwrap();
        s.pause().unwrap();
        assert!(s.begin_evaluation().is_err());
        s.resume().unwrap();
        assert_eq!(s.state, SessionState::Active);
    }

    #[test]
    fn test_escalation_returns_to_active() {
        let mut s = session();
        s.start().unwrap();
        s.begin_evaluation().unwrap();
        s.escalate(ResolutionStrategy::Mediation, result(false)).unwrap();
        assert_eq!(s.state, SessionState::Active);
        assert_eq!(s.strategy, ResolutionStrategy::Mediation);
        assert_eq!(s.escalation_count, 1);
        assert_eq!(s.attempt_results.len(), 1);
        let states: Vec<SessionState> = s.history.iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                SessionState::Active,
                SessionState::Evaluating,
                SessionState::Escalated,
                SessionState::Active
            ]
        );
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut s = session();
        s.start().unwrap();
        s.fail("no executor", None).unwrap();
        assert_eq!(s.progress(), 0.5);
        assert!(s.resume().is_err());
        assert!(!s.succeeded());
    }

    #[test]
    fn test_progress_caps() {
        let mut s = session();
        s.start().unwrap();
        let events = vec![ProgressEvent::new(ResolutionStrategy::Compromise, "x", ""); 10];
        s.record_progress(&events);
        assert_eq!(s.progress(), 0.9);
        assert!(s.status_line().contains("[active]"));
    }
}

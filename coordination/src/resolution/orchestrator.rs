//! Resolution orchestrator: strategy selection, session stepping and
//! escalation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::executors::{ExecutorConfig, StrategyExecutor};
use super::session::{ResolutionSession, SessionState};
use super::types::{ProgressEvent, ResolutionContext, ResolutionInputs, ResolutionResult};
use crate::debate::DebateRules;
use crate::points::{DivergencePoint, ResolutionStrategy};

/// Order in which strategies are tried after a failure.
pub const ESCALATION_LADDER: [ResolutionStrategy; 6] = [
    ResolutionStrategy::Compromise,
    ResolutionStrategy::Mediation,
    ResolutionStrategy::DataDriven,
    ResolutionStrategy::Debate,
    ResolutionStrategy::Voting,
    ResolutionStrategy::ExpertReview,
];

/// What one [`ResolutionOrchestrator::advance_session`] call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The current strategy needs more steps.
    Running,
    /// The session is paused and did nothing.
    Paused,
    Succeeded { result: ResolutionResult },
    Escalated {
        from: ResolutionStrategy,
        to: ResolutionStrategy,
        result: ResolutionResult,
    },
    Failed {
        reason: String,
        result: Option<ResolutionResult>,
    },
}

impl StepOutcome {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Events and outcome of one session step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStep {
    pub session_id: String,
    pub events: Vec<ProgressEvent>,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatistics {
    pub active_sessions: usize,
    pub completed_sessions: usize,
    pub success_rate: f64,
    pub total_escalations: u32,
    pub strategy_usage: BTreeMap<ResolutionStrategy, usize>,
}

/// Owns every resolution session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionOrchestrator {
    config: ExecutorConfig,
    rules: DebateRules,
    active: BTreeMap<String, ResolutionSession>,
    completed: Vec<ResolutionSession>,
}

impl ResolutionOrchestrator {
    pub fn new(config: ExecutorConfig, rules: DebateRules) -> Self {
        Self {
            config,
            rules,
            active: BTreeMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn rules(&self) -> &DebateRules {
        &self.rules
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = &ResolutionSession> {
        self.active.values()
    }

    pub fn completed_sessions(&self) -> &[ResolutionSession] {
        &self.completed
    }

    /// Look a session up among active and completed sessions.
    pub fn session(&self, session_id: &str) -> Option<&ResolutionSession> {
        self.active
            .get(session_id)
            .or_else(|| self.completed.iter().find(|s| s.id == session_id))
    }

    /// Pick a strategy for a divergence.
    pub fn select_best_strategy(&self, divergence: &DivergencePoint) -> ResolutionStrategy {
        let capable: Vec<ResolutionStrategy> = StrategyExecutor::ALL
            .iter()
            .filter(|e| e.can_handle(divergence))
            .map(|e| e.strategy())
            .collect();

        let Some(&first) = capable.first() else {
            return ResolutionStrategy::Debate;
        };
        let intensity = divergence.intensity();
        if intensity >= 0.8 && capable.contains(&ResolutionStrategy::Debate) {
            return ResolutionStrategy::Debate;
        }
        if divergence.proponents().len() >= 4 && capable.contains(&ResolutionStrategy::Voting) {
            return ResolutionStrategy::Voting;
        }
        if (0.4..=0.7).contains(&intensity) {
            for strategy in [ResolutionStrategy::Mediation, ResolutionStrategy::Compromise] {
                if capable.contains(&strategy) {
                    return strategy;
                }
            }
        }
        first
    }

    /// Next ladder strategy after `current` that can handle the divergence.
    pub fn next_strategy(
        current: ResolutionStrategy,
        divergence: &DivergencePoint,
    ) -> Option<ResolutionStrategy> {
        let start = ESCALATION_LADDER
            .iter()
            .position(|s| *s == current)
            .map_or(0, |i| i + 1);
        ESCALATION_LADDER[start..].iter().copied().find(|s| {
            StrategyExecutor::for_strategy(*s).is_some_and(|e| e.can_handle(divergence))
        })
    }

    /// Create and start a session. Returns its id.
    pub fn start_resolution(
        &mut self,
        divergence_id: &str,
        strategy: ResolutionStrategy,
        participants: &[String],
        alert_id: Option<&str>,
    ) -> String {
        let mut session = ResolutionSession::new(divergence_id, strategy, participants);
        if let Some(alert_id) = alert_id {
            session = session.with_alert(alert_id);
        }
        if let Err(e) = session.start() {
            warn!(error = %e, "Fresh session refused to start");
        }
        info!(session_id = %session.id, divergence_id, strategy = %strategy, "Resolution session started");
        let id = session.id.clone();
        self.active.insert(id.clone(), session);
        id
    }

    pub fn pause(&mut self, session_id: &str) -> bool {
        self.active
            .get_mut(session_id)
            .is_some_and(|s| s.pause().is_ok())
    }

    pub fn resume(&mut self, session_id: &str) -> bool {
        self.active
            .get_mut(session_id)
            .is_some_and(|s| s.resume().is_ok())
    }

    /// Perform one step of an active session.
    ///
    /// `divergence` is the current state of the session's target; it is
    /// consulted when a new strategy run begins and when escalating.
    pub fn advance_session(
        &mut self,
        session_id: &str,
        divergence: &DivergencePoint,
        inputs: Option<&ResolutionInputs>,
    ) -> Option<SessionStep> {
        let session = self.active.get_mut(session_id)?;
        if session.state == SessionState::Paused {
            return Some(SessionStep {
                session_id: session_id.to_string(),
                events: Vec::new(),
                outcome: StepOutcome::Paused,
            });
        }

        if session.run.is_none() {
            let Some(executor) = StrategyExecutor::for_strategy(session.strategy) else {
                let reason = format!("no executor for strategy {}", session.strategy);
                if let Err(e) = session.fail(&reason, None) {
                    warn!(session_id, error = %e, "Could not fail session");
                }
                warn!(session_id, reason = %reason, "Resolution session failed");
                self.retire(session_id);
                return Some(SessionStep {
                    session_id: session_id.to_string(),
                    events: Vec::new(),
                    outcome: StepOutcome::Failed { reason, result: None },
                });
            };
            let context = ResolutionContext::new(&session.divergence_id, divergence, &session.participants)
                .with_inputs(inputs.cloned().unwrap_or_default())
                .with_time_budget(self.config.time_budget_minutes);
            session.run = Some(executor.start(context, &self.config, &self.rules));
        }

        let (events, result) = match session.run.as_mut() {
            Some(run) => run.advance(),
            None => (Vec::new(), None),
        };
        session.record_progress(&events);
        let Some(result) = result else {
            return Some(SessionStep {
                session_id: session_id.to_string(),
                events,
                outcome: StepOutcome::Running,
            });
        };

        if let Err(e) = session.begin_evaluation() {
            warn!(session_id, error = %e, "Could not evaluate session");
        }
        let outcome = if result.success {
            match session.complete(result.clone()) {
                Ok(()) => StepOutcome::Succeeded { result },
                Err(e) => StepOutcome::Failed {
                    reason: e.to_string(),
                    result: Some(result),
                },
            }
        } else {
            self.escalate_strategy(session_id, divergence, result)
        };

        if outcome.is_final() {
            self.retire(session_id);
        }
        Some(SessionStep {
            session_id: session_id.to_string(),
            events,
            outcome,
        })
    }

    /// Move an evaluated session to the next ladder strategy, or fail it when
    /// the ladder is exhausted.
    pub fn escalate_strategy(
        &mut self,
        session_id: &str,
        divergence: &DivergencePoint,
        failed: ResolutionResult,
    ) -> StepOutcome {
        let Some(session) = self.active.get_mut(session_id) else {
            return StepOutcome::Failed {
                reason: format!("unknown session {session_id}"),
                result: Some(failed),
            };
        };
        let from = session.strategy;
        match Self::next_strategy(from, divergence) {
            Some(to) => match session.escalate(to, failed.clone()) {
                Ok(()) => {
                    info!(session_id, from = %from, to = %to, "Resolution strategy escalated");
                    StepOutcome::Escalated { from, to, result: failed }
                }
                Err(e) => StepOutcome::Failed {
                    reason: e.to_string(),
                    result: Some(failed),
                },
            },
            None => {
                let reason = "escalation ladder exhausted".to_string();
                if let Err(e) = session.fail(&reason, Some(failed.clone())) {
                    warn!(session_id, error = %e, "Could not fail session");
                }
                info!(session_id, strategy = %from, "Resolution failed after exhausting strategies");
                StepOutcome::Failed {
                    reason,
                    result: Some(failed),
                }
            }
        }
    }

    fn retire(&mut self, session_id: &str) {
        if let Some(session) = self.active.remove(session_id) {
            debug!(session_id, state = %session.state, "Session retired");
            self.completed.push(session);
        }
    }

    pub fn statistics(&self) -> OrchestratorStatistics {
        let successes = self.completed.iter().filter(|s| s.succeeded()).count();
        let mut strategy_usage = BTreeMap::new();
        for session in &self.completed {
            *strategy_usage.entry(session.strategy).or_insert(0) += 1;
        }
        OrchestratorStatistics {
            active_sessions: self.active.len(),
            completed_sessions: self.completed.len(),
            success_rate: successes as f64 / self.completed.len().max(1) as f64,
            total_escalations: self.completed.iter().map(|s| s.escalation_count).sum(),
            strategy_usage,
        }
    }
}

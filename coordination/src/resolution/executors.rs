//! Strategy executors.
//!
//! Each executor is a variant of [`StrategyExecutor`]. Execution is a step
//! machine: [`ExecutionRun::advance`] performs one bounded step and returns
//! its progress events, plus the terminal [`ResolutionResult`] on the last
//! step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{OutcomeType, ProgressEvent, ResolutionContext, ResolutionResult};
use crate::debate::{DebateEngine, DebateOutcome, DebatePhase, DebateRules};
use crate::points::{unit, DivergencePoint, ResolutionStrategy};

const VOTING_SUCCESS_SHARE: f64 = 0.5;
const VOTING_CONSENSUS_SHARE: f64 = 0.6;
const ACCEPTANCE_SUCCESS: f64 = 0.6;
const COMPROMISE_CONSENSUS: f64 = 0.7;
const EVIDENCE_SUCCESS: f64 = 0.6;
/// Upper bound on steps per run. Every executor finishes well below it.
const MAX_STEPS: u32 = 16;

/// Defaults used when the caller supplies no [`super::ResolutionInputs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub default_acceptance_rate: f64,
    pub default_flexibility: f64,
    pub default_evidence_score: f64,
    pub time_budget_minutes: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_acceptance_rate: 0.7,
            default_flexibility: 0.5,
            default_evidence_score: 0.5,
            time_budget_minutes: 30,
        }
    }
}

/// Executable resolution strategies. Expert review and postponement have no
/// executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyExecutor {
    Debate,
    Voting,
    Mediation,
    Compromise,
    DataDriven,
}

impl StrategyExecutor {
    /// Executors in default preference order.
    pub const ALL: [StrategyExecutor; 5] = [
        Self::Debate,
        Self::Voting,
        Self::Mediation,
        Self::Compromise,
        Self::DataDriven,
    ];

    pub fn for_strategy(strategy: ResolutionStrategy) -> Option<Self> {
        match strategy {
            ResolutionStrategy::Debate => Some(Self::Debate),
            ResolutionStrategy::Voting => Some(Self::Voting),
            ResolutionStrategy::Mediation => Some(Self::Mediation),
            ResolutionStrategy::Compromise => Some(Self::Compromise),
            ResolutionStrategy::DataDriven => Some(Self::DataDriven),
            ResolutionStrategy::ExpertReview | ResolutionStrategy::Postpone => None,
        }
    }

    pub fn strategy(self) -> ResolutionStrategy {
        match self {
            Self::Debate => ResolutionStrategy::Debate,
            Self::Voting => ResolutionStrategy::Voting,
            Self::Mediation => ResolutionStrategy::Mediation,
            Self::Compromise => ResolutionStrategy::Compromise,
            Self::DataDriven => ResolutionStrategy::DataDriven,
        }
    }

    /// Whether this strategy suits the divergence.
    pub fn can_handle(self, divergence: &DivergencePoint) -> bool {
        let intensity = divergence.intensity();
        let pairs = divergence.opposing_pairs().len();
        let proponents = divergence.proponents().len();
        match self {
            Self::Debate => pairs >= 1 && proponents >= 2 && intensity >= 0.5,
            Self::Voting => proponents >= 3 || divergence.resolution_attempts() >= 2,
            Self::Mediation => pairs >= 1 && (0.4..=0.8).contains(&intensity),
            Self::Compromise => {
                (0.3..=0.7).contains(&intensity) && divergence.distinct_positions().len() >= 2
            }
            Self::DataDriven => divergence.discussion_history().len() >= 2,
        }
    }

    /// Estimated duration in minutes.
    pub fn estimate_duration(self, context: &ResolutionContext) -> u32 {
        match self {
            Self::Debate => {
                let participants = context.participants.len() as u32;
                let intensity = (context.divergence.intensity() * 10.0) as u32;
                (20 + 5 * participants + intensity).min(60)
            }
            Self::Voting => 10,
            Self::Mediation => 25,
            Self::Compromise => 15,
            Self::DataDriven => 20,
        }
    }

    /// Begin a run over `context`.
    pub fn start(
        self,
        context: ResolutionContext,
        config: &ExecutorConfig,
        rules: &DebateRules,
    ) -> ExecutionRun {
        ExecutionRun {
            executor: self,
            context,
            config: config.clone(),
            rules: rules.clone(),
            step: 0,
            debate: None,
            finished: false,
        }
    }
}

impl std::fmt::Display for StrategyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.strategy())
    }
}

/// A strategy execution in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRun {
    executor: StrategyExecutor,
    context: ResolutionContext,
    config: ExecutorConfig,
    rules: DebateRules,
    step: u32,
    debate: Option<Box<DebateEngine>>,
    finished: bool,
}

impl ExecutionRun {
    pub fn executor(&self) -> StrategyExecutor {
        self.executor
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Perform one step. Returns the step's events and, on the final step,
    /// the result. Calling again after the result was produced yields nothing.
    pub fn advance(&mut self) -> (Vec<ProgressEvent>, Option<ResolutionResult>) {
        if self.finished {
            return (Vec::new(), None);
        }
        if self.step >= MAX_STEPS {
            self.finished = true;
            warn!(strategy = %self.executor, "Execution exceeded its step limit");
            return (
                Vec::new(),
                Some(ResolutionResult::inconclusive(
                    self.executor.strategy(),
                    "execution did not produce a result",
                )),
            );
        }

        let step = self.step;
        self.step += 1;
        let (events, result) = match self.executor {
            StrategyExecutor::Debate => self.debate_step(step),
            StrategyExecutor::Voting => self.voting_step(step),
            StrategyExecutor::Mediation => self.mediation_step(step),
            StrategyExecutor::Compromise => self.compromise_step(step),
            StrategyExecutor::DataDriven => self.data_driven_step(step),
        };

        let result = result.map(|mut r| {
            r.duration_minutes = self.executor.estimate_duration(&self.context);
            r
        });
        if let Some(r) = &result {
            self.finished = true;
            debug!(
                strategy = %self.executor,
                divergence_id = %self.context.divergence_id,
                success = r.success,
                outcome = %r.outcome_type,
                "Execution finished"
            );
        }
        (events, result)
    }

    /// Step until the result is produced.
    pub fn run_to_completion(&mut self) -> (Vec<ProgressEvent>, ResolutionResult) {
        let mut all = Vec::new();
        loop {
            let (events, result) = self.advance();
            all.extend(events);
            if let Some(result) = result {
                return (all, result);
            }
            if self.finished {
                return (
                    all,
                    ResolutionResult::inconclusive(self.executor.strategy(), "execution already finished"),
                );
            }
        }
    }

    fn event(&self, step: &str, detail: impl Into<String>) -> ProgressEvent {
        ProgressEvent::new(self.executor.strategy(), step, detail)
    }

    // ── Debate ──────────────────────────────────────────────────────

    fn debate_step(&mut self, step: u32) -> (Vec<ProgressEvent>, Option<ResolutionResult>) {
        let strategy = ResolutionStrategy::Debate;
        if step == 0 {
            let mut engine = DebateEngine::new(&self.context.divergence, self.rules.clone());
            return match engine.start() {
                Ok(()) => {
                    let detail = format!(
                        "{} positions, {} participants",
                        engine.positions().len(),
                        engine.participant_count()
                    );
                    self.debate = Some(Box::new(engine));
                    (vec![self.event("debate_started", detail)], None)
                }
                Err(e) => (
                    vec![self.event("debate_rejected", e.to_string())],
                    Some(ResolutionResult::inconclusive(strategy, e.to_string())),
                ),
            };
        }

        let Some(engine) = self.debate.as_mut() else {
            return (Vec::new(), Some(ResolutionResult::inconclusive(strategy, "debate engine missing")));
        };

        if engine.phase().is_terminal() {
            let synthesis = engine.end_debate();
            let success = synthesis.outcome.is_resolution();
            let mut new_points = Vec::new();
            if synthesis.outcome == DebateOutcome::ClearWinner {
                if let Some(leading) = synthesis.leading_position() {
                    new_points.push(leading.to_string());
                }
            }
            if success {
                new_points.extend(synthesis.common_ground.iter().cloned());
            }
            let total = synthesis.total_arguments.max(1) as f64;
            let satisfaction = synthesis
                .participant_scores
                .iter()
                .map(|(p, s)| (p.clone(), unit(s / total)))
                .collect();
            let result = ResolutionResult {
                success,
                strategy_used: strategy,
                outcome_type: if success { OutcomeType::Consensus } else { OutcomeType::Partial },
                new_consensus_points: new_points,
                participant_satisfaction: satisfaction,
                summary: format!("debate finished: {}", synthesis.outcome),
                duration_minutes: 0,
            };
            self.debate = None;
            return (vec![self.event("debate_ended", synthesis.outcome.to_string())], Some(result));
        }

        let mut events = Vec::new();
        match engine.advance_phase() {
            Ok(phase) => {
                events.push(ProgressEvent::new(strategy, "phase_advanced", phase.to_string()));
                match phase {
                    DebatePhase::Argumentation => {
                        for submission in self.context.inputs.arguments.clone() {
                            let speaker = submission.speaker.clone();
                            match engine.submit_argument(submission) {
                                Ok(argument) => events.push(ProgressEvent::new(
                                    strategy,
                                    "argument_submitted",
                                    format!("{} by {} ({:.2})", argument.id, speaker, argument.quality_score),
                                )),
                                Err(e) => events.push(ProgressEvent::new(
                                    strategy,
                                    "argument_rejected",
                                    e.to_string(),
                                )),
                            }
                        }
                    }
                    DebatePhase::CommonGround => {
                        let found = engine.identify_common_ground().len();
                        events.push(ProgressEvent::new(
                            strategy,
                            "common_ground_identified",
                            format!("{found} items"),
                        ));
                    }
                    DebatePhase::Synthesis => {
                        let outcome = engine
                            .synthesis()
                            .map(|s| s.outcome.to_string())
                            .unwrap_or_default();
                        events.push(ProgressEvent::new(strategy, "synthesis_generated", outcome));
                    }
                    _ => {}
                }
                (events, None)
            }
            Err(e) => (
                vec![ProgressEvent::new(strategy, "debate_error", e.to_string())],
                Some(ResolutionResult::inconclusive(strategy, e.to_string())),
            ),
        }
    }

    // ── Voting ──────────────────────────────────────────────────────

    /// Options are the distinct positions, in proponent order.
    fn voting_options(&self) -> Vec<String> {
        let mut options: Vec<String> = Vec::new();
        for proponent in self.context.divergence.proponents() {
            if !options.iter().any(|o| same_position(o, &proponent.position)) {
                options.push(proponent.position.clone());
            }
        }
        options
    }

    /// voter -> option index.
    fn cast_votes(&self, options: &[String]) -> BTreeMap<String, usize> {
        let mut votes = BTreeMap::new();
        for proponent in self.context.divergence.proponents() {
            if let Some(i) = options.iter().position(|o| same_position(o, &proponent.position)) {
                votes.insert(proponent.participant.clone(), i);
            }
        }
        for (voter, choice) in &self.context.inputs.ballots {
            match options.iter().position(|o| same_position(o, choice)) {
                Some(i) => {
                    votes.insert(voter.clone(), i);
                }
                None => warn!(voter = %voter, choice = %choice, "Ballot for an unknown option ignored"),
            }
        }
        votes
    }

    fn voting_step(&mut self, step: u32) -> (Vec<ProgressEvent>, Option<ResolutionResult>) {
        let options = self.voting_options();
        match step {
            0 => (
                vec![self.event(
                    "voting_prepared",
                    format!("{} options, {} voters", options.len(), self.context.participants.len()),
                )],
                None,
            ),
            1 => (vec![self.event("voting_in_progress", "collecting ballots")], None),
            _ => {
                let votes = self.cast_votes(&options);
                let mut counts = vec![0usize; options.len()];
                for &i in votes.values() {
                    counts[i] += 1;
                }
                let total = votes.len().max(1);
                let mut winner = 0;
                for (i, &count) in counts.iter().enumerate() {
                    if count > counts[winner] {
                        winner = i;
                    }
                }
                let Some(description) = options.get(winner).cloned() else {
                    return (
                        vec![self.event("voting_completed", "no options")],
                        Some(ResolutionResult::inconclusive(ResolutionStrategy::Voting, "no options to vote on")),
                    );
                };
                let share = counts[winner] as f64 / total as f64;
                let success = share >= VOTING_SUCCESS_SHARE;

                let mut satisfaction = BTreeMap::new();
                for participant in self.context.participants.iter().chain(votes.keys()) {
                    let happy = votes.get(participant) == Some(&winner);
                    satisfaction.insert(participant.clone(), if happy { 1.0 } else { 0.5 });
                }

                let result = ResolutionResult {
                    success,
                    strategy_used: ResolutionStrategy::Voting,
                    outcome_type: if share > VOTING_CONSENSUS_SHARE {
                        OutcomeType::Consensus
                    } else {
                        OutcomeType::Partial
                    },
                    new_consensus_points: if success { vec![description.clone()] } else { Vec::new() },
                    participant_satisfaction: satisfaction,
                    summary: format!("vote won by '{}' with {:.0}%", truncate(&description, 50), share * 100.0),
                    duration_minutes: 0,
                };
                (
                    vec![self.event("voting_completed", format!("share {share:.2}"))],
                    Some(result),
                )
            }
        }
    }

    // ── Mediation ───────────────────────────────────────────────────

    fn mediation_proposal(&self) -> String {
        let divergence = &self.context.divergence;
        match divergence.potential_resolutions().first() {
            Some(first) => first.clone(),
            None => format!("balanced view on: {}", truncate(&divergence.content, 100)),
        }
    }

    fn mediation_step(&mut self, step: u32) -> (Vec<ProgressEvent>, Option<ResolutionResult>) {
        match step {
            0 => (
                vec![self.event(
                    "mediation_started",
                    format!("{} parties", self.context.divergence.proponents().len()),
                )],
                None,
            ),
            1 => {
                let events = self
                    .context
                    .divergence
                    .proponents()
                    .iter()
                    .map(|p| self.event("hearing_party", format!("{}: {}", p.participant, p.position)))
                    .collect();
                (events, None)
            }
            2 => (vec![self.event("compromise_proposed", self.mediation_proposal())], None),
            _ => {
                let acceptance = unit(
                    self.context
                        .inputs
                        .acceptance_rate
                        .unwrap_or(self.config.default_acceptance_rate),
                );
                let success = acceptance >= ACCEPTANCE_SUCCESS;
                let proposal = self.mediation_proposal();
                let result = ResolutionResult {
                    success,
                    strategy_used: ResolutionStrategy::Mediation,
                    outcome_type: if success { OutcomeType::Consensus } else { OutcomeType::Partial },
                    new_consensus_points: if success { vec![proposal] } else { Vec::new() },
                    participant_satisfaction: self
                        .context
                        .participants
                        .iter()
                        .map(|p| (p.clone(), acceptance))
                        .collect(),
                    summary: format!("mediation acceptance {:.0}%", acceptance * 100.0),
                    duration_minutes: 0,
                };
                (
                    vec![self.event("feedback_collected", format!("acceptance {acceptance:.2}"))],
                    Some(result),
                )
            }
        }
    }

    // ── Compromise ──────────────────────────────────────────────────

    fn compromise_solution(&self) -> String {
        let elements: Vec<String> = self
            .context
            .divergence
            .proponents()
            .iter()
            .map(|p| truncate(&p.position, 30))
            .collect();
        format!("compromise combining {}", elements.join(" + "))
    }

    fn compromise_step(&mut self, step: u32) -> (Vec<ProgressEvent>, Option<ResolutionResult>) {
        match step {
            0 => (
                vec![self.event(
                    "demands_identified",
                    format!("{} parties", self.context.divergence.proponents().len()),
                )],
                None,
            ),
            1 => (vec![self.event("compromise_built", self.compromise_solution())], None),
            _ => {
                let acceptance: BTreeMap<String, f64> = self
                    .context
                    .divergence
                    .proponents()
                    .iter()
                    .map(|p| {
                        let flexibility = self
                            .context
                            .inputs
                            .flexibility
                            .get(&p.participant)
                            .copied()
                            .unwrap_or(self.config.default_flexibility);
                        (p.participant.clone(), unit(0.65 + unit(flexibility) * 0.2))
                    })
                    .collect();
                let average = if acceptance.is_empty() {
                    0.0
                } else {
                    acceptance.values().sum::<f64>() / acceptance.len() as f64
                };
                let success = average >= ACCEPTANCE_SUCCESS;
                let result = ResolutionResult {
                    success,
                    strategy_used: ResolutionStrategy::Compromise,
                    outcome_type: if average > COMPROMISE_CONSENSUS {
                        OutcomeType::Consensus
                    } else {
                        OutcomeType::Partial
                    },
                    new_consensus_points: if success { vec![self.compromise_solution()] } else { Vec::new() },
                    participant_satisfaction: acceptance,
                    summary: format!("compromise average acceptance {:.0}%", average * 100.0),
                    duration_minutes: 0,
                };
                (
                    vec![self.event("acceptance_confirmed", format!("average {average:.2}"))],
                    Some(result),
                )
            }
        }
    }

    // ── Data-driven ─────────────────────────────────────────────────

    fn evidence_scores(&self) -> Vec<(String, String, f64)> {
        self.context
            .divergence
            .proponents()
            .iter()
            .map(|p| {
                let score = self
                    .context
                    .inputs
                    .evidence_scores
                    .get(&p.participant)
                    .copied()
                    .unwrap_or(self.config.default_evidence_score);
                (p.participant.clone(), p.position.clone(), unit(score))
            })
            .collect()
    }

    fn data_driven_step(&mut self, step: u32) -> (Vec<ProgressEvent>, Option<ResolutionResult>) {
        match step {
            0 => (vec![self.event("data_collection", "gathering evidence")], None),
            1 => {
                let scored = self.evidence_scores();
                (
                    vec![self.event("evidence_analyzed", format!("{} positions scored", scored.len()))],
                    None,
                )
            }
            _ => {
                let scored = self.evidence_scores();
                let mut best: Option<&(String, String, f64)> = None;
                for entry in &scored {
                    if best.map_or(true, |b| entry.2 > b.2) {
                        best = Some(entry);
                    }
                }
                let Some((party, position, score)) = best.cloned() else {
                    return (
                        vec![self.event("conclusion_formed", "no positions")],
                        Some(ResolutionResult::inconclusive(ResolutionStrategy::DataDriven, "no positions to assess")),
                    );
                };
                let success = score >= EVIDENCE_SUCCESS;
                let result = ResolutionResult {
                    success,
                    strategy_used: ResolutionStrategy::DataDriven,
                    outcome_type: if success { OutcomeType::Consensus } else { OutcomeType::Partial },
                    new_consensus_points: if success { vec![position] } else { Vec::new() },
                    participant_satisfaction: scored.iter().map(|(p, _, s)| (p.clone(), *s)).collect(),
                    summary: format!("best supported position from {party} ({score:.2})"),
                    duration_minutes: 0,
                };
                (vec![self.event("conclusion_formed", party)], Some(result))
            }
        }
    }
}

fn same_position(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::ArgumentSubmission;
    use crate::points::Category;
    use crate::resolution::ResolutionInputs;

    fn divergence(positions: &[(&str, &str)]) -> DivergencePoint {
        let props: Vec<(String, String)> = positions
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        DivergencePoint::new("pick a cache", Category::Technical, &props, 0)
    }

    fn run(executor: StrategyExecutor, div: &DivergencePoint, inputs: ResolutionInputs) -> (Vec<ProgressEvent>, ResolutionResult) {
        let ctx = ResolutionContext::new("divergence_0", div, &[]).with_inputs(inputs);
        executor
            .start(ctx, &ExecutorConfig::default(), &DebateRules::default())
            .run_to_completion()
    }

    #[test]
    fn test_strategy_mapping() {
        for executor in StrategyExecutor::ALL {
            assert_eq!(StrategyExecutor::for_strategy(executor.strategy()), Some(executor));
        }
        assert_eq!(StrategyExecutor::for_strategy(ResolutionStrategy::ExpertReview), None);
    }

    #[test]
    fn test_can_handle() {
        let two = divergence(&[("A", "redis"), ("B", "memcached")]);
        assert!(!StrategyExecutor::Voting.can_handle(&two));
        assert!(!StrategyExecutor::DataDriven.can_handle(&two));

        let three = divergence(&[("A", "redis"), ("B", "memcached"), ("C", "none")]);
        assert!(StrategyExecutor::Voting.can_handle(&three));
        assert!(StrategyExecutor::Debate.can_handle(&three) == (three.intensity() >= 0.5));

        let mut talked = two.clone();
        talked.add_discussion("latency numbers", "A");
        talked.add_discussion("cost numbers", "B");
        assert!(StrategyExecutor::DataDriven.can_handle(&talked));
    }

    #[test]
    fn test_debate_duration_estimate() {
        let div = divergence(&[("A", "redis"), ("B", "memcached"), ("C", "none")]);
        let ctx = ResolutionContext::new("divergence_0", &div, &[]);
        let expected = (20 + 15 + (div.intensity() * 10.0) as u32).min(60);
        assert_eq!(StrategyExecutor::Debate.estimate_duration(&ctx), expected);
        assert_eq!(StrategyExecutor::Voting.estimate_duration(&ctx), 10);
    }

    #[test]
    fn test_voting_own_positions_split() {
        let div = divergence(&[("A", "redis"), ("B", "memcached"), ("C", "none")]);
        let (events, result) = run(StrategyExecutor::Voting, &div, ResolutionInputs::default());
        assert_eq!(events.len(), 3);
        assert!(!result.success);
        assert_eq!(result.duration_minutes, 10);
    }

    #[test]
    fn test_voting_with_ballots() {
        let div = divergence(&[("A", "redis"), ("B", "memcached"), ("C", "none")]);
        let mut inputs = ResolutionInputs::default();
        inputs.ballots.insert("B".into(), "Redis".into());
        inputs.ballots.insert("C".into(), "redis".into());
        let (_, result) = run(StrategyExecutor::Voting, &div, inputs);
        assert!(result.success);
        assert_eq!(result.outcome_type, OutcomeType::Consensus);
        assert_eq!(result.new_consensus_points, vec!["redis"]);
        assert_eq!(result.participant_satisfaction["A"], 1.0);
    }

    #[test]
    fn test_mediation_default_and_override() {
        let mut div = divergence(&[("A", "redis"), ("B", "memcached")]);
        div.add_potential_resolution("redis with a memcached fallback");
        let (_, result) = run(StrategyExecutor::Mediation, &div, ResolutionInputs::default());
        assert!(result.success);
        assert_eq!(result.new_consensus_points, vec!["redis with a memcached fallback"]);

        let inputs = ResolutionInputs {
            acceptance_rate: Some(0.3),
            ..Default::default()
        };
        let (_, result) = run(StrategyExecutor::Mediation, &div, inputs);
        assert!(!result.success);
        assert_eq!(result.outcome_type, OutcomeType::Partial);
    }

    #[test]
    fn test_compromise_acceptance() {
        let div = divergence(&[("A", "redis"), ("B", "memcached")]);
        let (_, result) = run(StrategyExecutor::Compromise, &div, ResolutionInputs::default());
        // 0.65 + 0.5 * 0.2
        assert!((result.participant_satisfaction["A"] - 0.75).abs() < 1e-12);
        assert!(result.success);
        assert_eq!(result.outcome_type, OutcomeType::Consensus);
        assert!(result.new_consensus_points[0].contains("redis + memcached"));
    }

    #[test]
    fn test_data_driven_needs_strong_evidence() {
        let div = divergence(&[("A", "redis"), ("B", "memcached")]);
        let (_, result) = run(StrategyExecutor::DataDriven, &div, ResolutionInputs::default());
        assert!(!result.success);

        let mut inputs = ResolutionInputs::default();
        inputs.evidence_scores.insert("B".into(), 0.9);
        let (_, result) = run(StrategyExecutor::DataDriven, &div, inputs);
        assert!(result.success);
        assert_eq!(result.new_consensus_points, vec!["memcached"]);
    }

    #[test]
    fn test_debate_without_arguments_is_inconclusive() {
        let div = divergence(&[("A", "redis"), ("B", "memcached")]);
        let (events, result) = run(StrategyExecutor::Debate, &div, ResolutionInputs::default());
        assert!(!result.success);
        assert_eq!(result.outcome_type, OutcomeType::Partial);
        assert_eq!(events.first().map(|e| e.step.as_str()), Some("debate_started"));
        assert_eq!(events.last().map(|e| e.step.as_str()), Some("debate_ended"));
    }

    #[test]
    fn test_debate_with_scripted_arguments() {
        let div = divergence(&[("A", "redis"), ("B", "memcached")]);
        let inputs = ResolutionInputs {
            arguments: vec![
                ArgumentSubmission::new("A", "redis has persistence").with_evidence(&["docs"]),
                ArgumentSubmission::new("A", "redis has richer types").with_evidence(&["docs"]),
                ArgumentSubmission::new("Z", "unknown speaker"),
            ],
            ..Default::default()
        };
        let (events, result) = run(StrategyExecutor::Debate, &div, inputs);
        assert!(result.success);
        assert_eq!(result.new_consensus_points[0], "redis");
        assert!(events.iter().any(|e| e.step == "argument_rejected"));
    }

    #[test]
    fn test_debate_rejects_single_participant() {
        let div = divergence(&[("A", "redis")]);
        let (_, result) = run(StrategyExecutor::Debate, &div, ResolutionInputs::default());
        assert!(!result.success);
        assert!(result.summary.contains("at least 2"));
    }

    #[test]
    fn test_advance_after_finish_is_empty() {
        let div = divergence(&[("A", "redis"), ("B", "memcached")]);
        let ctx = ResolutionContext::new("divergence_0", &div, &[]);
        let mut run = StrategyExecutor::Voting.start(ctx, &ExecutorConfig::default(), &DebateRules::default());
        run.run_to_completion();
        assert!(run.is_finished());
        let (events, result) = run.advance();
        assert!(events.is_empty());
        assert!(result.is_none());
    }
}

//! Tracker: the per-round facade over every scoring and resolution
//! component.
//!
//! The tracker owns all consensus and divergence points by value. Every
//! other component refers to them by stable id (`consensus_{index}`,
//! `divergence_{index}`), so the whole state can be exported between calls.
//!
//! ```text
//! add_consensus / add_divergence / update_support     (round inputs)
//!         │
//!         ▼
//! set_current_round ──► calculate_overall_consensus ──► ConsensusReport
//!         │
//!         ▼
//! check_and_handle_conflicts ──► TriggerManager ──► ResolutionOrchestrator
//!                                                      │
//!                                 ResolutionEvent ◄────┘
//! ```

pub mod plan;
pub mod report;
pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{AggregationStrategy, ConsensusAggregator};
use crate::config::EngineConfig;
use crate::conflict::{ConflictAlert, TriggerManager, TriggerStatistics};
use crate::decay::AdaptiveDecayModel;
use crate::dependency::{DependencyEdge, DependencyGraph, DependencyType, HierarchyLevel};
use crate::error::SnapshotResult;
use crate::points::{
    consensus_id, consensus_index, divergence_id, divergence_index, unit, Category,
    CategoryWeights, ConsensusPoint, DivergencePoint, Priority, PriorityWeights,
    ResolutionStrategy, SeverityWeights,
};
use crate::resolution::{
    OrchestratorStatistics, ResolutionEvent, ResolutionInputs, ResolutionOrchestrator,
    ResolutionResult, StepOutcome, StrategyExecutor,
};
use crate::weights::{AuthorityUpdate, DiscussionPhase, WeightCalculator};

pub use plan::{recommend_strategy, ResolutionPlan};
pub use report::{
    CategoryBreakdown, ConsensusReport, ConsensusStatus, ConsensusTrend, DebateRequirement,
    DivergenceSummary, FullReport, HierarchyAnalysis, HistoryEntry, MultiDimensionScores,
    PointSummary, Trajectory, TrajectoryDirection,
};
pub use snapshot::{TrackerSnapshot, SNAPSHOT_VERSION};

use report::{analysis_text, convergence, mean, momentum, stability_score};

/// Per-point stability history cap.
const STABILITY_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Expected number of participants; denominator for breadth and participation.
    pub total_participants: usize,
    /// Expected discussion length, used for phase detection.
    pub total_rounds_estimate: u32,
    /// Category weights for importance and divergence penalty.
    pub importance_weights: CategoryWeights,
    pub priority_weights: PriorityWeights,
    pub severity_weights: SeverityWeights,
    /// Category weights of the hierarchy analysis.
    pub hierarchy_weights: CategoryWeights,
    pub divergence_penalty_factor: f64,
    /// Upper bound on steps when a session is driven to completion.
    pub max_resolution_steps: usize,
    /// Starting strength of consensus points produced by a resolution.
    pub resolution_seed_strength: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            total_participants: 5,
            total_rounds_estimate: 10,
            importance_weights: CategoryWeights::new(1.0, 0.85, 0.6, 0.75, 0.5, 0.35),
            priority_weights: PriorityWeights::new(1.0, 0.8, 0.6, 0.4),
            severity_weights: SeverityWeights::new(1.0, 0.75, 0.5, 0.25),
            hierarchy_weights: CategoryWeights::new(0.30, 0.25, 0.20, 0.12, 0.08, 0.05),
            divergence_penalty_factor: 0.35,
            max_resolution_steps: 128,
            resolution_seed_strength: 0.6,
        }
    }
}

/// A new consensus point as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusInput {
    pub content: String,
    pub category: Category,
    #[serde(default)]
    pub supporters: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Starting strength in place of the derived one.
    #[serde(default)]
    pub seed_strength: Option<f64>,
}

impl ConsensusInput {
    pub fn new(content: &str, category: Category, supporters: &[String]) -> Self {
        Self {
            content: content.to_string(),
            category,
            supporters: supporters.to_vec(),
            evidence: Vec::new(),
            priority: None,
            keywords: Vec::new(),
            seed_strength: None,
        }
    }

    pub fn with_evidence(mut self, evidence: &[String]) -> Self {
        self.evidence = evidence.to_vec();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_keywords(mut self, keywords: &[String]) -> Self {
        self.keywords = keywords.to_vec();
        self
    }

    pub fn with_seed_strength(mut self, strength: f64) -> Self {
        self.seed_strength = Some(strength);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportAction {
    Add,
    Remove,
}

/// Conflict handling overview returned by `Tracker::conflict_resolution_status`.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictResolutionStatus {
    pub triggers: TriggerStatistics,
    pub sessions: OrchestratorStatistics,
    /// Most urgent unresolved alerts.
    pub priority_conflicts: Vec<ConflictAlert>,
    pub active_sessions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    config: TrackerConfig,
    consensus_points: Vec<ConsensusPoint>,
    divergence_points: Vec<DivergencePoint>,
    current_round: u32,
    topic_keywords: BTreeSet<String>,
    consensus_history: Vec<HistoryEntry>,
    /// consensus id -> strength at each round boundary.
    stability: BTreeMap<String, Vec<f64>>,
    decay: AdaptiveDecayModel,
    dependencies: DependencyGraph,
    weights: WeightCalculator,
    aggregator: ConsensusAggregator,
    triggers: TriggerManager,
    orchestrator: ResolutionOrchestrator,
    resolution_inputs: BTreeMap<String, ResolutionInputs>,
    plans: Vec<ResolutionPlan>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::with_config(&EngineConfig::default())
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_config(&EngineConfig {
            tracker: config,
            ..EngineConfig::default()
        })
    }

    /// Build a tracker with every component configured from `config`.
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            config: config.tracker.clone(),
            consensus_points: Vec::new(),
            divergence_points: Vec::new(),
            current_round: 0,
            topic_keywords: BTreeSet::new(),
            consensus_history: Vec::new(),
            stability: BTreeMap::new(),
            decay: AdaptiveDecayModel::new(config.decay.clone()),
            dependencies: DependencyGraph::new(),
            weights: WeightCalculator::new(config.weights.clone()),
            aggregator: ConsensusAggregator::new(config.aggregation.clone()),
            triggers: TriggerManager::new(config.conflict.clone()),
            orchestrator: ResolutionOrchestrator::new(config.executors.clone(), config.debate.clone()),
            resolution_inputs: BTreeMap::new(),
            plans: Vec::new(),
        }
    }

    // ── Accessors ──

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn consensus_points(&self) -> &[ConsensusPoint] {
        &self.consensus_points
    }

    pub fn divergence_points(&self) -> &[DivergencePoint] {
        &self.divergence_points
    }

    pub fn consensus(&self, id: &str) -> Option<&ConsensusPoint> {
        self.consensus_position(id).map(|i| &self.consensus_points[i])
    }

    pub fn divergence(&self, id: &str) -> Option<&DivergencePoint> {
        self.divergence_position(id).map(|i| &self.divergence_points[i])
    }

    pub fn consensus_history(&self) -> &[HistoryEntry] {
        &self.consensus_history
    }

    pub fn stability_history(&self, consensus_id: &str) -> &[f64] {
        self.stability.get(consensus_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn decay_model(&self) -> &AdaptiveDecayModel {
        &self.decay
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub fn weights(&self) -> &WeightCalculator {
        &self.weights
    }

    pub fn aggregator(&self) -> &ConsensusAggregator {
        &self.aggregator
    }

    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    pub fn orchestrator(&self) -> &ResolutionOrchestrator {
        &self.orchestrator
    }

    pub fn plans(&self) -> &[ResolutionPlan] {
        &self.plans
    }

    fn consensus_position(&self, id: &str) -> Option<usize> {
        consensus_index(id).filter(|&i| i < self.consensus_points.len())
    }

    fn divergence_position(&self, id: &str) -> Option<usize> {
        divergence_index(id).filter(|&i| i < self.divergence_points.len())
    }

    fn consensus_mut(&mut self, id: &str) -> Option<&mut ConsensusPoint> {
        let index = self.consensus_position(id)?;
        self.consensus_points.get_mut(index)
    }

    fn divergence_mut(&mut self, id: &str) -> Option<&mut DivergencePoint> {
        let index = self.divergence_position(id)?;
        self.divergence_points.get_mut(index)
    }

    // ── Round inputs ──

    pub fn add_consensus(&mut self, content: &str, category: Category, supporters: &[String]) -> String {
        self.add_consensus_with(ConsensusInput::new(content, category, supporters))
    }

    /// Add a consensus point created in the current round. Returns its id.
    pub fn add_consensus_with(&mut self, input: ConsensusInput) -> String {
        let id = consensus_id(self.consensus_points.len());
        let priority = input.priority.unwrap_or_default();
        let point = ConsensusPoint::new(
            &input.content,
            input.category,
            &input.supporters,
            self.current_round,
        )
        .with_evidence(&input.evidence)
        .with_priority(priority)
        .with_keywords(&input.keywords);
        let importance = self.config.importance_weights.get(input.category) * 0.4
            + self.config.priority_weights.get(priority) * 0.35
            + (point.supporters().len() as f64 / 5.0).min(1.0) * 0.25;
        let mut point = point.with_importance(importance);
        if let Some(seed) = input.seed_strength {
            point = point.with_seed_strength(seed);
        }

        self.dependencies
            .set_hierarchy_level(&id, HierarchyLevel::from_category(input.category));

        let words = content_words(&input.content);
        for divergence in &mut self.divergence_points {
            if content_words(&divergence.content).intersection(&words).count() >= 2 {
                divergence.link_consensus(&id);
            }
        }

        info!(
            consensus_id = %id,
            category = %input.category,
            supporters = point.supporters().len(),
            strength = point.strength(),
            "Consensus point added"
        );
        self.consensus_points.push(point);
        id
    }

    /// Add a divergence created in the current round. Returns its id.
    pub fn add_divergence(
        &mut self,
        content: &str,
        category: Category,
        proponents: &[(String, String)],
    ) -> String {
        let id = divergence_id(self.divergence_points.len());
        let mut point = DivergencePoint::new(content, category, proponents, self.current_round);
        if let Some(reason) = debate_reason(&point) {
            point.mark_for_debate("system", reason);
            debug!(divergence_id = %id, reason, "Divergence marked for debate");
        }
        info!(
            divergence_id = %id,
            category = %category,
            intensity = point.intensity(),
            severity = %point.severity(),
            "Divergence point added"
        );
        self.divergence_points.push(point);
        id
    }

    pub fn update_support(&mut self, consensus_id: &str, participant: &str, action: SupportAction) -> bool {
        let round = self.current_round;
        let Some(point) = self.consensus_mut(consensus_id) else {
            return false;
        };
        match action {
            SupportAction::Add => point.add_supporter(participant, round),
            SupportAction::Remove => point.remove_supporter(participant),
        }
    }

    pub fn add_evidence(&mut self, consensus_id: &str, evidence: &str) -> bool {
        let round = self.current_round;
        self.consensus_mut(consensus_id)
            .is_some_and(|p| p.add_evidence(evidence, round))
    }

    pub fn verify_consensus(&mut self, consensus_id: &str) -> bool {
        let round = self.current_round;
        match self.consensus_mut(consensus_id) {
            Some(point) => {
                point.verify(round);
                true
            }
            None => false,
        }
    }

    pub fn add_proponent(&mut self, divergence_id: &str, participant: &str, position: &str) -> bool {
        self.divergence_mut(divergence_id)
            .is_some_and(|d| d.add_proponent(participant, position))
    }

    pub fn update_position(&mut self, divergence_id: &str, participant: &str, position: &str) -> bool {
        self.divergence_mut(divergence_id)
            .is_some_and(|d| d.update_position(participant, position))
    }

    pub fn add_discussion(&mut self, divergence_id: &str, content: &str, speaker: &str) -> bool {
        match self.divergence_mut(divergence_id) {
            Some(divergence) => {
                divergence.add_discussion(content, speaker);
                true
            }
            None => false,
        }
    }

    /// Advance the round counter and snapshot every point's strength into
    /// its stability history.
    pub fn set_current_round(&mut self, round: u32) {
        if round < self.current_round {
            warn!(round, current = self.current_round, "Round number moved backwards");
        }
        self.current_round = round;
        for (i, point) in self.consensus_points.iter().enumerate() {
            let history = self.stability.entry(consensus_id(i)).or_default();
            history.push(point.strength());
            if history.len() > STABILITY_HISTORY_LIMIT {
                history.remove(0);
            }
        }
        debug!(round, points = self.consensus_points.len(), "Round advanced");
    }

    /// Set the round and append a consensus history row for it.
    pub fn record_discussion_round(&mut self, round: u32) -> ConsensusReport {
        self.set_current_round(round);
        self.calculate_overall_consensus()
    }

    pub fn set_total_rounds_estimate(&mut self, rounds: u32) {
        self.config.total_rounds_estimate = rounds.max(1);
    }

    pub fn set_topic_keywords(&mut self, keywords: &[String]) {
        self.topic_keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
    }

    // ── Structure and authority ──

    /// Add a dependency between two known points. Unknown ids, self-loops
    /// and cycles are rejected.
    pub fn add_consensus_dependency(
        &mut self,
        parent: &str,
        child: &str,
        kind: DependencyType,
        strength: f64,
        evidence: &str,
    ) -> bool {
        if self.consensus_position(parent).is_none() || self.consensus_position(child).is_none() {
            return false;
        }
        self.dependencies
            .add_dependency(parent, child, DependencyEdge::new(kind, strength, evidence))
    }

    pub fn set_hierarchy_level(&mut self, consensus_id: &str, level: HierarchyLevel) -> bool {
        if self.consensus_position(consensus_id).is_none() {
            return false;
        }
        self.dependencies.set_hierarchy_level(consensus_id, level);
        true
    }

    pub fn update_expert_authority(&mut self, participant: &str, update: &AuthorityUpdate) {
        self.weights.update_expert_authority(participant, update);
    }

    pub fn record_expert_contribution(&mut self, participant: &str, quality: f64, led_to_consensus: bool) {
        self.weights
            .record_contribution(participant, quality, led_to_consensus);
    }

    // ── Scoring ──

    /// Compute the consensus report for the current round and append the
    /// level to the consensus history.
    pub fn calculate_overall_consensus(&mut self) -> ConsensusReport {
        let round = self.current_round;
        let previous = self
            .consensus_history
            .last()
            .map_or(0.0, |h| h.overall_level);
        let phase = DiscussionPhase::detect(round, self.config.total_rounds_estimate, previous);
        let strategy = self.aggregator.select_strategy(phase);

        if self.consensus_points.is_empty() && self.divergence_points.is_empty() {
            debug!(round, "Nothing to aggregate");
            return self.empty_report(phase, strategy);
        }

        let strengths: BTreeMap<String, f64> = self
            .consensus_points
            .iter()
            .enumerate()
            .map(|(i, p)| (consensus_id(i), p.strength()))
            .collect();

        let mut scores = BTreeMap::new();
        for (i, point) in self.consensus_points.iter().enumerate() {
            let id = consensus_id(i);
            let decay = self.decay.calculate(&id, point, round);
            let cascading = self.dependencies.calculate_cascading_strength(&id, &strengths);
            let weight = self.weights.combined_weight(point, phase, &self.topic_keywords);
            scores.insert(id, unit(point.strength() * decay * cascading * weight));
        }

        let pairs: Vec<(String, &ConsensusPoint)> = self
            .consensus_points
            .iter()
            .enumerate()
            .map(|(i, p)| (consensus_id(i), p))
            .collect();
        self.aggregator.compute_all_correlations(&pairs);
        let outcome = self.aggregator.aggregate(&scores, strategy);

        let (penalty, weighted_intensity) = self.divergence_penalty();
        let overall = unit(outcome.value - penalty);

        let levels: Vec<f64> = self.consensus_history.iter().map(|h| h.overall_level).collect();
        let momentum = momentum(&levels);
        self.consensus_history.push(HistoryEntry {
            round,
            overall_level: overall,
            phase,
            strategy,
            consensus_count: self.consensus_points.len(),
            divergence_count: self.divergence_points.len(),
            timestamp: Utc::now(),
        });

        let detailed_hierarchy = self.detailed_hierarchy();
        let hierarchy_analysis = self.hierarchy_analysis(&detailed_hierarchy);
        let strength_values: Vec<f64> = strengths.values().copied().collect();
        let convergence = convergence(&strength_values);
        let breadth = self.breadth();
        let stability = mean(
            &self
                .consensus_points
                .iter()
                .enumerate()
                .map(|(i, p)| stability_score(p.strength(), self.stability_history(&consensus_id(i))))
                .collect::<Vec<_>>(),
        );

        info!(
            round,
            phase = %phase,
            strategy = %strategy,
            overall,
            penalty,
            "Consensus calculated"
        );

        ConsensusReport {
            overall_level: overall,
            consensus_count: self.consensus_points.len(),
            divergence_count: self.divergence_points.len(),
            round,
            discussion_phase: phase,
            aggregation_strategy: strategy,
            multi_dimension_scores: MultiDimensionScores {
                strength: (hierarchy_analysis.contribution() + convergence * 0.1 + breadth * 0.1)
                    .min(1.0),
                convergence,
                breadth,
                stability,
                aggregated: outcome.value,
            },
            analysis: analysis_text(overall, &hierarchy_analysis, penalty, momentum),
            hierarchy_analysis,
            divergence_penalty: penalty,
            weighted_divergence_intensity: weighted_intensity,
            momentum,
            trajectory: Trajectory::predict(overall, momentum),
            detailed_hierarchy,
            hierarchy_dependency_summary: self.dependencies.hierarchy_summary(),
            decay_statistics: self.decay.statistics(),
            correlation_statistics: self.aggregator.statistics(),
            point_contributions: outcome.contributions,
            debate_required: self.debate_required(),
            consensus_trend: ConsensusTrend::from_strengths(&self.strengths_in_order()),
            confidence_level: self.confidence_level(),
        }
    }

    fn empty_report(&self, phase: DiscussionPhase, strategy: AggregationStrategy) -> ConsensusReport {
        ConsensusReport {
            overall_level: 0.0,
            consensus_count: 0,
            divergence_count: 0,
            round: self.current_round,
            discussion_phase: phase,
            aggregation_strategy: strategy,
            hierarchy_analysis: HierarchyAnalysis::default(),
            divergence_penalty: 0.0,
            weighted_divergence_intensity: 0.0,
            multi_dimension_scores: MultiDimensionScores::default(),
            momentum: 0.0,
            trajectory: Trajectory::predict(0.0, 0.0),
            detailed_hierarchy: BTreeMap::new(),
            hierarchy_dependency_summary: BTreeMap::new(),
            decay_statistics: self.decay.statistics(),
            correlation_statistics: self.aggregator.statistics(),
            point_contributions: BTreeMap::new(),
            debate_required: Vec::new(),
            analysis: "no consensus or divergence data".to_string(),
            consensus_trend: ConsensusTrend::Stable,
            confidence_level: 0.0,
        }
    }

    /// `(penalty, weighted intensity)` from open divergences.
    fn divergence_penalty(&self) -> (f64, f64) {
        let (weighted, total) = self
            .divergence_points
            .iter()
            .fold((0.0, 0.0), |(weighted, total), d| {
                let w = self.config.severity_weights.get(d.severity())
                    * self.config.importance_weights.get(d.category);
                (weighted + d.intensity() * w, total + w)
            });
        if total <= 0.0 {
            return (0.0, 0.0);
        }
        let intensity = weighted / total;
        (unit(intensity * self.config.divergence_penalty_factor), intensity)
    }

    fn detailed_hierarchy(&self) -> BTreeMap<Category, CategoryBreakdown> {
        let round = self.current_round;
        let mut breakdown = BTreeMap::new();
        for category in Category::ALL {
            let members: Vec<(usize, &ConsensusPoint)> = self
                .consensus_points
                .iter()
                .enumerate()
                .filter(|(_, p)| p.category == category)
                .collect();
            if members.is_empty() {
                continue;
            }
            let raw: Vec<f64> = members.iter().map(|(_, p)| p.strength()).collect();
            let decayed: Vec<f64> = members
                .iter()
                .map(|(_, p)| self.decay.decayed_strength(p, self.decay.factor(p, round)))
                .collect();
            let stability: Vec<f64> = members
                .iter()
                .map(|(i, p)| stability_score(p.strength(), self.stability_history(&consensus_id(*i))))
                .collect();
            let supporters: BTreeSet<&String> =
                members.iter().flat_map(|(_, p)| p.supporters()).collect();
            breakdown.insert(
                category,
                CategoryBreakdown {
                    raw_average: mean(&raw),
                    decayed_average: mean(&decayed),
                    stability_average: mean(&stability),
                    point_count: members.len(),
                    strong_points: raw.iter().filter(|s| **s > 0.7).count(),
                    weak_points: raw.iter().filter(|s| **s < 0.4).count(),
                    total_supporters: supporters.len(),
                },
            );
        }
        breakdown
    }

    fn hierarchy_analysis(&self, detailed: &BTreeMap<Category, CategoryBreakdown>) -> HierarchyAnalysis {
        let w = &self.config.hierarchy_weights;
        let level = |category: Category| {
            detailed
                .get(&category)
                .map_or(0.0, |b| b.decayed_average * w.get(category))
        };
        HierarchyAnalysis {
            core_level: level(Category::Core),
            strategic_level: level(Category::Strategic),
            tactical_level: level(Category::Tactical),
            technical_level: level(Category::Technical),
            secondary_level: level(Category::Procedural) + level(Category::Auxiliary),
        }
    }

    /// Unique participants seen in any point over the expected head count.
    fn breadth(&self) -> f64 {
        if self.config.total_participants == 0 {
            return 0.0;
        }
        let mut participants: BTreeSet<String> = self
            .consensus_points
            .iter()
            .flat_map(|p| p.supporters().iter().cloned())
            .collect();
        for divergence in &self.divergence_points {
            participants.extend(divergence.participants());
        }
        unit(participants.len() as f64 / self.config.total_participants as f64)
    }

    fn confidence_level(&self) -> f64 {
        if self.consensus_points.is_empty() {
            return 0.0;
        }
        let n = self.consensus_points.len() as f64;
        let total = self.config.total_participants.max(1) as f64;
        let participation = self
            .consensus_points
            .iter()
            .map(|p| (p.supporters().len() as f64 / total).min(1.0))
            .sum::<f64>()
            / n;
        let evidence = self
            .consensus_points
            .iter()
            .map(|p| p.evidence().len() as f64)
            .sum::<f64>()
            / n;
        let stable = (0..self.consensus_points.len())
            .filter(|i| self.stability_history(&consensus_id(*i)).len() >= 3)
            .count() as f64
            / n;
        unit(participation * 0.4 + (evidence / 3.0).min(1.0) * 0.3 + stable * 0.3)
    }

    fn strengths_in_order(&self) -> Vec<f64> {
        self.consensus_points.iter().map(ConsensusPoint::strength).collect()
    }

    fn debate_required(&self) -> Vec<DebateRequirement> {
        self.divergence_points
            .iter()
            .enumerate()
            .filter(|(_, d)| d.requires_debate() || d.severity().is_high_or_worse())
            .map(|(i, d)| DebateRequirement {
                divergence_id: divergence_id(i),
                content: d.content.clone(),
                category: d.category,
                severity: d.severity(),
                intensity: d.intensity(),
                opposing_pairs: d.opposing_pairs().len(),
                participants: d.participants(),
                suggested_strategy: recommend_strategy(d),
                priority: if d.severity() == crate::points::Severity::Critical {
                    Priority::High
                } else {
                    Priority::Medium
                },
            })
            .collect()
    }

    // ── Conflict handling ──

    /// Detect conflicts for `round`, start a session for every alert that
    /// qualifies and drive each session to a terminal state.
    pub fn check_and_handle_conflicts(&mut self, round: u32) -> Vec<ResolutionEvent> {
        let alerts = self.triggers.check_and_trigger(&self.divergence_points, round);
        if alerts.is_empty() {
            return Vec::new();
        }

        let mut events = vec![ResolutionEvent::ConflictsDetected {
            round,
            alert_ids: alerts.iter().map(|a| a.id.clone()).collect(),
        }];
        for alert in alerts {
            self.triggers.acknowledge_alert(&alert.id);
            events.push(ResolutionEvent::ConflictAcknowledged {
                alert_id: alert.id.clone(),
                divergence_id: alert.divergence_id.clone(),
                strategy: alert.recommended_strategy,
            });

            let strategy = match self.divergence(&alert.divergence_id) {
                Some(divergence) if StrategyExecutor::for_strategy(alert.recommended_strategy).is_none() => {
                    let fallback = self.orchestrator.select_best_strategy(divergence);
                    debug!(
                        alert_id = %alert.id,
                        recommended = %alert.recommended_strategy,
                        fallback = %fallback,
                        "Recommended strategy has no executor"
                    );
                    fallback
                }
                _ => alert.recommended_strategy,
            };
            let session_id = self.orchestrator.start_resolution(
                &alert.divergence_id,
                strategy,
                &alert.participants,
                Some(&alert.id),
            );
            self.triggers.start_resolution(&alert.id);
            events.push(ResolutionEvent::ResolutionStarted {
                session_id: session_id.clone(),
                divergence_id: alert.divergence_id.clone(),
                strategy,
            });

            let mut running = true;
            for _ in 0..self.config.max_resolution_steps {
                let (step_events, more) = self.step_session(&session_id);
                events.extend(step_events);
                if !more {
                    running = false;
                    break;
                }
            }
            if running {
                warn!(session_id = %session_id, "Resolution session did not finish within the step limit");
            }
        }
        events
    }

    /// Manually start a resolution session. The strategy defaults to the
    /// orchestrator's choice. Advance it with [`Tracker::advance_resolution`].
    pub fn start_conflict_resolution(
        &mut self,
        divergence_id: &str,
        strategy: Option<ResolutionStrategy>,
    ) -> Option<String> {
        let index = self.divergence_position(divergence_id)?;
        let divergence = &self.divergence_points[index];
        let strategy = strategy.unwrap_or_else(|| self.orchestrator.select_best_strategy(divergence));
        let participants = divergence.participants();
        Some(
            self.orchestrator
                .start_resolution(divergence_id, strategy, &participants, None),
        )
    }

    /// Perform one step of a session.
    pub fn advance_resolution(&mut self, session_id: &str) -> Vec<ResolutionEvent> {
        self.step_session(session_id).0
    }

    pub fn pause_resolution(&mut self, session_id: &str) -> bool {
        self.orchestrator.pause(session_id)
    }

    pub fn resume_resolution(&mut self, session_id: &str) -> bool {
        self.orchestrator.resume(session_id)
    }

    /// Caller-provided executor inputs for a divergence.
    pub fn set_resolution_inputs(&mut self, divergence_id: &str, inputs: ResolutionInputs) -> bool {
        if self.divergence_position(divergence_id).is_none() {
            return false;
        }
        self.resolution_inputs.insert(divergence_id.to_string(), inputs);
        true
    }

    /// One session step. The flag is `true` while the session should keep
    /// being driven.
    fn step_session(&mut self, session_id: &str) -> (Vec<ResolutionEvent>, bool) {
        let Some(session) = self.orchestrator.session(session_id) else {
            return (Vec::new(), false);
        };
        if session.is_finished() {
            return (Vec::new(), false);
        }
        let divergence_id = session.divergence_id.clone();
        let alert_id = session.alert_id.clone();
        let Some(index) = self.divergence_position(&divergence_id) else {
            warn!(session_id, divergence_id = %divergence_id, "Session targets an unknown divergence");
            return (Vec::new(), false);
        };

        let Some(step) = self.orchestrator.advance_session(
            session_id,
            &self.divergence_points[index],
            self.resolution_inputs.get(&divergence_id),
        ) else {
            return (Vec::new(), false);
        };

        let mut events: Vec<ResolutionEvent> = step
            .events
            .into_iter()
            .map(|event| ResolutionEvent::Progress {
                session_id: session_id.to_string(),
                event,
            })
            .collect();

        let more = match step.outcome {
            StepOutcome::Running => true,
            StepOutcome::Paused => false,
            StepOutcome::Escalated { from, to, .. } => {
                events.push(ResolutionEvent::ResolutionEscalated {
                    session_id: session_id.to_string(),
                    from,
                    to,
                });
                true
            }
            StepOutcome::Succeeded { result } => {
                let new_consensus_ids = self.apply_resolution(index, &result);
                if let Some(alert_id) = &alert_id {
                    self.triggers.complete_resolution(alert_id, true);
                }
                info!(
                    session_id,
                    divergence_id = %divergence_id,
                    strategy = %result.strategy_used,
                    new_points = new_consensus_ids.len(),
                    "Divergence resolved"
                );
                events.push(ResolutionEvent::ResolutionCompleted {
                    session_id: session_id.to_string(),
                    divergence_id,
                    outcome: result.outcome_type,
                    new_consensus_ids,
                    timestamp: Utc::now(),
                });
                false
            }
            StepOutcome::Failed { reason, .. } => {
                if let Some(alert_id) = &alert_id {
                    self.triggers.complete_resolution(alert_id, false);
                }
                events.push(ResolutionEvent::ResolutionFailed {
                    session_id: session_id.to_string(),
                    divergence_id,
                    reason,
                    timestamp: Utc::now(),
                });
                false
            }
        };
        (events, more)
    }

    /// Turn a successful result into new consensus points and damp the
    /// divergence. Returns the new consensus ids.
    fn apply_resolution(&mut self, index: usize, result: &ResolutionResult) -> Vec<String> {
        let proponents = self.divergence_points[index].participants();
        let seed = self.config.resolution_seed_strength;
        let new_ids: Vec<String> = result
            .new_consensus_points
            .iter()
            .filter(|content| !content.trim().is_empty())
            .map(|content| {
                self.add_consensus_with(
                    ConsensusInput::new(content, Category::Auxiliary, &proponents)
                        .with_seed_strength(seed),
                )
            })
            .collect();

        let divergence = &mut self.divergence_points[index];
        divergence.record_resolution_attempt(&result.strategy_used.to_string(), &result.summary);
        divergence.apply_resolution_success();
        for id in &new_ids {
            divergence.link_consensus(id);
        }
        new_ids
    }

    // ── Plan-based path ──

    /// Build and store a plan for a divergence.
    pub fn generate_conflict_resolution_plan(&mut self, divergence_id: &str) -> Option<ResolutionPlan> {
        let index = self.divergence_position(divergence_id)?;
        let plan = ResolutionPlan::new(divergence_id, &self.divergence_points[index]);
        self.divergence_points[index]
            .record_resolution_attempt(&plan.strategy.to_string(), "plan generated");
        info!(divergence_id, strategy = %plan.strategy, "Resolution plan generated");
        self.plans.push(plan.clone());
        Some(plan)
    }

    /// Report the outcome of plan `index`. A plan executes once.
    pub fn execute_resolution_plan(&mut self, index: usize, success: bool, result: &str) -> bool {
        let Some(plan) = self.plans.get_mut(index) else {
            return false;
        };
        if plan.executed {
            return false;
        }
        plan.mark_executed(result);
        let divergence_id = plan.divergence_id.clone();
        let strategy = plan.strategy;

        let Some(divergence) = self.divergence_mut(&divergence_id) else {
            return false;
        };
        if success {
            divergence.apply_resolution_success();
        }
        divergence.record_resolution_attempt(&strategy.to_string(), result);
        info!(divergence_id = %divergence_id, success, "Resolution plan executed");
        true
    }

    // ── Views ──

    pub fn pending_conflicts(&self) -> &[ConflictAlert] {
        self.triggers.pending()
    }

    pub fn conflict_resolution_status(&self) -> ConflictResolutionStatus {
        ConflictResolutionStatus {
            triggers: self.triggers.statistics(),
            sessions: self.orchestrator.statistics(),
            priority_conflicts: self.triggers.priority_conflicts(5),
            active_sessions: self
                .orchestrator
                .active_sessions()
                .map(|s| s.status_line())
                .collect(),
        }
    }

    /// Compact status; recalculates the report.
    pub fn consensus_status(&mut self) -> ConsensusStatus {
        let report = self.calculate_overall_consensus();
        ConsensusStatus {
            consensus_points_count: report.consensus_count,
            divergence_points_count: report.divergence_count,
            overall_level: report.overall_level,
            core_level: report.hierarchy_analysis.core_level,
            strategic_level: report.hierarchy_analysis.strategic_level,
            consensus_trend: report.consensus_trend,
            strong_consensus: self
                .point_summaries()
                .into_iter()
                .filter(|p| p.strength > 0.7)
                .collect(),
            intense_divergences: self
                .divergence_summaries()
                .into_iter()
                .filter(|d| d.intensity > 0.7)
                .collect(),
            debate_required: report.debate_required,
        }
    }

    /// Full report with per-point details.
    pub fn generate_consensus_report(&mut self) -> FullReport {
        FullReport {
            summary: self.calculate_overall_consensus(),
            consensus_points: self.point_summaries(),
            divergence_points: self.divergence_summaries(),
            rounds_completed: self.current_round,
            generated_at: Utc::now(),
        }
    }

    fn point_summaries(&self) -> Vec<PointSummary> {
        self.consensus_points
            .iter()
            .enumerate()
            .map(|(i, p)| PointSummary {
                id: consensus_id(i),
                content: p.content.clone(),
                category: p.category,
                priority: p.priority,
                strength: p.strength(),
                peak_strength: p.peak_strength(),
                supporters: p.supporters().to_vec(),
                evidence_count: p.evidence().len(),
                verification_count: p.verification_count(),
                round_created: p.round_created,
            })
            .collect()
    }

    fn divergence_summaries(&self) -> Vec<DivergenceSummary> {
        self.divergence_points
            .iter()
            .enumerate()
            .map(|(i, d)| DivergenceSummary {
                id: divergence_id(i),
                content: d.content.clone(),
                category: d.category,
                intensity: d.intensity(),
                severity: d.severity(),
                positions: d
                    .proponents()
                    .iter()
                    .map(|p| (p.participant.clone(), p.position.clone()))
                    .collect(),
                opposing_pairs: d.opposing_pairs().len(),
                requires_debate: d.requires_debate(),
                resolution_attempts: d.resolution_attempts(),
            })
            .collect()
    }

    // ── State ──

    pub fn export_state(&self) -> TrackerSnapshot {
        TrackerSnapshot::capture(self)
    }

    /// Replace the whole tracker state. Nothing changes if validation fails.
    pub fn restore_state(&mut self, snapshot: TrackerSnapshot) -> SnapshotResult<()> {
        snapshot.validate()?;
        *self = snapshot.tracker;
        info!(
            round = self.current_round,
            consensus = self.consensus_points.len(),
            divergences = self.divergence_points.len(),
            "Tracker state restored"
        );
        Ok(())
    }

    pub fn export_json(&self) -> SnapshotResult<String> {
        Ok(serde_json::to_string_pretty(&self.export_state())?)
    }

    pub fn restore_json(&mut self, json: &str) -> SnapshotResult<()> {
        let snapshot: TrackerSnapshot = serde_json::from_str(json)?;
        self.restore_state(snapshot)
    }
}

/// Why a new divergence should go straight to debate, if it should.
fn debate_reason(point: &DivergencePoint) -> Option<&'static str> {
    let intensity = point.intensity();
    if point.opposing_pairs().len() >= 2 {
        Some("multiple opposing position pairs")
    } else if intensity >= 0.8 && point.proponents().len() >= 3 {
        Some("high intensity across many participants")
    } else if point.category.is_high_level() && intensity >= 0.5 {
        Some("disagreement on core or strategic ground")
    } else {
        None
    }
}

fn content_words(content: &str) -> BTreeSet<String> {
    content
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Severity;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn positions(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(p, pos)| (p.to_string(), pos.to_string()))
            .collect()
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut t = Tracker::default();
        assert_eq!(t.add_consensus("a", Category::Core, &ids(&["A"])), "consensus_0");
        assert_eq!(t.add_consensus("b", Category::Core, &ids(&["A"])), "consensus_1");
        assert_eq!(
            t.add_divergence("c", Category::Tactical, &positions(&[("A", "x")])),
            "divergence_0"
        );
        assert!(t.consensus("consensus_1").is_some());
        assert!(t.consensus("consensus_2").is_none());
        assert!(t.divergence("bogus").is_none());
    }

    #[test]
    fn test_importance_formula() {
        let mut t = Tracker::default();
        let id = t.add_consensus_with(
            ConsensusInput::new("x", Category::Core, &ids(&["A", "B", "C", "D", "E"]))
                .with_priority(Priority::Critical),
        );
        let point = t.consensus(&id).unwrap();
        assert!((point.importance_score() - 1.0).abs() < 1e-12);

        let id = t.add_consensus("y", Category::Auxiliary, &ids(&["A"]));
        // 0.35 * 0.4 + 0.6 * 0.35 + 0.2 * 0.25
        let expected = 0.14 + 0.21 + 0.05;
        assert!((t.consensus(&id).unwrap().importance_score() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_update_support_unknown_id() {
        let mut t = Tracker::default();
        let id = t.add_consensus("x", Category::Core, &ids(&["A"]));
        assert!(t.update_support(&id, "B", SupportAction::Add));
        assert!(!t.update_support(&id, "B", SupportAction::Add));
        assert!(t.update_support(&id, "B", SupportAction::Remove));
        assert!(!t.update_support("consensus_9", "B", SupportAction::Add));
    }

    #[test]
    fn test_divergence_marked_for_debate() {
        let mut t = Tracker::default();
        let core = t.add_divergence("architecture", Category::Core, &positions(&[("A", "x"), ("B", "y")]));
        let aux = t.add_divergence("naming", Category::Auxiliary, &positions(&[("A", "x"), ("B", "y")]));
        let core = t.divergence(&core).unwrap();
        assert!(core.requires_debate());
        assert_eq!(core.severity(), Severity::High);
        assert_eq!(core.debate_requested_by(), ["system".to_string()]);
        assert!(!t.divergence(&aux).unwrap().requires_debate());
    }

    #[test]
    fn test_consensus_links_related_divergence() {
        let mut t = Tracker::default();
        let div = t.add_divergence(
            "use redis for caching",
            Category::Technical,
            &positions(&[("A", "redis"), ("B", "memcached")]),
        );
        let id = t.add_consensus("caching layer should use redis", Category::Technical, &ids(&["A"]));
        assert_eq!(t.divergence(&div).unwrap().related_consensus(), [id]);
        t.add_consensus("unrelated topic", Category::Technical, &ids(&["A"]));
        assert_eq!(t.divergence(&div).unwrap().related_consensus().len(), 1);
    }

    #[test]
    fn test_stability_history_per_round() {
        let mut t = Tracker::default();
        let id = t.add_consensus("x", Category::Core, &ids(&["A", "B"]));
        for round in 1..=3 {
            t.set_current_round(round);
        }
        assert_eq!(t.stability_history(&id).len(), 3);
        assert_eq!(t.current_round(), 3);
    }

    #[test]
    fn test_empty_report() {
        let mut t = Tracker::default();
        let report = t.calculate_overall_consensus();
        assert_eq!(report.overall_level, 0.0);
        assert_eq!(report.analysis, "no consensus or divergence data");
        assert!(t.consensus_history().is_empty());
    }

    #[test]
    fn test_report_appends_history() {
        let mut t = Tracker::default();
        t.add_consensus("x", Category::Core, &ids(&["A", "B", "C"]));
        let report = t.record_discussion_round(1);
        assert!(report.overall_level > 0.0);
        assert!(report.overall_level <= 1.0);
        assert_eq!(t.consensus_history().len(), 1);
        assert_eq!(t.consensus_history()[0].overall_level, report.overall_level);
        assert_eq!(report.detailed_hierarchy[&Category::Core].point_count, 1);
        assert!(report.hierarchy_analysis.core_level > 0.0);
        assert_eq!(report.hierarchy_analysis.strategic_level, 0.0);
    }

    #[test]
    fn test_divergence_penalty_lowers_level() {
        let mut calm = Tracker::default();
        calm.add_consensus("x", Category::Core, &ids(&["A", "B", "C"]));
        let calm_report = calm.calculate_overall_consensus();

        let mut split = Tracker::default();
        split.add_consensus("x", Category::Core, &ids(&["A", "B", "C"]));
        split.add_divergence("y", Category::Core, &positions(&[("A", "p"), ("B", "q"), ("C", "r")]));
        let split_report = split.calculate_overall_consensus();

        assert!(split_report.divergence_penalty > 0.0);
        assert!(split_report.overall_level < calm_report.overall_level);
        assert_eq!(split_report.debate_required.len(), 1);
        assert_eq!(split_report.debate_required[0].priority, Priority::High);
    }

    #[test]
    fn test_breadth_counts_proponents() {
        let mut t = Tracker::default();
        t.add_consensus("x", Category::Core, &ids(&["A", "B"]));
        t.add_divergence("y", Category::Tactical, &positions(&[("C", "p"), ("A", "q")]));
        let report = t.calculate_overall_consensus();
        assert!((report.multi_dimension_scores.breadth - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_dependency_requires_known_points() {
        let mut t = Tracker::default();
        let a = t.add_consensus("a", Category::Core, &ids(&["A"]));
        let b = t.add_consensus("b", Category::Tactical, &ids(&["A"]));
        assert!(t.add_consensus_dependency(&a, &b, DependencyType::Prerequisite, 0.8, "a first"));
        assert!(!t.add_consensus_dependency(&b, &a, DependencyType::Prerequisite, 0.8, "cycle"));
        assert!(!t.add_consensus_dependency(&a, "consensus_5", DependencyType::Prerequisite, 0.8, ""));
        assert!(t.set_hierarchy_level(&b, HierarchyLevel::Detail));
        assert!(!t.set_hierarchy_level("consensus_5", HierarchyLevel::Detail));
    }

    #[test]
    fn test_manual_session_steps() {
        let mut t = Tracker::default();
        let div = t.add_divergence(
            "deploy cadence",
            Category::Tactical,
            &positions(&[("A", "daily"), ("B", "weekly")]),
        );
        let session = t
            .start_conflict_resolution(&div, Some(ResolutionStrategy::Compromise))
            .unwrap();
        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(t.advance_resolution(&session));
        }
        assert!(matches!(
            events.last(),
            Some(ResolutionEvent::ResolutionCompleted { .. })
        ));
        assert!(t.orchestrator().session(&session).unwrap().succeeded());
        let divergence = t.divergence(&div).unwrap();
        assert_eq!(divergence.resolution_damping(), 0.5);
        assert_eq!(divergence.resolution_attempts(), 1);
        // The compromise statement became a new auxiliary point.
        assert_eq!(t.consensus_points().len(), 1);
        assert_eq!(t.consensus_points()[0].category, Category::Auxiliary);
        assert!(t.advance_resolution(&session).is_empty());
    }

    #[test]
    fn test_unknown_divergence_has_no_session() {
        let mut t = Tracker::default();
        assert!(t.start_conflict_resolution("divergence_0", None).is_none());
        assert!(!t.set_resolution_inputs("divergence_0", ResolutionInputs::default()));
    }

    #[test]
    fn test_plan_path() {
        let mut t = Tracker::default();
        let div = t.add_divergence(
            "logging format",
            Category::Procedural,
            &positions(&[("A", "json"), ("B", "text")]),
        );
        let plan = t.generate_conflict_resolution_plan(&div).unwrap();
        assert_eq!(plan.strategy, ResolutionStrategy::DataDriven);
        assert_eq!(t.divergence(&div).unwrap().resolution_attempts(), 1);

        assert!(t.execute_resolution_plan(0, true, "json wins"));
        assert!(!t.execute_resolution_plan(0, true, "again"));
        assert!(!t.execute_resolution_plan(3, true, "missing"));
        let divergence = t.divergence(&div).unwrap();
        assert_eq!(divergence.resolution_attempts(), 2);
        assert_eq!(divergence.resolution_damping(), 0.5);
        assert!(t.plans()[0].executed);
    }

    #[test]
    fn test_status_views() {
        let mut t = Tracker::default();
        t.add_consensus_with(
            ConsensusInput::new("x", Category::Core, &ids(&["A", "B", "C", "D", "E"]))
                .with_evidence(&ids(&["e1", "e2", "e3"])),
        );
        let status = t.consensus_status();
        assert_eq!(status.consensus_points_count, 1);
        assert_eq!(status.strong_consensus.len(), 1);

        let full = t.generate_consensus_report();
        assert_eq!(full.consensus_points.len(), 1);
        assert_eq!(full.consensus_points[0].evidence_count, 3);
        assert_eq!(t.consensus_history().len(), 2);

        let conflicts = t.conflict_resolution_status();
        assert_eq!(conflicts.triggers.pending, 0);
        assert!(conflicts.active_sessions.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut t = Tracker::default();
        t.add_consensus("x", Category::Core, &ids(&["A", "B"]));
        t.set_current_round(1);
        let json = t.export_json().unwrap();

        let mut restored = Tracker::default();
        restored.restore_json(&json).unwrap();
        assert_eq!(restored.current_round(), 1);
        assert_eq!(restored.stability_history("consensus_0").len(), 1);
        assert!(restored.restore_json("{not json").is_err());
        assert_eq!(restored.consensus_points().len(), 1);
    }
}

//! Dynamic weighting: discussion phase, expert authority and context.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::points::{unit, Category, CategoryWeights, ConsensusPoint};

/// Stage of the discussion, inferred from progress and consensus level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionPhase {
    Exploration,
    Deepening,
    Convergence,
    Finalization,
}

impl DiscussionPhase {
    /// Detect the phase from round progress and the current consensus level.
    pub fn detect(current_round: u32, total_rounds: u32, consensus_level: f64) -> Self {
        if total_rounds == 0 {
            return Self::Exploration;
        }
        let progress = current_round as f64 / total_rounds as f64;
        if progress < 0.25 {
            Self::Exploration
        } else if progress < 0.5 {
            if consensus_level >= 0.6 {
                Self::Convergence
            } else {
                Self::Deepening
            }
        } else if progress < 0.8 {
            if consensus_level >= 0.7 {
                Self::Finalization
            } else {
                Self::Convergence
            }
        } else {
            Self::Finalization
        }
    }

    /// Per-category multipliers applied on top of the base type weights.
    pub fn multipliers(self) -> CategoryWeights {
        // Argument order: core, strategic, tactical, technical, procedural, auxiliary.
        match self {
            Self::Exploration => CategoryWeights::new(0.8, 0.9, 1.0, 1.0, 1.2, 1.3),
            Self::Deepening => CategoryWeights::new(1.0, 1.0, 1.0, 1.1, 0.9, 0.9),
            Self::Convergence => CategoryWeights::new(1.2, 1.1, 0.9, 1.0, 0.8, 0.7),
            Self::Finalization => CategoryWeights::new(1.3, 1.2, 0.8, 1.0, 0.6, 0.5),
        }
    }
}

impl std::fmt::Display for DiscussionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exploration => write!(f, "exploration"),
            Self::Deepening => write!(f, "deepening"),
            Self::Convergence => write!(f, "convergence"),
            Self::Finalization => write!(f, "finalization"),
        }
    }
}

/// Authority of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertAuthorityScore {
    pub domain_expertise: f64,
    pub participation_quality: f64,
    pub track_record: f64,
    pub influence: f64,
    pub contribution_count: u32,
}

impl Default for ExpertAuthorityScore {
    fn default() -> Self {
        Self {
            domain_expertise: 0.5,
            participation_quality: 0.5,
            track_record: 0.5,
            influence: 0.5,
            contribution_count: 0,
        }
    }
}

impl ExpertAuthorityScore {
    pub fn authority(&self) -> f64 {
        unit(
            self.domain_expertise * 0.35
                + self.participation_quality * 0.25
                + self.track_record * 0.25
                + self.influence * 0.15,
        )
    }

    /// Fold one contribution into the running scores.
    pub fn update_from_contribution(&mut self, quality: f64, led_to_consensus: bool) {
        self.participation_quality = unit(self.participation_quality * 0.8 + unit(quality) * 0.2);
        let delta = if led_to_consensus { 0.05 } else { -0.02 };
        self.track_record = unit(self.track_record + delta);
        self.contribution_count += 1;
    }
}

/// Partial update for [`ExpertAuthorityScore`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorityUpdate {
    pub domain_expertise: Option<f64>,
    pub participation_quality: Option<f64>,
    pub track_record: Option<f64>,
    pub influence: Option<f64>,
}

/// Weight tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Base importance of each category before phase adjustment.
    pub base_type_weights: CategoryWeights,
    pub context_min: f64,
    pub context_max: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            base_type_weights: CategoryWeights::new(1.0, 0.85, 0.65, 0.75, 0.5, 0.4),
            context_min: 0.8,
            context_max: 1.2,
        }
    }
}

/// Computes per-point weights from phase, authority and context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightCalculator {
    config: WeightConfig,
    expert_scores: BTreeMap<String, ExpertAuthorityScore>,
}

impl WeightCalculator {
    pub fn new(config: WeightConfig) -> Self {
        Self {
            config,
            expert_scores: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub fn expert_scores(&self) -> &BTreeMap<String, ExpertAuthorityScore> {
        &self.expert_scores
    }

    pub fn expert_score(&self, participant: &str) -> Option<&ExpertAuthorityScore> {
        self.expert_scores.get(participant)
    }

    pub fn update_expert_authority(&mut self, participant: &str, update: &AuthorityUpdate) {
        let score = self.expert_scores.entry(participant.to_string()).or_default();
        if let Some(v) = update.domain_expertise {
            score.domain_expertise = unit(v);
        }
        if let Some(v) = update.participation_quality {
            score.participation_quality = unit(v);
        }
        if let Some(v) = update.track_record {
            score.track_record = unit(v);
        }
        if let Some(v) = update.influence {
            score.influence = unit(v);
        }
        debug!(participant, authority = score.authority(), "Expert authority updated");
    }

    pub fn record_contribution(&mut self, participant: &str, quality: f64, led_to_consensus: bool) {
        self.expert_scores
            .entry(participant.to_string())
            .or_default()
            .update_from_contribution(quality, led_to_consensus);
    }

    /// Authority of a participant; unknown participants get the default.
    pub fn authority(&self, participant: &str) -> f64 {
        self.expert_scores
            .get(participant)
            .map(ExpertAuthorityScore::authority)
            .unwrap_or_else(|| ExpertAuthorityScore::default().authority())
    }

    pub fn get_phase_adjusted_type_weights(&self, phase: DiscussionPhase) -> CategoryWeights {
        self.config.base_type_weights.scaled_by(&phase.multipliers())
    }

    pub fn type_weight(&self, category: Category, phase: DiscussionPhase) -> f64 {
        self.get_phase_adjusted_type_weights(phase).get(category)
    }

    /// `0.5 + mean authority`, in `[0.5, 1.5]`; 0 without supporters.
    pub fn calculate_expert_weighted_support(&self, supporters: &[String]) -> f64 {
        if supporters.is_empty() {
            return 0.0;
        }
        let total: f64 = supporters.iter().map(|s| self.authority(s)).sum();
        0.5 + total / supporters.len() as f64
    }

    /// Context modifier in `[context_min, context_max]`.
    pub fn context_modifier(&self, point: &ConsensusPoint, topic_keywords: &BTreeSet<String>) -> f64 {
        let overlap = point
            .topic_keywords
            .iter()
            .filter(|k| topic_keywords.contains(&k.to_lowercase()))
            .count();
        let mut modifier = 1.0 + (overlap as f64 * 0.03).min(0.1);
        if point.evidence().len() >= 3 {
            modifier += 0.05;
        }
        if point.verification_count() >= 2 {
            modifier += 0.05;
        }
        modifier.clamp(self.config.context_min, self.config.context_max)
    }

    /// `type weight × expert factor × context modifier`.
    pub fn combined_weight(
        &self,
        point: &ConsensusPoint,
        phase: DiscussionPhase,
        topic_keywords: &BTreeSet<String>,
    ) -> f64 {
        self.type_weight(point.category, phase)
            * self.calculate_expert_weighted_support(point.supporters())
            * self.context_modifier(point, topic_keywords)
    }
}

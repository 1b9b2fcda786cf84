//! Scripted discussion scenarios replayed through a [`Tracker`].
//!
//! A scenario is a TOML file of rounds. Each round lists the consensus
//! points, divergences and updates that came out of it:
//!
//! ```toml
//! total_rounds = 4
//! topic_keywords = ["cache"]
//!
//! [[rounds]]
//! round = 1
//!
//! [[rounds.consensus]]
//! content = "use caching for reads"
//! category = "core"
//! supporters = ["alice", "bob"]
//!
//! [[rounds.divergences]]
//! content = "cache backend"
//! category = "technical"
//! positions = { alice = "redis", bob = "memcached" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dependency::DependencyType;
use crate::points::Category;
use crate::resolution::{ResolutionEvent, ResolutionInputs};
use crate::tracker::{ConsensusInput, FullReport, SupportAction, Tracker};
use crate::weights::AuthorityUpdate;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Overrides the tracker's round estimate when set.
    pub total_rounds: Option<u32>,
    pub topic_keywords: Vec<String>,
    pub experts: Vec<ExpertEntry>,
    pub rounds: Vec<RoundScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertEntry {
    pub participant: String,
    #[serde(default)]
    pub authority: AuthorityUpdate,
}

/// Everything that happened in one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundScript {
    pub round: u32,
    pub consensus: Vec<ConsensusInput>,
    pub divergences: Vec<DivergenceEntry>,
    pub support: Vec<SupportEntry>,
    pub positions: Vec<PositionEntry>,
    pub evidence: Vec<EvidenceEntry>,
    /// Consensus ids verified this round.
    pub verify: Vec<String>,
    pub dependencies: Vec<DependencyEntry>,
    /// divergence id -> executor inputs.
    pub inputs: BTreeMap<String, ResolutionInputs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceEntry {
    pub content: String,
    pub category: Category,
    /// participant -> position
    pub positions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportEntry {
    pub consensus: String,
    pub participant: String,
    pub action: SupportAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub divergence: String,
    pub participant: String,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub consensus: String,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub parent: String,
    pub child: String,
    pub kind: DependencyType,
    #[serde(default = "default_dependency_strength")]
    pub strength: f64,
    #[serde(default)]
    pub evidence: String,
}

fn default_dependency_strength() -> f64 {
    0.5
}

/// Output of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub rounds_replayed: usize,
    /// Overall level after each replayed round.
    pub levels: Vec<f64>,
    pub resolution_events: Vec<ResolutionEvent>,
    pub report: FullReport,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Feed every round into `tracker`, running conflict handling after each.
    pub fn replay(&self, tracker: &mut Tracker) -> ReplaySummary {
        if let Some(rounds) = self.total_rounds {
            tracker.set_total_rounds_estimate(rounds);
        }
        if !self.topic_keywords.is_empty() {
            tracker.set_topic_keywords(&self.topic_keywords);
        }
        for expert in &self.experts {
            tracker.update_expert_authority(&expert.participant, &expert.authority);
        }

        let mut levels = Vec::with_capacity(self.rounds.len());
        let mut resolution_events = Vec::new();
        for script in &self.rounds {
            tracker.set_current_round(script.round);
            apply_round(tracker, script);
            let report = tracker.calculate_overall_consensus();
            levels.push(report.overall_level);
            resolution_events.extend(tracker.check_and_handle_conflicts(script.round));
            info!(round = script.round, level = report.overall_level, "Round replayed");
        }

        ReplaySummary {
            rounds_replayed: self.rounds.len(),
            levels,
            resolution_events,
            report: tracker.generate_consensus_report(),
        }
    }
}

fn apply_round(tracker: &mut Tracker, script: &RoundScript) {
    let round = script.round;
    for input in &script.consensus {
        tracker.add_consensus_with(input.clone());
    }
    for entry in &script.divergences {
        let proponents: Vec<(String, String)> = entry
            .positions
            .iter()
            .map(|(p, pos)| (p.clone(), pos.clone()))
            .collect();
        tracker.add_divergence(&entry.content, entry.category, &proponents);
    }
    for entry in &script.support {
        if !tracker.update_support(&entry.consensus, &entry.participant, entry.action) {
            warn!(round, consensus = %entry.consensus, participant = %entry.participant, "Support update had no effect");
        }
    }
    for entry in &script.positions {
        if !tracker.add_proponent(&entry.divergence, &entry.participant, &entry.position) {
            warn!(round, divergence = %entry.divergence, participant = %entry.participant, "Position update had no effect");
        }
    }
    for entry in &script.evidence {
        if !tracker.add_evidence(&entry.consensus, &entry.evidence) {
            warn!(round, consensus = %entry.consensus, "Evidence rejected");
        }
    }
    for id in &script.verify {
        if !tracker.verify_consensus(id) {
            warn!(round, consensus = %id, "Unknown consensus point");
        }
    }
    for dep in &script.dependencies {
        if !tracker.add_consensus_dependency(&dep.parent, &dep.child, dep.kind, dep.strength, &dep.evidence) {
            warn!(round, parent = %dep.parent, child = %dep.child, "Dependency rejected");
        }
    }
    for (divergence_id, inputs) in &script.inputs {
        if !tracker.set_resolution_inputs(divergence_id, inputs.clone()) {
            warn!(round, divergence_id = %divergence_id, "Inputs for unknown divergence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
        total_rounds = 3
        topic_keywords = ["Cache"]

        [[experts]]
        participant = "alice"
        authority = { domain_expertise = 0.9 }

        [[rounds]]
        round = 1

        [[rounds.consensus]]
        content = "use caching for reads"
        category = "core"
        supporters = ["alice", "bob"]
        keywords = ["cache"]

        [[rounds.consensus]]
        content = "cache invalidation by ttl"
        category = "technical"
        supporters = ["alice"]
        priority = "high"

        [[rounds]]
        round = 2

        [[rounds.support]]
        consensus = "consensus_1"
        participant = "bob"
        action = "add"

        [[rounds.evidence]]
        consensus = "consensus_0"
        evidence = "p99 latency halves with a warm cache"

        [[rounds.dependencies]]
        parent = "consensus_0"
        child = "consensus_1"
        kind = "prerequisite"
    "#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        assert_eq!(scenario.total_rounds, Some(3));
        assert_eq!(scenario.rounds.len(), 2);
        assert_eq!(scenario.rounds[0].consensus[1].priority, Some(crate::points::Priority::High));
        assert_eq!(scenario.rounds[1].dependencies[0].strength, 0.5);
        assert_eq!(scenario.experts[0].authority.domain_expertise, Some(0.9));
    }

    #[test]
    fn test_replay_applies_rounds() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        let mut tracker = Tracker::default();
        let summary = scenario.replay(&mut tracker);

        assert_eq!(summary.rounds_replayed, 2);
        assert_eq!(summary.levels.len(), 2);
        assert_eq!(tracker.current_round(), 2);
        assert_eq!(tracker.config().total_rounds_estimate, 3);
        assert_eq!(tracker.consensus_points()[1].supporters().len(), 2);
        assert_eq!(tracker.consensus_points()[0].evidence().len(), 1);
        assert_eq!(tracker.dependencies().edge_count(), 1);
        assert!(tracker.weights().expert_score("alice").is_some());
        assert_eq!(summary.report.consensus_points.len(), 2);
        assert!(summary.resolution_events.is_empty());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let err = Scenario::from_toml(
            r#"
            [[rounds]]
            round = 1
            [[rounds.consensus]]
            content = "x"
            category = "cosmic"
            "#,
        );
        assert!(err.is_err());
    }
}

//! Consensus points: claims several participants agree on.
//!
//! `strength` is derived, never assigned. Every mutation re-runs the
//! scoring formula and raises `peak_strength` when the new value is higher:
//!
//! ```text
//! strength = min(1, supporters/5)     × 0.40
//!          + min(1, evidence/3)       × 0.25
//!          + min(1, verifications/5)  × 0.15
//!          + stability_score          × 0.10
//!          + importance_score         × 0.10
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::{unit, Category, Priority};

/// Maximum number of activation events retained per point.
pub const ACTIVATION_HISTORY_LIMIT: usize = 10;

/// What re-activated a consensus point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    NewSupporter,
    NewEvidence,
    Verification,
    Reinforcement,
}

impl std::fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSupporter => write!(f, "new_supporter"),
            Self::NewEvidence => write!(f, "new_evidence"),
            Self::Verification => write!(f, "verification"),
            Self::Reinforcement => write!(f, "reinforcement"),
        }
    }
}

/// A single activation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationEvent {
    pub kind: ActivationKind,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

/// A claim with measurable, decaying support strength.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusPoint {
    /// Claim text.
    pub content: String,
    pub category: Category,
    pub priority: Priority,
    /// Topic keywords used for correlation and context weighting.
    pub topic_keywords: Vec<String>,
    /// Round the point was created in.
    pub round_created: u32,
    supporters: Vec<String>,
    evidence: Vec<String>,
    verification_count: u32,
    strength: f64,
    peak_strength: f64,
    activations: Vec<ActivationEvent>,
    last_activation_round: u32,
    importance_score: f64,
    stability_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ConsensusPoint {
    /// Create a point. Duplicate supporters and empty or duplicate evidence
    /// are dropped.
    pub fn new(content: &str, category: Category, supporters: &[String], round: u32) -> Self {
        let now = Utc::now();
        let mut point = Self {
            content: content.to_string(),
            category,
            priority: Priority::default(),
            topic_keywords: Vec::new(),
            round_created: round,
            supporters: Vec::new(),
            evidence: Vec::new(),
            verification_count: 0,
            strength: 0.0,
            peak_strength: 0.0,
            activations: Vec::new(),
            last_activation_round: 0,
            importance_score: 0.5,
            stability_score: 0.5,
            created_at: now,
            last_updated: now,
        };
        for supporter in supporters {
            if !point.supporters.contains(supporter) {
                point.supporters.push(supporter.clone());
            }
        }
        point.recompute_strength();
        point
    }

    /// Builder: attach evidence at creation time.
    pub fn with_evidence(mut self, evidence: &[String]) -> Self {
        for item in evidence {
            if !item.trim().is_empty() && !self.evidence.contains(item) {
                self.evidence.push(item.clone());
            }
        }
        self.recompute_strength();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_keywords(mut self, keywords: &[String]) -> Self {
        self.topic_keywords = keywords.to_vec();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.set_importance_score(importance);
        self
    }

    /// Builder: start at `strength` instead of the derived value. The next
    /// mutation re-derives as usual; the peak keeps the seed.
    pub fn with_seed_strength(mut self, strength: f64) -> Self {
        self.strength = unit(strength);
        self.peak_strength = self.peak_strength.max(self.strength);
        self
    }

    /// Add a supporter. Returns `false` (and changes nothing) if already present.
    pub fn add_supporter(&mut self, supporter: &str, round: u32) -> bool {
        if self.supporters.iter().any(|s| s == supporter) {
            return false;
        }
        self.supporters.push(supporter.to_string());
        self.touch();
        self.recompute_strength();
        if round > 0 {
            self.activate(ActivationKind::NewSupporter, round);
        }
        true
    }

    /// Remove a supporter. Returns `false` if absent.
    pub fn remove_supporter(&mut self, supporter: &str) -> bool {
        let before = self.supporters.len();
        self.supporters.retain(|s| s != supporter);
        if self.supporters.len() == before {
            return false;
        }
        self.touch();
        self.recompute_strength();
        true
    }

    /// Attach a piece of evidence. Empty and duplicate evidence is rejected.
    pub fn add_evidence(&mut self, evidence: &str, round: u32) -> bool {
        if evidence.trim().is_empty() || self.evidence.iter().any(|e| e == evidence) {
            return false;
        }
        self.evidence.push(evidence.to_string());
        self.touch();
        self.recompute_strength();
        if round > 0 {
            self.activate(ActivationKind::NewEvidence, round);
        }
        true
    }

    /// Record an independent verification of the claim.
    pub fn verify(&mut self, round: u32) {
        self.verification_count += 1;
        self.touch();
        self.recompute_strength();
        if round > 0 {
            self.activate(ActivationKind::Verification, round);
        }
    }

    /// Record an activation without changing support.
    pub fn activate(&mut self, kind: ActivationKind, round: u32) {
        self.last_activation_round = round;
        self.activations.push(ActivationEvent {
            kind,
            round,
            timestamp: Utc::now(),
        });
        if self.activations.len() > ACTIVATION_HISTORY_LIMIT {
            let excess = self.activations.len() - ACTIVATION_HISTORY_LIMIT;
            self.activations.drain(..excess);
        }
        self.touch();
    }

    pub fn set_importance_score(&mut self, score: f64) {
        self.importance_score = unit(score);
        self.recompute_strength();
    }

    pub fn set_stability_score(&mut self, score: f64) {
        self.stability_score = unit(score);
        self.recompute_strength();
    }

    pub fn supporters(&self) -> &[String] {
        &self.supporters
    }

    pub fn has_supporter(&self, supporter: &str) -> bool {
        self.supporters.iter().any(|s| s == supporter)
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn verification_count(&self) -> u32 {
        self.verification_count
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn peak_strength(&self) -> f64 {
        self.peak_strength
    }

    pub fn activations(&self) -> &[ActivationEvent] {
        &self.activations
    }

    /// Round of the most recent activation, 0 if never activated.
    pub fn last_activation_round(&self) -> u32 {
        self.last_activation_round
    }

    pub fn importance_score(&self) -> f64 {
        self.importance_score
    }

    pub fn stability_score(&self) -> f64 {
        self.stability_score
    }

    /// Lowest effective strength this point may decay to.
    pub fn protected_minimum(&self, ratio: f64) -> f64 {
        unit(self.peak_strength * ratio)
    }

    /// Whether stored values satisfy the strength invariants.
    pub fn is_consistent(&self) -> bool {
        (0.0..=1.0).contains(&self.strength)
            && (0.0..=1.0).contains(&self.peak_strength)
            && self.peak_strength >= self.strength
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    fn recompute_strength(&mut self) {
        if self.supporters.is_empty() {
            self.strength = 0.0;
            return;
        }

        let supporter_factor = (self.supporters.len() as f64 / 5.0).min(1.0);
        let evidence_factor = (self.evidence.len() as f64 / 3.0).min(1.0);
        let verification_factor = (self.verification_count as f64 / 5.0).min(1.0);

        self.strength = unit(
            supporter_factor * 0.40
                + evidence_factor * 0.25
                + verification_factor * 0.15
                + self.stability_score * 0.10
                + self.importance_score * 0.10,
        );
        if self.strength > self.peak_strength {
            self.peak_strength = self.strength;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn point(supporters: &[&str]) -> ConsensusPoint {
        ConsensusPoint::new("use caching", Category::Core, &ids(supporters), 1)
    }

    #[test]
    fn test_strength_computed_on_creation() {
        let p = point(&["A", "B"]);
        // 2/5*0.4 + 0 + 0 + 0.5*0.1 + 0.5*0.1
        assert!((p.strength() - 0.26).abs() < 1e-9);
        assert_eq!(p.peak_strength(), p.strength());
    }

    #[test]
    fn test_no_supporters_means_zero_strength() {
        let p = point(&[]);
        assert_eq!(p.strength(), 0.0);
    }

    #[test]
    fn test_duplicate_supporter_is_noop() {
        let mut p = point(&["A", "B"]);
        let before = p.strength();
        assert!(!p.add_supporter("A", 2));
        assert_eq!(p.strength(), before);
        assert!(p.activations().is_empty());
    }

    #[test]
    fn test_add_supporter_activates() {
        let mut p = point(&["A"]);
        assert!(p.add_supporter("B", 3));
        assert_eq!(p.last_activation_round(), 3);
        assert_eq!(p.activations()[0].kind, ActivationKind::NewSupporter);
    }

    #[test]
    fn test_round_zero_does_not_activate() {
        let mut p = point(&["A"]);
        p.verify(0);
        assert_eq!(p.verification_count(), 1);
        assert!(p.activations().is_empty());
    }

    #[test]
    fn test_evidence_rejects_empty_and_duplicates() {
        let mut p = point(&["A"]);
        assert!(!p.add_evidence("   ", 1));
        assert!(p.add_evidence("benchmark", 1));
        assert!(!p.add_evidence("benchmark", 1));
        assert_eq!(p.evidence().len(), 1);
    }

    #[test]
    fn test_peak_survives_supporter_removal() {
        let mut p = point(&["A", "B", "C", "D", "E"]);
        let peak = p.strength();
        assert!(p.remove_supporter("A"));
        assert!(p.remove_supporter("B"));
        assert!(!p.remove_supporter("Z"));
        assert!(p.strength() < peak);
        assert_eq!(p.peak_strength(), peak);
        assert!(p.is_consistent());
    }

    #[test]
    fn test_strength_bounded_under_saturation() {
        let mut p = point(&["A", "B", "C", "D", "E", "F", "G"]);
        for i in 0..10 {
            p.add_evidence(&format!("ev{i}"), 1);
            p.verify(1);
        }
        p.set_importance_score(3.0);
        p.set_stability_score(3.0);
        assert_eq!(p.strength(), 1.0);
        assert!(p.is_consistent());
    }

    #[test]
    fn test_activation_history_capped() {
        let mut p = point(&["A"]);
        for round in 1..=15 {
            p.verify(round);
        }
        assert_eq!(p.activations().len(), ACTIVATION_HISTORY_LIMIT);
        assert_eq!(p.activations()[0].round, 6);
    }

    #[test]
    fn test_constructor_dedupes_supporters() {
        let p = point(&["A", "A", "B"]);
        assert_eq!(p.supporters().len(), 2);
    }

    #[test]
    fn test_seed_strength_until_next_mutation() {
        let mut p = point(&["A", "B"]).with_seed_strength(0.6);
        assert_eq!(p.strength(), 0.6);
        assert_eq!(p.peak_strength(), 0.6);
        assert!(p.is_consistent());

        assert!(p.add_supporter("C", 2));
        assert!(p.strength() < 0.6);
        assert_eq!(p.peak_strength(), 0.6);
        assert!(p.is_consistent());
    }
}

//! Divergence points: claims participants actively disagree on.
//!
//! Severity and intensity are derived state. Every mutation re-runs
//! [`DivergencePoint::rederive`], which detects opposing pairs first and then
//! recomputes severity and intensity from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::{unit, Category, Severity};

/// How a disagreement should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Debate,
    Mediation,
    Voting,
    Compromise,
    ExpertReview,
    DataDriven,
    Postpone,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debate => write!(f, "debate"),
            Self::Mediation => write!(f, "mediation"),
            Self::Voting => write!(f, "voting"),
            Self::Compromise => write!(f, "compromise"),
            Self::ExpertReview => write!(f, "expert_review"),
            Self::DataDriven => write!(f, "data_driven"),
            Self::Postpone => write!(f, "postpone"),
        }
    }
}

/// One participant and the position they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proponent {
    pub participant: String,
    pub position: String,
}

/// Two participants whose positions differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpposingPair {
    pub first: String,
    pub first_position: String,
    pub second: String,
    pub second_position: String,
}

/// Kind of a discussion-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionKind {
    Statement,
    DebateRequest,
    ResolutionAttempt,
}

/// Entry in a divergence's discussion log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionEntry {
    pub speaker: String,
    pub content: String,
    pub kind: DiscussionKind,
    /// Outcome for resolution attempts.
    pub result: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A disagreement between participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergencePoint {
    pub content: String,
    pub category: Category,
    pub round_created: u32,
    proponents: Vec<Proponent>,
    intensity: f64,
    severity: Severity,
    opposing_pairs: Vec<OpposingPair>,
    discussion_history: Vec<DiscussionEntry>,
    potential_resolutions: Vec<String>,
    resolution_attempts: u32,
    requires_debate: bool,
    debate_requested_by: Vec<String>,
    resolution_damping: f64,
    related_consensus: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DivergencePoint {
    /// Create a divergence. A participant listed twice keeps its last position.
    pub fn new(content: &str, category: Category, proponents: &[(String, String)], round: u32) -> Self {
        let mut point = Self {
            content: content.to_string(),
            category,
            round_created: round,
            proponents: Vec::new(),
            intensity: 0.0,
            severity: Severity::Low,
            opposing_pairs: Vec::new(),
            discussion_history: Vec::new(),
            potential_resolutions: Vec::new(),
            resolution_attempts: 0,
            requires_debate: false,
            debate_requested_by: Vec::new(),
            resolution_damping: 1.0,
            related_consensus: Vec::new(),
            created_at: Utc::now(),
        };
        for (participant, position) in proponents {
            point.upsert(participant, position);
        }
        point.rederive();
        point
    }

    /// Add a proponent or replace their position. Returns `true` if anything changed.
    pub fn add_proponent(&mut self, participant: &str, position: &str) -> bool {
        let changed = self.upsert(participant, position);
        if changed {
            self.rederive();
        }
        changed
    }

    /// Restate an existing participant's position. Unknown participants are ignored.
    pub fn update_position(&mut self, participant: &str, position: &str) -> bool {
        if !self.proponents.iter().any(|p| p.participant == participant) {
            return false;
        }
        self.add_proponent(participant, position)
    }

    pub fn add_discussion(&mut self, content: &str, speaker: &str) {
        self.discussion_history.push(DiscussionEntry {
            speaker: speaker.to_string(),
            content: content.to_string(),
            kind: DiscussionKind::Statement,
            result: None,
            timestamp: Utc::now(),
        });
    }

    pub fn add_potential_resolution(&mut self, resolution: &str) {
        if !resolution.trim().is_empty() && !self.potential_resolutions.iter().any(|r| r == resolution) {
            self.potential_resolutions.push(resolution.to_string());
        }
    }

    /// Flag for structured debate. Severity is raised to at least High.
    pub fn mark_for_debate(&mut self, requested_by: &str, reason: &str) {
        self.requires_debate = true;
        if !self.debate_requested_by.iter().any(|r| r == requested_by) {
            self.debate_requested_by.push(requested_by.to_string());
        }
        self.discussion_history.push(DiscussionEntry {
            speaker: requested_by.to_string(),
            content: reason.to_string(),
            kind: DiscussionKind::DebateRequest,
            result: None,
            timestamp: Utc::now(),
        });
        self.rederive();
    }

    /// Log a resolution attempt and bump the attempt counter.
    pub fn record_resolution_attempt(&mut self, method: &str, result: &str) {
        self.resolution_attempts += 1;
        self.discussion_history.push(DiscussionEntry {
            speaker: "system".to_string(),
            content: format!("resolution attempt via {method}"),
            kind: DiscussionKind::ResolutionAttempt,
            result: Some(result.to_string()),
            timestamp: Utc::now(),
        });
        self.rederive();
    }

    /// Halve intensity for good. The damping survives later re-derivation.
    pub fn apply_resolution_success(&mut self) {
        self.resolution_damping *= 0.5;
        self.rederive();
    }

    pub fn link_consensus(&mut self, consensus_id: &str) {
        if !self.related_consensus.iter().any(|c| c == consensus_id) {
            self.related_consensus.push(consensus_id.to_string());
        }
    }

    pub fn proponents(&self) -> &[Proponent] {
        &self.proponents
    }

    pub fn participants(&self) -> Vec<String> {
        self.proponents.iter().map(|p| p.participant.clone()).collect()
    }

    pub fn position_of(&self, participant: &str) -> Option<&str> {
        self.proponents
            .iter()
            .find(|p| p.participant == participant)
            .map(|p| p.position.as_str())
    }

    /// Distinct positions in first-seen order, compared after normalization.
    pub fn distinct_positions(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut out = Vec::new();
        for p in &self.proponents {
            let key = normalize(&p.position);
            if !seen.contains(&key) {
                seen.push(key);
                out.push(p.position.clone());
            }
        }
        out
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn opposing_pairs(&self) -> &[OpposingPair] {
        &self.opposing_pairs
    }

    pub fn discussion_history(&self) -> &[DiscussionEntry] {
        &self.discussion_history
    }

    pub fn potential_resolutions(&self) -> &[String] {
        &self.potential_resolutions
    }

    pub fn resolution_attempts(&self) -> u32 {
        self.resolution_attempts
    }

    pub fn requires_debate(&self) -> bool {
        self.requires_debate
    }

    pub fn debate_requested_by(&self) -> &[String] {
        &self.debate_requested_by
    }

    pub fn resolution_damping(&self) -> f64 {
        self.resolution_damping
    }

    pub fn related_consensus(&self) -> &[String] {
        &self.related_consensus
    }

    fn upsert(&mut self, participant: &str, position: &str) -> bool {
        match self.proponents.iter_mut().find(|p| p.participant == participant) {
            Some(existing) if existing.position == position => false,
            Some(existing) => {
                existing.position = position.to_string();
                true
            }
            None => {
                self.proponents.push(Proponent {
                    participant: participant.to_string(),
                    position: position.to_string(),
                });
                true
            }
        }
    }

    fn rederive(&mut self) {
        self.opposing_pairs = self.detect_opposing_pairs();

        let mut severity = Severity::from_opposing_pairs(self.opposing_pairs.len());
        if self.requires_debate {
            severity = severity.max(Severity::High);
        }
        self.severity = severity;

        self.intensity = self.compute_intensity();
    }

    fn detect_opposing_pairs(&self) -> Vec<OpposingPair> {
        let mut pairs = Vec::new();
        for (i, a) in self.proponents.iter().enumerate() {
            for b in &self.proponents[i + 1..] {
                if normalize(&a.position) != normalize(&b.position) {
                    pairs.push(OpposingPair {
                        first: a.participant.clone(),
                        first_position: a.position.clone(),
                        second: b.participant.clone(),
                        second_position: b.position.clone(),
                    });
                }
            }
        }
        pairs
    }

    fn compute_intensity(&self) -> f64 {
        let n = self.proponents.len();
        if n == 0 {
            return 0.0;
        }
        let diversity = self.distinct_positions().len() as f64 / n as f64;
        let participation = (n as f64 / 5.0).min(1.0);
        let opposition = (self.opposing_pairs.len() as f64 / 3.0).min(1.0);
        let persistence = (self.resolution_attempts as f64 / 5.0).min(1.0);

        unit(
            (diversity * 0.35 + participation * 0.25 + opposition * 0.25 + persistence * 0.15)
                * self.resolution_damping,
        )
    }
}

fn normalize(position: &str) -> String {
    position.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_three_distinct_positions_are_critical() {
        let d = DivergencePoint::new(
            "storage engine",
            Category::Technical,
            &props(&[("A", "sql"), ("B", "nosql"), ("C", "files")]),
            1,
        );
        assert_eq!(d.opposing_pairs().len(), 3);
        assert_eq!(d.severity(), Severity::Critical);
    }

    #[test]
    fn test_positions_compared_after_normalization() {
        let d = DivergencePoint::new(
            "x",
            Category::Technical,
            &props(&[("A", " SQL "), ("B", "sql")]),
            1,
        );
        assert!(d.opposing_pairs().is_empty());
        assert_eq!(d.severity(), Severity::Low);
    }

    #[test]
    fn test_last_write_wins() {
        let mut d = DivergencePoint::new("x", Category::Technical, &props(&[("A", "yes")]), 1);
        assert!(d.add_proponent("A", "no"));
        assert!(!d.add_proponent("A", "no"));
        assert_eq!(d.proponents().len(), 1);
        assert_eq!(d.position_of("A"), Some("no"));
    }

    #[test]
    fn test_update_position_ignores_unknown() {
        let mut d = DivergencePoint::new("x", Category::Technical, &props(&[("A", "yes")]), 1);
        assert!(!d.update_position("Z", "no"));
        assert!(d.proponents().len() == 1);
    }

    #[test]
    fn test_adding_opponent_never_lowers_severity() {
        let mut d = DivergencePoint::new("x", Category::Core, &props(&[("A", "yes"), ("B", "no")]), 1);
        let mut last = d.severity();
        for (name, pos) in [("C", "maybe"), ("D", "later"), ("E", "never")] {
            d.add_proponent(name, pos);
            assert!(d.severity() >= last);
            last = d.severity();
        }
    }

    #[test]
    fn test_debate_flag_raises_severity() {
        let mut d = DivergencePoint::new("x", Category::Core, &props(&[("A", "yes"), ("B", "no")]), 1);
        assert_eq!(d.severity(), Severity::Medium);
        d.mark_for_debate("A", "needs structure");
        assert!(d.requires_debate());
        assert_eq!(d.severity(), Severity::High);
        assert_eq!(d.debate_requested_by(), &["A".to_string()]);
    }

    #[test]
    fn test_intensity_formula() {
        let d = DivergencePoint::new("x", Category::Core, &props(&[("A", "yes"), ("B", "no")]), 1);
        // diversity 1.0*.35 + 2/5*.25 + 1/3*.25
        let expected = 0.35 + 0.1 + 0.25 / 3.0;
        assert!((d.intensity() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_damping_persists() {
        let mut d = DivergencePoint::new("x", Category::Core, &props(&[("A", "yes"), ("B", "no")]), 1);
        let before = d.intensity();
        d.apply_resolution_success();
        assert!((d.intensity() - before * 0.5).abs() < 1e-9);
        d.add_proponent("C", "yes");
        assert!(d.intensity() < before);
        assert_eq!(d.resolution_damping(), 0.5);
    }

    #[test]
    fn test_resolution_attempt_logged() {
        let mut d = DivergencePoint::new("x", Category::Core, &props(&[("A", "yes"), ("B", "no")]), 1);
        let before = d.intensity();
        d.record_resolution_attempt("voting", "failed");
        assert_eq!(d.resolution_attempts(), 1);
        assert!(d.intensity() > before);
        let last = d.discussion_history().last().unwrap();
        assert_eq!(last.kind, DiscussionKind::ResolutionAttempt);
        assert_eq!(last.result.as_deref(), Some("failed"));
    }

    #[test]
    fn test_empty_divergence_is_calm() {
        let d = DivergencePoint::new("x", Category::Auxiliary, &[], 0);
        assert_eq!(d.intensity(), 0.0);
        assert_eq!(d.severity(), Severity::Low);
    }
}

//! Structured debate over a single divergence point.
//!
//! Positions are seeded from the divergence's proponents. Arguments are
//! scored as they arrive and the scores accumulate onto both the speaker and
//! the speaker's position. Synthesis ranks positions by total score.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::state::{DebatePhase, DebateState};
use crate::error::{DebateError, DebateResult};
use crate::points::DivergencePoint;

const STOPWORDS: [&str; 8] = ["the", "a", "an", "is", "are", "was", "were", "be"];

/// Rules and scoring weights for a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateRules {
    pub max_rounds: u32,
    /// Evidence items needed for full evidence strength.
    pub min_evidence_per_claim: usize,
    pub min_participants: usize,
    pub max_participants: usize,
    pub evidence_weight: f64,
    pub logic_weight: f64,
    pub persuasion_weight: f64,
    /// Word-overlap ratio above which two positions merge.
    pub merge_threshold: f64,
    /// Top score must exceed this multiple of the runner-up to win outright.
    pub clear_winner_ratio: f64,
    /// Relative gap within which the top two positions draw.
    pub draw_margin: f64,
}

impl Default for DebateRules {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            min_evidence_per_claim: 1,
            min_participants: 2,
            max_participants: 6,
            evidence_weight: 0.3,
            logic_weight: 0.4,
            persuasion_weight: 0.3,
            merge_threshold: 0.7,
            clear_winner_ratio: 1.5,
            draw_margin: 0.1,
        }
    }
}

/// A position held by one or more participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebatePosition {
    pub id: String,
    pub description: String,
    pub holders: Vec<String>,
    /// Ids of arguments made for this position.
    pub arguments: Vec<String>,
    pub total_score: f64,
}

/// An argument as submitted by a participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgumentSubmission {
    pub speaker: String,
    pub content: String,
    pub evidence: Vec<String>,
    /// Id of the argument this one rebuts.
    pub rebuts: Option<String>,
    /// Id of the argument this one supports.
    pub supports: Option<String>,
}

impl ArgumentSubmission {
    pub fn new(speaker: &str, content: &str) -> Self {
        Self {
            speaker: speaker.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    pub fn with_evidence(mut self, evidence: &[&str]) -> Self {
        self.evidence = evidence.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn rebutting(mut self, argument_id: &str) -> Self {
        self.rebuts = Some(argument_id.to_string());
        self
    }

    pub fn supporting(mut self, argument_id: &str) -> Self {
        self.supports = Some(argument_id.to_string());
        self
    }
}

/// A scored argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateArgument {
    pub id: String,
    pub speaker: String,
    pub position: String,
    pub content: String,
    pub evidence: Vec<String>,
    pub phase: DebatePhase,
    pub round: u32,
    pub rebuts: Option<String>,
    pub supports: Option<String>,
    pub evidence_strength: f64,
    pub relevance_score: f64,
    pub content_score: f64,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Classification of a finished debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateOutcome {
    ClearWinner,
    Draw,
    PartialConsensus,
    SinglePosition,
}

impl DebateOutcome {
    /// Whether the debate settled the disagreement well enough to act on.
    pub fn is_resolution(self) -> bool {
        matches!(self, Self::ClearWinner | Self::PartialConsensus)
    }
}

impl std::fmt::Display for DebateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClearWinner => write!(f, "clear_winner"),
            Self::Draw => write!(f, "draw"),
            Self::PartialConsensus => write!(f, "partial_consensus"),
            Self::SinglePosition => write!(f, "single_position"),
        }
    }
}

/// Position score in a synthesis ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPosition {
    pub position: String,
    pub description: String,
    pub score: f64,
}

/// Result of [`DebateEngine::generate_synthesis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSynthesis {
    pub outcome: DebateOutcome,
    /// Positions by descending score.
    pub ranking: Vec<RankedPosition>,
    pub common_ground: Vec<String>,
    pub recommendations: Vec<String>,
    pub participant_scores: BTreeMap<String, f64>,
    pub total_arguments: usize,
    pub total_rounds: u32,
}

impl DebateSynthesis {
    /// Description of the top-ranked position.
    pub fn leading_position(&self) -> Option<&str> {
        self.ranking.first().map(|r| r.description.as_str())
    }
}

/// Drives one debate through its phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateEngine {
    pub id: String,
    pub subject: String,
    rules: DebateRules,
    state: DebateState,
    positions: Vec<DebatePosition>,
    arguments: Vec<DebateArgument>,
    speaker_scores: BTreeMap<String, f64>,
    common_ground: Vec<String>,
    synthesis: Option<DebateSynthesis>,
}

impl DebateEngine {
    /// Prepare a debate over `divergence`. Similar positions are merged.
    pub fn new(divergence: &DivergencePoint, rules: DebateRules) -> Self {
        let mut positions: Vec<DebatePosition> = Vec::new();
        for (i, proponent) in divergence.proponents().iter().enumerate() {
            let similar = positions.iter_mut().find(|p| {
                word_overlap(&p.description, &proponent.position) > rules.merge_threshold
            });
            match similar {
                Some(existing) => existing.holders.push(proponent.participant.clone()),
                None => positions.push(DebatePosition {
                    id: format!("pos_{i}"),
                    description: proponent.position.clone(),
                    holders: vec![proponent.participant.clone()],
                    arguments: Vec::new(),
                    total_score: 0.0,
                }),
            }
        }

        Self {
            id: Uuid::new_v4().to_string(),
            subject: divergence.content.clone(),
            state: DebateState::new(rules.max_rounds),
            rules,
            positions,
            arguments: Vec::new(),
            speaker_scores: BTreeMap::new(),
            common_ground: Vec::new(),
            synthesis: None,
        }
    }

    pub fn rules(&self) -> &DebateRules {
        &self.rules
    }

    pub fn state(&self) -> &DebateState {
        &self.state
    }

    pub fn phase(&self) -> DebatePhase {
        self.state.phase
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn positions(&self) -> &[DebatePosition] {
        &self.positions
    }

    pub fn arguments(&self) -> &[DebateArgument] {
        &self.arguments
    }

    pub fn speaker_scores(&self) -> &BTreeMap<String, f64> {
        &self.speaker_scores
    }

    pub fn synthesis(&self) -> Option<&DebateSynthesis> {
        self.synthesis.as_ref()
    }

    pub fn participant_count(&self) -> usize {
        self.positions.iter().map(|p| p.holders.len()).sum()
    }

    /// Open the debate at round 1.
    pub fn start(&mut self) -> DebateResult<()> {
        let found = self.participant_count();
        if found < self.rules.min_participants {
            return Err(DebateError::NotEnoughParticipants {
                found,
                required: self.rules.min_participants,
            });
        }
        if found > self.rules.max_participants {
            return Err(DebateError::TooManyParticipants {
                found,
                allowed: self.rules.max_participants,
            });
        }
        self.state.start();
        info!(debate_id = %self.id, positions = self.positions.len(), participants = found, "Debate started");
        Ok(())
    }

    /// Move to the next phase. Advancing from `Closing` ends the debate.
    pub fn advance_phase(&mut self) -> DebateResult<DebatePhase> {
        if !self.state.active {
            return Err(DebateError::NotActive);
        }
        match self.state.phase.next() {
            Some(next) => {
                self.state.transition(next, "phase complete")?;
                match next {
                    DebatePhase::CommonGround => {
                        self.identify_common_ground();
                    }
                    DebatePhase::Synthesis => {
                        self.generate_synthesis();
                    }
                    _ => {}
                }
                debug!(debate_id = %self.id, phase = %next, round = self.state.round, "Debate phase advanced");
                Ok(next)
            }
            None => {
                self.end_debate();
                Ok(self.state.phase)
            }
        }
    }

    /// Score and record an argument.
    pub fn submit_argument(&mut self, submission: ArgumentSubmission) -> DebateResult<&DebateArgument> {
        if !self.state.active {
            return Err(DebateError::NotActive);
        }
        let position_index = self
            .positions
            .iter()
            .position(|p| p.holders.contains(&submission.speaker))
            .ok_or_else(|| DebateError::UnknownSpeaker(submission.speaker.clone()))?;

        let evidence_strength = (submission.evidence.len() as f64
            / self.rules.min_evidence_per_claim.max(1) as f64)
            .min(1.0);
        let relevance_score = if submission.rebuts.is_some() || submission.supports.is_some() {
            0.8
        } else {
            0.6
        };
        let content_score = content_score(&submission.content);
        let quality_score = evidence_strength * self.rules.evidence_weight
            + relevance_score * self.rules.logic_weight
            + content_score * self.rules.persuasion_weight;

        let id = format!("arg_{}", self.arguments.len() + 1);
        let position = &mut self.positions[position_index];
        position.arguments.push(id.clone());
        position.total_score += quality_score;
        *self
            .speaker_scores
            .entry(submission.speaker.clone())
            .or_insert(0.0) += quality_score;

        debug!(debate_id = %self.id, argument_id = %id, speaker = %submission.speaker, quality_score, "Argument submitted");
        self.arguments.push(DebateArgument {
            id,
            speaker: submission.speaker,
            position: position.id.clone(),
            content: submission.content,
            evidence: submission.evidence,
            phase: self.state.phase,
            round: self.state.round,
            rebuts: submission.rebuts,
            supports: submission.supports,
            evidence_strength,
            relevance_score,
            content_score,
            quality_score,
            created_at: Utc::now(),
        });
        let last = self.arguments.len() - 1;
        Ok(&self.arguments[last])
    }

    /// Who speaks, in order, during the current phase.
    pub fn speaker_order(&self) -> Vec<String> {
        let all: Vec<String> = self
            .positions
            .iter()
            .flat_map(|p| p.holders.iter().cloned())
            .collect();

        match self.state.phase {
            DebatePhase::CrossExamination => {
                let positions = &self.positions;
                let longest = positions.iter().map(|p| p.holders.len()).max().unwrap_or(0);
                (0..longest)
                    .flat_map(|i| positions.iter().filter_map(move |p| p.holders.get(i).cloned()))
                    .collect()
            }
            DebatePhase::Rebuttal => {
                let mut scored: Vec<(String, f64)> = all
                    .into_iter()
                    .map(|s| {
                        let score = self.speaker_scores.get(&s).copied().unwrap_or(0.0);
                        (s, score)
                    })
                    .collect();
                scored.sort_by(|a, b| a.1.total_cmp(&b.1));
                scored.into_iter().map(|(s, _)| s).collect()
            }
            _ => all,
        }
    }

    /// Shared vocabulary across positions plus arguments backed by several speakers.
    pub fn identify_common_ground(&mut self) -> &[String] {
        let mut found = Vec::new();

        let mut keywords: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for argument in &self.arguments {
            keywords
                .entry(argument.position.as_str())
                .or_default()
                .extend(argument.content.split_whitespace().map(str::to_lowercase));
        }
        if keywords.len() >= 2 {
            let mut sets = keywords.values();
            if let Some(first) = sets.next() {
                let shared: Vec<String> = first
                    .iter()
                    .filter(|w| !STOPWORDS.contains(&w.as_str()))
                    .filter(|w| keywords.values().all(|set| set.contains(*w)))
                    .take(10)
                    .cloned()
                    .collect();
                if !shared.is_empty() {
                    found.push(format!("shared focus: {}", shared.join(", ")));
                }
            }
        }

        let mut supporters: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for argument in &self.arguments {
            if let Some(target) = argument.supports.as_deref() {
                supporters.entry(target).or_default().insert(argument.speaker.as_str());
            }
        }
        for (target, speakers) in supporters {
            if speakers.len() >= 2 {
                found.push(format!("argument {target} supported by {} speakers", speakers.len()));
            }
        }

        self.common_ground = found;
        &self.common_ground
    }

    /// Rank positions and classify the outcome.
    pub fn generate_synthesis(&mut self) -> &DebateSynthesis {
        let mut ranking: Vec<RankedPosition> = self
            .positions
            .iter()
            .map(|p| RankedPosition {
                position: p.id.clone(),
                description: p.description.clone(),
                score: p.total_score,
            })
            .collect();
        ranking.sort_by(|a, b| b.score.total_cmp(&a.score));

        let outcome = match ranking.as_slice() {
            [top, second, ..] => {
                let margin = self.rules.draw_margin * top.score.max(second.score);
                if top.score > second.score * self.rules.clear_winner_ratio {
                    DebateOutcome::ClearWinner
                } else if (top.score - second.score).abs() <= margin {
                    // Includes two empty positions: nothing was argued.
                    DebateOutcome::Draw
                } else {
                    DebateOutcome::PartialConsensus
                }
            }
            _ => DebateOutcome::SinglePosition,
        };

        let mut recommendations = Vec::new();
        match outcome {
            DebateOutcome::ClearWinner => {
                if let Some(top) = ranking.first() {
                    recommendations.push(format!("adopt position: {}", top.description));
                }
            }
            DebateOutcome::Draw => {
                recommendations.push("continue discussion or seek outside expertise".to_string());
            }
            DebateOutcome::PartialConsensus => {
                recommendations.push("merge the strongest elements of each position".to_string());
            }
            DebateOutcome::SinglePosition => {}
        }
        if !self.common_ground.is_empty() {
            recommendations.push(format!(
                "build consensus on common ground: {}",
                self.common_ground.join("; ")
            ));
        }

        info!(debate_id = %self.id, outcome = %outcome, arguments = self.arguments.len(), "Debate synthesis generated");
        self.synthesis.insert(DebateSynthesis {
            outcome,
            ranking,
            common_ground: self.common_ground.clone(),
            recommendations,
            participant_scores: self.speaker_scores.clone(),
            total_arguments: self.arguments.len(),
            total_rounds: self.state.round,
        })
    }

    /// End the debate, computing the synthesis if it does not exist yet.
    pub fn end_debate(&mut self) -> DebateSynthesis {
        self.state.finish();
        if self.synthesis.is_none() {
            self.identify_common_ground();
            self.generate_synthesis();
        }
        match &self.synthesis {
            Some(synthesis) => synthesis.clone(),
            None => self.generate_synthesis().clone(),
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "{} | {} positions | {} arguments",
            self.state.status_line(),
            self.positions.len(),
            self.arguments.len()
        )
    }
}

/// `|a ∩ b| / min(|a|, |b|)` over lowercase words.
fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: BTreeSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: BTreeSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    let smaller = words_a.len().min(words_b.len());
    if smaller == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / smaller as f64
}

fn content_score(content: &str) -> f64 {
    match content.chars().count() {
        n if n < 50 => 0.4,
        n if n <= 200 => 0.7,
        n if n <= 500 => 0.9,
        _ => 0.8,
    }
}

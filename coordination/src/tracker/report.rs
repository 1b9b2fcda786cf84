//! Consensus report structures and the pure scoring helpers behind them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{AggregationStrategy, CorrelationStatistics, PointContribution};
use crate::decay::DecayStatistics;
use crate::dependency::HierarchyLevel;
use crate::points::{unit, Category, Priority, ResolutionStrategy, Severity};
use crate::weights::DiscussionPhase;

/// Weighted level per hierarchy tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyAnalysis {
    pub core_level: f64,
    pub strategic_level: f64,
    pub tactical_level: f64,
    pub technical_level: f64,
    /// Procedural and auxiliary combined.
    pub secondary_level: f64,
}

impl HierarchyAnalysis {
    pub fn contribution(&self) -> f64 {
        self.core_level
            + self.strategic_level
            + self.tactical_level
            + self.technical_level
            + self.secondary_level
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiDimensionScores {
    pub strength: f64,
    pub convergence: f64,
    pub breadth: f64,
    pub stability: f64,
    pub aggregated: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryDirection {
    Rising,
    Declining,
    Stable,
}

impl std::fmt::Display for TrajectoryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub direction: TrajectoryDirection,
    /// Predicted levels for the next three rounds.
    pub predicted_levels: Vec<f64>,
    pub confidence: f64,
}

impl Trajectory {
    /// Extrapolate three rounds from the current level and momentum.
    pub fn predict(current: f64, momentum: f64) -> Self {
        let step = |i: usize| (i + 1) as f64 * 0.05 * momentum;
        let (direction, predicted_levels) = if momentum > 0.1 {
            (
                TrajectoryDirection::Rising,
                (0..3).map(|i| (current + step(i)).min(1.0)).collect(),
            )
        } else if momentum < -0.1 {
            (
                TrajectoryDirection::Declining,
                (0..3).map(|i| (current + step(i)).max(0.0)).collect(),
            )
        } else {
            (TrajectoryDirection::Stable, vec![current; 3])
        };
        let m = momentum.abs();
        Self {
            direction,
            predicted_levels,
            confidence: (0.5 + 0.3 * m + 0.2 * (1.0 - m)).min(0.95),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusTrend {
    Improving,
    Declining,
    Stable,
}

impl ConsensusTrend {
    /// Compare the mean of the last three strengths with the first three.
    pub fn from_strengths(strengths: &[f64]) -> Self {
        if strengths.len() < 2 {
            return Self::Stable;
        }
        let take = strengths.len().min(3);
        let early = mean(&strengths[..take]);
        let recent = mean(&strengths[strengths.len() - take..]);
        if recent > early * 1.1 {
            Self::Improving
        } else if recent < early * 0.9 {
            Self::Declining
        } else {
            Self::Stable
        }
    }
}

impl std::fmt::Display for ConsensusTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Per-category breakdown of consensus points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub raw_average: f64,
    pub decayed_average: f64,
    pub stability_average: f64,
    pub point_count: usize,
    /// Points with strength above 0.7.
    pub strong_points: usize,
    /// Points with strength below 0.4.
    pub weak_points: usize,
    /// Unique supporters across the category.
    pub total_supporters: usize,
}

/// A divergence that should go to structured resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRequirement {
    pub divergence_id: String,
    pub content: String,
    pub category: Category,
    pub severity: Severity,
    pub intensity: f64,
    pub opposing_pairs: usize,
    pub participants: Vec<String>,
    pub suggested_strategy: ResolutionStrategy,
    pub priority: Priority,
}

/// Result of one `calculate_overall_consensus` call. Contains no wall-clock
/// data, so equal tracker states produce equal reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub overall_level: f64,
    pub consensus_count: usize,
    pub divergence_count: usize,
    pub round: u32,
    pub discussion_phase: DiscussionPhase,
    pub aggregation_strategy: AggregationStrategy,
    pub hierarchy_analysis: HierarchyAnalysis,
    pub divergence_penalty: f64,
    pub weighted_divergence_intensity: f64,
    pub multi_dimension_scores: MultiDimensionScores,
    pub momentum: f64,
    pub trajectory: Trajectory,
    pub detailed_hierarchy: BTreeMap<Category, CategoryBreakdown>,
    pub hierarchy_dependency_summary: BTreeMap<HierarchyLevel, Vec<String>>,
    pub decay_statistics: DecayStatistics,
    pub correlation_statistics: CorrelationStatistics,
    pub point_contributions: BTreeMap<String, PointContribution>,
    pub debate_required: Vec<DebateRequirement>,
    pub analysis: String,
    pub consensus_trend: ConsensusTrend,
    pub confidence_level: f64,
}

/// One row of the consensus history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub round: u32,
    pub overall_level: f64,
    pub phase: DiscussionPhase,
    pub strategy: AggregationStrategy,
    pub consensus_count: usize,
    pub divergence_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSummary {
    pub id: String,
    pub content: String,
    pub category: Category,
    pub priority: Priority,
    pub strength: f64,
    pub peak_strength: f64,
    pub supporters: Vec<String>,
    pub evidence_count: usize,
    pub verification_count: u32,
    pub round_created: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceSummary {
    pub id: String,
    pub content: String,
    pub category: Category,
    pub intensity: f64,
    pub severity: Severity,
    pub positions: BTreeMap<String, String>,
    pub opposing_pairs: usize,
    pub requires_debate: bool,
    pub resolution_attempts: u32,
}

/// Compact view returned by `Tracker::consensus_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub consensus_points_count: usize,
    pub divergence_points_count: usize,
    pub overall_level: f64,
    pub core_level: f64,
    pub strategic_level: f64,
    pub consensus_trend: ConsensusTrend,
    /// Points with strength above 0.7.
    pub strong_consensus: Vec<PointSummary>,
    /// Divergences with intensity above 0.7.
    pub intense_divergences: Vec<DivergenceSummary>,
    pub debate_required: Vec<DebateRequirement>,
}

/// Full report with point details, returned by
/// `Tracker::generate_consensus_report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullReport {
    pub summary: ConsensusReport,
    pub consensus_points: Vec<PointSummary>,
    pub divergence_points: Vec<DivergenceSummary>,
    pub rounds_completed: u32,
    pub generated_at: DateTime<Utc>,
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn population_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    mean(&values.iter().map(|v| (v - m).powi(2)).collect::<Vec<_>>())
}

/// Stability of one point from its per-round strength history.
pub(crate) fn stability_score(strength: f64, history: &[f64]) -> f64 {
    if history.len() < 2 {
        return strength;
    }
    let recent = &history[history.len().saturating_sub(3)..];
    let steadiness = (1.0 - population_variance(recent) * 10.0).max(0.0);
    unit(strength * 0.7 + steadiness * strength * 0.3)
}

/// `1 - coefficient of variation` over strengths.
pub(crate) fn convergence(strengths: &[f64]) -> f64 {
    match strengths.len() {
        0 => 0.0,
        1 => 1.0,
        _ => {
            let m = mean(strengths);
            if m <= 0.0 {
                return 0.0;
            }
            let cv = population_variance(strengths).sqrt() / m;
            unit(1.0 - cv)
        }
    }
}

/// Relative change between the halves of the last five levels.
pub(crate) fn momentum(levels: &[f64]) -> f64 {
    if levels.len() < 2 {
        return 0.0;
    }
    let recent = &levels[levels.len().saturating_sub(5)..];
    let (first, second) = recent.split_at(recent.len() / 2);
    let first = mean(first);
    if first == 0.0 {
        return 0.0;
    }
    ((mean(second) - first) / first).clamp(-1.0, 1.0)
}

/// Human readable summary of a report.
pub(crate) fn analysis_text(
    overall: f64,
    hierarchy: &HierarchyAnalysis,
    penalty: f64,
    momentum: f64,
) -> String {
    let mut parts = vec![match overall {
        l if l >= 0.8 => "strong consensus reached".to_string(),
        l if l >= 0.6 => "substantial consensus with minor open points".to_string(),
        l if l >= 0.4 => "partial consensus; key questions remain open".to_string(),
        l if l >= 0.2 => "weak consensus; positions are still far apart".to_string(),
        _ => "little or no consensus".to_string(),
    }];
    if hierarchy.core_level > 0.2 {
        parts.push("core questions are largely agreed".to_string());
    } else if hierarchy.core_level == 0.0 {
        parts.push("no agreement on core questions yet".to_string());
    }
    if hierarchy.strategic_level > 0.15 {
        parts.push("strategic direction is aligned".to_string());
    }
    if penalty > 0.1 {
        parts.push(format!("open divergences reduce the level by {penalty:.2}"));
    }
    if momentum > 0.1 {
        parts.push("consensus is building".to_string());
    } else if momentum < -0.1 {
        parts.push("consensus is eroding".to_string());
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_short_history_is_strength() {
        assert_eq!(stability_score(0.6, &[0.6]), 0.6);
    }

    #[test]
    fn test_stability_steady_history_is_full() {
        let s = stability_score(0.5, &[0.5, 0.5, 0.5]);
        assert!((s - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stability_noisy_history_is_lower() {
        let s = stability_score(0.5, &[0.1, 0.9, 0.1]);
        assert!((s - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_convergence_edges() {
        assert_eq!(convergence(&[]), 0.0);
        assert_eq!(convergence(&[0.3]), 1.0);
        assert_eq!(convergence(&[0.0, 0.0]), 0.0);
        assert!((convergence(&[0.5, 0.5]) - 1.0).abs() < 1e-12);
        assert!(convergence(&[0.1, 0.9]) < 0.5);
    }

    #[test]
    fn test_momentum_halves() {
        assert_eq!(momentum(&[0.5]), 0.0);
        assert!((momentum(&[0.4, 0.6]) - 0.5).abs() < 1e-12);
        assert_eq!(momentum(&[0.0, 0.6]), 0.0);
        assert_eq!(momentum(&[0.1, 0.9]), 1.0);
        // Only the last five levels count: halves [0.2, 0.2] and [0.2, 0.2, 0.2].
        assert_eq!(momentum(&[0.9, 0.2, 0.2, 0.2, 0.2, 0.2]), 0.0);
    }

    #[test]
    fn test_trajectory_directions() {
        let rising = Trajectory::predict(0.98, 0.5);
        assert_eq!(rising.direction, TrajectoryDirection::Rising);
        assert_eq!(rising.predicted_levels.len(), 3);
        assert!(rising.predicted_levels.iter().all(|l| *l <= 1.0));

        let falling = Trajectory::predict(0.01, -1.0);
        assert_eq!(falling.direction, TrajectoryDirection::Declining);
        assert_eq!(falling.predicted_levels[2], 0.0);

        let flat = Trajectory::predict(0.4, 0.05);
        assert_eq!(flat.predicted_levels, vec![0.4; 3]);
        assert!(flat.confidence <= 0.95);
    }

    #[test]
    fn test_trend_from_strengths() {
        assert_eq!(ConsensusTrend::from_strengths(&[0.5]), ConsensusTrend::Stable);
        assert_eq!(
            ConsensusTrend::from_strengths(&[0.2, 0.2, 0.2, 0.8, 0.8, 0.8]),
            ConsensusTrend::Improving
        );
        assert_eq!(
            ConsensusTrend::from_strengths(&[0.8, 0.8, 0.8, 0.2]),
            ConsensusTrend::Declining
        );
    }

    #[test]
    fn test_analysis_mentions_penalty() {
        let text = analysis_text(0.45, &HierarchyAnalysis::default(), 0.2, 0.0);
        assert!(text.starts_with("partial consensus"));
        assert!(text.contains("no agreement on core"));
        assert!(text.contains("0.20"));
    }
}

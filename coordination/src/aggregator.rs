//! Correlation-aware aggregation of per-point consensus scores.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::points::{unit, ConsensusPoint};
use crate::weights::DiscussionPhase;

/// How adjusted scores are combined into one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    WeightedAverage,
    HarmonicMean,
    GeometricMean,
    PowerMean,
    Owa,
    MinMaxBounded,
}

impl AggregationStrategy {
    pub fn for_phase(phase: DiscussionPhase) -> Self {
        match phase {
            DiscussionPhase::Exploration => Self::WeightedAverage,
            DiscussionPhase::Deepening => Self::PowerMean,
            DiscussionPhase::Convergence => Self::Owa,
            DiscussionPhase::Finalization => Self::MinMaxBounded,
        }
    }
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeightedAverage => write!(f, "weighted_average"),
            Self::HarmonicMean => write!(f, "harmonic_mean"),
            Self::GeometricMean => write!(f, "geometric_mean"),
            Self::PowerMean => write!(f, "power_mean"),
            Self::Owa => write!(f, "owa"),
            Self::MinMaxBounded => write!(f, "min_max_bounded"),
        }
    }
}

/// Aggregation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Force one strategy instead of selecting by phase.
    pub strategy_override: Option<AggregationStrategy>,
    pub power_exponent: f64,
    pub min_max_alpha: f64,
    /// Rank weights for OWA; `None` uses the linear default.
    pub owa_weights: Option<Vec<f64>>,
    /// Correlations at or above this discount both points.
    pub correlation_threshold: f64,
    pub discount_per_correlation: f64,
    pub max_discount: f64,
    /// Correlations at or below this are not stored.
    pub min_stored_correlation: f64,
    /// Round distance at which temporal correlation reaches zero.
    pub temporal_window: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            strategy_override: None,
            power_exponent: 2.0,
            min_max_alpha: 0.2,
            owa_weights: None,
            correlation_threshold: 0.3,
            discount_per_correlation: 0.15,
            max_discount: 0.5,
            min_stored_correlation: 0.1,
            temporal_window: 5,
        }
    }
}

/// Stored correlation between two consensus points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub first: String,
    pub second: String,
    pub value: f64,
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
}

/// Per-point breakdown of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointContribution {
    pub score: f64,
    pub base_weight: f64,
    pub adjusted_weight: f64,
    /// `score × base_weight`.
    pub independent: f64,
    /// `score × adjusted_weight`.
    pub discounted: f64,
}

/// Result of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOutcome {
    pub value: f64,
    pub strategy: AggregationStrategy,
    pub contributions: BTreeMap<String, PointContribution>,
}

/// Summary of stored correlations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStatistics {
    pub pairs: usize,
    pub significant_pairs: usize,
    pub mean: f64,
    pub max: f64,
}

/// Aggregator holding the latest correlation set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusAggregator {
    config: AggregationConfig,
    correlations: Vec<Correlation>,
}

impl ConsensusAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            correlations: Vec::new(),
        }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn correlations(&self) -> &[Correlation] {
        &self.correlations
    }

    /// Strategy for `phase`, honouring the configured override.
    pub fn select_strategy(&self, phase: DiscussionPhase) -> AggregationStrategy {
        self.config
            .strategy_override
            .unwrap_or_else(|| AggregationStrategy::for_phase(phase))
    }

    /// Correlation between two ids; 1.0 for identical ids, 0.0 when unknown.
    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.correlations
            .iter()
            .find(|c| (c.first == a && c.second == b) || (c.first == b && c.second == a))
            .map(|c| c.value)
            .unwrap_or(0.0)
    }

    /// Replace the correlation set with every pair among `points`.
    pub fn compute_all_correlations(&mut self, points: &[(String, &ConsensusPoint)]) {
        self.correlations.clear();
        let now = Utc::now();
        for (i, (id_a, a)) in points.iter().enumerate() {
            for (id_b, b) in &points[i + 1..] {
                let semantic = jaccard(&a.topic_keywords, &b.topic_keywords);
                let supporter = jaccard(a.supporters(), b.supporters());
                let temporal = self.temporal(a.round_created, b.round_created);
                let value = semantic * 0.4 + supporter * 0.4 + temporal * 0.2;
                if value > self.config.min_stored_correlation {
                    self.correlations.push(Correlation {
                        first: id_a.clone(),
                        second: id_b.clone(),
                        value,
                        confidence: ((semantic + supporter) / 2.0 + 0.3).min(1.0),
                        computed_at: now,
                    });
                }
            }
        }
        debug!(points = points.len(), stored = self.correlations.len(), "Correlations computed");
    }

    /// Aggregate `scores` (base weight 1.0 each) with correlation discounting.
    pub fn aggregate(
        &self,
        scores: &BTreeMap<String, f64>,
        strategy: AggregationStrategy,
    ) -> AggregationOutcome {
        let adjusted = self.adjusted_weights(scores);
        let value = if scores.is_empty() {
            0.0
        } else {
            match strategy {
                AggregationStrategy::WeightedAverage => weighted_average(scores, &adjusted),
                AggregationStrategy::HarmonicMean => harmonic_mean(scores, &adjusted),
                AggregationStrategy::GeometricMean => geometric_mean(scores, &adjusted),
                AggregationStrategy::PowerMean => {
                    power_mean(scores, &adjusted, self.config.power_exponent)
                }
                AggregationStrategy::Owa => owa(scores, self.config.owa_weights.as_deref()),
                AggregationStrategy::MinMaxBounded => {
                    min_max_bounded(scores, &adjusted, self.config.min_max_alpha)
                }
            }
        };

        let contributions = scores
            .iter()
            .map(|(id, &score)| {
                let adjusted_weight = adjusted.get(id).copied().unwrap_or(1.0);
                (
                    id.clone(),
                    PointContribution {
                        score,
                        base_weight: 1.0,
                        adjusted_weight,
                        independent: score,
                        discounted: score * adjusted_weight,
                    },
                )
            })
            .collect();

        AggregationOutcome {
            value: unit(value),
            strategy,
            contributions,
        }
    }

    pub fn statistics(&self) -> CorrelationStatistics {
        let values: Vec<f64> = self.correlations.iter().map(|c| c.value).collect();
        CorrelationStatistics {
            pairs: values.len(),
            significant_pairs: values
                .iter()
                .filter(|v| v.abs() >= self.config.correlation_threshold)
                .count(),
            mean: if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            },
            max: values.iter().copied().fold(0.0, f64::max),
        }
    }

    fn temporal(&self, a: u32, b: u32) -> f64 {
        let window = self.config.temporal_window;
        let diff = a.abs_diff(b);
        if window == 0 || diff >= window {
            0.0
        } else {
            1.0 - diff as f64 / window as f64
        }
    }

    fn adjusted_weights(&self, scores: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        scores
            .keys()
            .map(|id| {
                let total: f64 = scores
                    .keys()
                    .filter(|other| *other != id)
                    .map(|other| self.correlation(id, other).abs())
                    .filter(|c| *c >= self.config.correlation_threshold)
                    .sum();
                let reduction = (total * self.config.discount_per_correlation)
                    .min(self.config.max_discount);
                (id.clone(), 1.0 - reduction)
            })
            .collect()
    }
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        0.0
    } else {
        a.intersection(&b).count() as f64 / union as f64
    }
}

fn weight(weights: &BTreeMap<String, f64>, id: &str) -> f64 {
    weights.get(id).copied().unwrap_or(1.0)
}

fn weighted_average(scores: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>) -> f64 {
    let total_weight: f64 = scores.keys().map(|k| weight(weights, k)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    scores.iter().map(|(k, v)| v * weight(weights, k)).sum::<f64>() / total_weight
}

fn harmonic_mean(scores: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>) -> f64 {
    let positive: Vec<(&String, f64)> = scores.iter().filter(|(_, v)| **v > 0.0).map(|(k, v)| (k, *v)).collect();
    let total_weight: f64 = positive.iter().map(|(k, _)| weight(weights, k)).sum();
    let denominator: f64 = positive.iter().map(|(k, v)| weight(weights, k) / v).sum();
    if total_weight <= 0.0 || denominator <= 0.0 {
        return 0.0;
    }
    total_weight / denominator
}

fn geometric_mean(scores: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>) -> f64 {
    let positive: Vec<(&String, f64)> = scores.iter().filter(|(_, v)| **v > 0.0).map(|(k, v)| (k, *v)).collect();
    let total_weight: f64 = positive.iter().map(|(k, _)| weight(weights, k)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let log_sum: f64 = positive.iter().map(|(k, v)| weight(weights, k) * v.ln()).sum();
    (log_sum / total_weight).exp()
}

fn power_mean(scores: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>, power: f64) -> f64 {
    if power == 0.0 {
        return geometric_mean(scores, weights);
    }
    let positive: Vec<(&String, f64)> = scores.iter().filter(|(_, v)| **v > 0.0).map(|(k, v)| (k, *v)).collect();
    let total_weight: f64 = positive.iter().map(|(k, _)| weight(weights, k)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let sum: f64 = positive.iter().map(|(k, v)| weight(weights, k) * v.powf(power)).sum();
    (sum / total_weight).powf(1.0 / power)
}

fn owa(scores: &BTreeMap<String, f64>, rank_weights: Option<&[f64]>) -> f64 {
    let mut sorted: Vec<f64> = scores.values().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let n = sorted.len();
    let weights: Vec<f64> = match rank_weights {
        Some(given) => (0..n).map(|i| given.get(i).copied().unwrap_or(0.0)).collect(),
        None => {
            let total = (n * (n + 1) / 2) as f64;
            (0..n).map(|i| (n - i) as f64 / total).collect()
        }
    };
    sorted.iter().zip(weights).map(|(v, w)| v * w).sum()
}

fn min_max_bounded(scores: &BTreeMap<String, f64>, weights: &BTreeMap<String, f64>, alpha: f64) -> f64 {
    let min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = weighted_average(scores, weights);
    (1.0 - 2.0 * alpha) * avg + alpha * min + alpha * max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Category;

    const ALL: [AggregationStrategy; 6] = [
        AggregationStrategy::WeightedAverage,
        AggregationStrategy::HarmonicMean,
        AggregationStrategy::GeometricMean,
        AggregationStrategy::PowerMean,
        AggregationStrategy::Owa,
        AggregationStrategy::MinMaxBounded,
    ];

    fn scores(values: &[f64]) -> BTreeMap<String, f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("consensus_{i}"), *v))
            .collect()
    }

    fn point(supporters: &[&str], round: u32) -> ConsensusPoint {
        let s: Vec<String> = supporters.iter().map(|x| x.to_string()).collect();
        ConsensusPoint::new("use caching", Category::Core, &s, round)
    }

    #[test]
    fn test_strategies_stay_in_unit_range() {
        let agg = ConsensusAggregator::default();
        for input in [vec![0.0, 1.0], vec![0.2, 0.4, 0.9], vec![1.0, 1.0, 1.0], vec![0.0]] {
            for strategy in ALL {
                let v = agg.aggregate(&scores(&input), strategy).value;
                assert!((0.0..=1.0).contains(&v), "{strategy} gave {v}");
            }
        }
    }

    #[test]
    fn test_empty_scores() {
        let agg = ConsensusAggregator::default();
        let out = agg.aggregate(&BTreeMap::new(), AggregationStrategy::Owa);
        assert_eq!(out.value, 0.0);
        assert!(out.contributions.is_empty());
    }

    #[test]
    fn test_known_values() {
        let agg = ConsensusAggregator::default();
        let s = scores(&[0.2, 0.8]);
        let avg = agg.aggregate(&s, AggregationStrategy::WeightedAverage).value;
        assert!((avg - 0.5).abs() < 1e-12);
        let harmonic = agg.aggregate(&s, AggregationStrategy::HarmonicMean).value;
        assert!((harmonic - 0.32).abs() < 1e-12);
        let geometric = agg.aggregate(&s, AggregationStrategy::GeometricMean).value;
        assert!((geometric - 0.4).abs() < 1e-12);
        // OWA default weights 2/3, 1/3 over [0.8, 0.2]
        let owa = agg.aggregate(&s, AggregationStrategy::Owa).value;
        assert!((owa - 0.6).abs() < 1e-12);
        let bounded = agg.aggregate(&s, AggregationStrategy::MinMaxBounded).value;
        assert!((bounded - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_scores_skipped_by_means() {
        let agg = ConsensusAggregator::default();
        let s = scores(&[0.0, 0.2, 0.8]);
        let harmonic = agg.aggregate(&s, AggregationStrategy::HarmonicMean).value;
        assert!((harmonic - 0.32).abs() < 1e-12);
        let geometric = agg.aggregate(&s, AggregationStrategy::GeometricMean).value;
        assert!((geometric - 0.4).abs() < 1e-12);
        let avg = agg.aggregate(&s, AggregationStrategy::WeightedAverage).value;
        assert!((avg - 1.0 / 3.0).abs() < 1e-12);

        let zeros = scores(&[0.0, 0.0]);
        for strategy in [
            AggregationStrategy::HarmonicMean,
            AggregationStrategy::GeometricMean,
            AggregationStrategy::PowerMean,
        ] {
            assert_eq!(agg.aggregate(&zeros, strategy).value, 0.0);
        }
    }

    #[test]
    fn test_owa_pads_short_weights() {
        let agg = ConsensusAggregator::new(AggregationConfig {
            owa_weights: Some(vec![1.0]),
            ..Default::default()
        });
        let v = agg.aggregate(&scores(&[0.3, 0.9, 0.1]), AggregationStrategy::Owa).value;
        assert!((v - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_correlated_pair_is_discounted() {
        let a = point(&["A", "B"], 1);
        let b = point(&["A", "B", "C"], 1);
        let mut agg = ConsensusAggregator::default();
        agg.compute_all_correlations(&[("consensus_0".into(), &a), ("consensus_1".into(), &b)]);
        let corr = agg.correlation("consensus_0", "consensus_1");
        assert!(corr >= 0.3, "correlation {corr}");

        let out = agg.aggregate(&scores(&[0.6, 0.7]), AggregationStrategy::WeightedAverage);
        let independent: f64 = out.contributions.values().map(|c| c.independent).sum();
        let discounted: f64 = out.contributions.values().map(|c| c.discounted).sum();
        assert!(discounted < independent);
    }

    #[test]
    fn test_distant_rounds_weakly_correlated() {
        let a = point(&["A"], 1);
        let b = point(&["B"], 9);
        let mut agg = ConsensusAggregator::default();
        agg.compute_all_correlations(&[("x".into(), &a), ("y".into(), &b)]);
        assert!(agg.correlations().is_empty());
        assert_eq!(agg.correlation("x", "x"), 1.0);
        assert_eq!(agg.statistics().pairs, 0);
    }

    #[test]
    fn test_phase_strategy_and_override() {
        let agg = ConsensusAggregator::default();
        assert_eq!(agg.select_strategy(DiscussionPhase::Convergence), AggregationStrategy::Owa);
        let forced = ConsensusAggregator::new(AggregationConfig {
            strategy_override: Some(AggregationStrategy::HarmonicMean),
            ..Default::default()
        });
        assert_eq!(forced.select_strategy(DiscussionPhase::Exploration), AggregationStrategy::HarmonicMean);
    }
}

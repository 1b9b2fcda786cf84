//! Adaptive decay of consensus strength over rounds.
//!
//! The multiplier for a point is built in stages:
//!
//! ```text
//!   mode_fn(t, rate)            t = rounds since creation, capped
//!        │
//!        ├─ + activation recovery   (activated within the window)
//!        ├─ max(·, peak × ratio)    (peak protection)
//!        ├─ + evidence bonus
//!        └─ + verification bonus  → clamp [0, 1]
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::points::{unit, Category, CategoryWeights, ConsensusPoint};

/// Shape of the decay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    Exponential,
    Logarithmic,
    InverseSqrt,
    Linear,
}

impl DecayMode {
    /// Default curve for a category.
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Core | Category::Strategic => Self::Logarithmic,
            Category::Technical | Category::Tactical => Self::Exponential,
            Category::Procedural | Category::Auxiliary => Self::Linear,
        }
    }

    /// Evaluate the curve at `t` rounds with retention `rate`.
    pub fn apply(self, t: f64, rate: f64) -> f64 {
        let loss = 1.0 - rate;
        match self {
            Self::Exponential => rate.powf(t),
            Self::Logarithmic => 1.0 / (1.0 + (1.0 + t * loss).ln()),
            Self::InverseSqrt => 1.0 / (1.0 + t * loss).sqrt(),
            Self::Linear => (1.0 - t * loss).max(0.0),
        }
    }
}

impl std::fmt::Display for DecayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exponential => write!(f, "exponential"),
            Self::Logarithmic => write!(f, "logarithmic"),
            Self::InverseSqrt => write!(f, "inverse_sqrt"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Direction of a point's recent decay factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayTrend {
    Recovering,
    Declining,
    Stable,
}

impl std::fmt::Display for DecayTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recovering => write!(f, "recovering"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// Decay tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Per-category retention rate. Higher decays slower.
    pub rates: CategoryWeights,
    /// Rounds beyond this are treated as this many.
    pub max_rounds: u32,
    /// Fraction of peak strength that is never lost.
    pub peak_protection_ratio: f64,
    /// Rounds after an activation during which recovery applies.
    pub activation_window: u32,
    pub activation_bonus: f64,
    pub evidence_bonus_per_item: f64,
    pub evidence_bonus_cap: f64,
    pub verification_bonus_per_item: f64,
    pub verification_bonus_cap: f64,
    /// Decay records kept per point.
    pub history_limit: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            rates: CategoryWeights::new(0.98, 0.95, 0.90, 0.92, 0.88, 0.85),
            max_rounds: 30,
            peak_protection_ratio: 0.4,
            activation_window: 3,
            activation_bonus: 0.3,
            evidence_bonus_per_item: 0.06,
            evidence_bonus_cap: 0.25,
            verification_bonus_per_item: 0.04,
            verification_bonus_cap: 0.2,
            history_limit: 20,
        }
    }
}

/// One decay evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayRecord {
    pub round: u32,
    pub strength: f64,
    pub factor: f64,
    /// Whether activation recovery contributed.
    pub activated: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view over all tracked decay histories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayStatistics {
    pub tracked_points: usize,
    pub average_latest_factor: f64,
    pub recovering: usize,
    pub declining: usize,
    pub stable: usize,
}

/// Decay model with per-point history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptiveDecayModel {
    config: DecayConfig,
    histories: BTreeMap<String, Vec<DecayRecord>>,
}

impl AdaptiveDecayModel {
    pub fn new(config: DecayConfig) -> Self {
        Self {
            config,
            histories: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// Multiplier for `point` at `current_round` without touching history.
    pub fn factor(&self, point: &ConsensusPoint, current_round: u32) -> f64 {
        self.evaluate(point, current_round).0
    }

    /// Multiplier for `point`, appending a history record keyed by `id`.
    pub fn calculate(&mut self, id: &str, point: &ConsensusPoint, current_round: u32) -> f64 {
        if current_round <= point.round_created {
            return 1.0;
        }
        let (factor, activated) = self.evaluate(point, current_round);

        let limit = self.config.history_limit;
        let history = self.histories.entry(id.to_string()).or_default();
        history.push(DecayRecord {
            round: current_round,
            strength: point.strength(),
            factor,
            activated,
            timestamp: Utc::now(),
        });
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }

        debug!(point_id = id, round = current_round, factor, activated, "Decay evaluated");
        factor
    }

    /// Strength after decay, never below the protected share of the peak.
    pub fn decayed_strength(&self, point: &ConsensusPoint, factor: f64) -> f64 {
        let floor = point.protected_minimum(self.config.peak_protection_ratio);
        unit((point.strength() * factor).max(floor))
    }

    pub fn history(&self, id: &str) -> &[DecayRecord] {
        self.histories.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn histories(&self) -> &BTreeMap<String, Vec<DecayRecord>> {
        &self.histories
    }

    /// Trend of the last five factors recorded for `id`.
    pub fn trend(&self, id: &str) -> DecayTrend {
        let history = self.history(id);
        if history.len() < 3 {
            return DecayTrend::Stable;
        }
        let recent: Vec<f64> = history.iter().rev().take(5).rev().map(|r| r.factor).collect();
        let split = recent.len() - 2;
        let earlier = mean(&recent[..split]);
        let latest = mean(&recent[split..]);

        if earlier <= 0.0 {
            return if latest > 0.0 {
                DecayTrend::Recovering
            } else {
                DecayTrend::Stable
            };
        }
        if latest > earlier * 1.1 {
            DecayTrend::Recovering
        } else if latest < earlier * 0.9 {
            DecayTrend::Declining
        } else {
            DecayTrend::Stable
        }
    }

    pub fn statistics(&self) -> DecayStatistics {
        let mut stats = DecayStatistics {
            tracked_points: self.histories.len(),
            average_latest_factor: 0.0,
            recovering: 0,
            declining: 0,
            stable: 0,
        };
        let latest: Vec<f64> = self
            .histories
            .values()
            .filter_map(|h| h.last().map(|r| r.factor))
            .collect();
        stats.average_latest_factor = mean(&latest);
        for id in self.histories.keys() {
            match self.trend(id) {
                DecayTrend::Recovering => stats.recovering += 1,
                DecayTrend::Declining => stats.declining += 1,
                DecayTrend::Stable => stats.stable += 1,
            }
        }
        stats
    }

    fn evaluate(&self, point: &ConsensusPoint, current_round: u32) -> (f64, bool) {
        let elapsed = current_round.saturating_sub(point.round_created);
        if elapsed == 0 {
            return (1.0, false);
        }
        let t = elapsed.min(self.config.max_rounds) as f64;
        let rate = self.config.rates.get(point.category);
        let mut base = DecayMode::for_category(point.category).apply(t, rate);

        let mut activated = false;
        let last = point.last_activation_round();
        if last > 0 && current_round >= last {
            let since = current_round - last;
            if since <= self.config.activation_window {
                let window = self.config.activation_window.max(1) as f64;
                base += self.config.activation_bonus * (1.0 - since as f64 / window);
                activated = true;
            }
        }

        base = base.max(point.peak_strength() * self.config.peak_protection_ratio);

        let evidence_bonus = (point.evidence().len() as f64 * self.config.evidence_bonus_per_item)
            .min(self.config.evidence_bonus_cap);
        let verification_bonus = (point.verification_count() as f64
            * self.config.verification_bonus_per_item)
            .min(self.config.verification_bonus_cap);

        (unit(base + evidence_bonus + verification_bonus), activated)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(category: Category, round: u32) -> ConsensusPoint {
        let supporters: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        ConsensusPoint::new("shared claim", category, &supporters, round)
    }

    #[test]
    fn test_mode_by_category() {
        assert_eq!(DecayMode::for_category(Category::Core), DecayMode::Logarithmic);
        assert_eq!(DecayMode::for_category(Category::Tactical), DecayMode::Exponential);
        assert_eq!(DecayMode::for_category(Category::Auxiliary), DecayMode::Linear);
    }

    #[test]
    fn test_mode_functions() {
        assert!((DecayMode::Exponential.apply(2.0, 0.9) - 0.81).abs() < 1e-12);
        assert!((DecayMode::Linear.apply(2.0, 0.9) - 0.8).abs() < 1e-12);
        assert_eq!(DecayMode::Linear.apply(50.0, 0.9), 0.0);
        assert!((DecayMode::InverseSqrt.apply(3.0, 0.0) - 0.5).abs() < 1e-12);
        let log = DecayMode::Logarithmic.apply(10.0, 0.9);
        assert!((log - 1.0 / (1.0 + 2f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_same_round_is_identity_without_history() {
        let mut model = AdaptiveDecayModel::default();
        let p = point(Category::Technical, 4);
        assert_eq!(model.calculate("consensus_0", &p, 4), 1.0);
        assert!(model.history("consensus_0").is_empty());
    }

    #[test]
    fn test_decay_lowers_factor_over_time() {
        let model = AdaptiveDecayModel::default();
        let p = point(Category::Auxiliary, 0);
        let early = model.factor(&p, 1);
        let late = model.factor(&p, 20);
        assert!(late < early);
        assert!((0.0..=1.0).contains(&late));
    }

    #[test]
    fn test_activation_recovery() {
        let model = AdaptiveDecayModel::default();
        let mut p = point(Category::Auxiliary, 0);
        let quiet = model.factor(&p, 10);
        p.add_supporter("D", 9);
        assert!(model.factor(&p, 10) > quiet);
    }

    #[test]
    fn test_decayed_strength_respects_peak_floor() {
        let model = AdaptiveDecayModel::default();
        let p = point(Category::Auxiliary, 0);
        let decayed = model.decayed_strength(&p, 0.0);
        assert!(decayed >= p.peak_strength() * 0.4 - 1e-12);
    }

    #[test]
    fn test_history_capped_and_trend() {
        let mut model = AdaptiveDecayModel::default();
        let p = point(Category::Auxiliary, 0);
        for round in 1..=25 {
            model.calculate("consensus_0", &p, round);
        }
        assert_eq!(model.history("consensus_0").len(), 20);
        assert_eq!(model.trend("consensus_0"), DecayTrend::Stable);
        assert_eq!(model.trend("unknown"), DecayTrend::Stable);
    }

    #[test]
    fn test_trend_declining() {
        let mut model = AdaptiveDecayModel::default();
        let p = point(Category::Tactical, 0);
        for round in [1, 2, 3, 15, 30] {
            model.calculate("consensus_0", &p, round);
        }
        assert_eq!(model.trend("consensus_0"), DecayTrend::Declining);
        let stats = model.statistics();
        assert_eq!(stats.tracked_points, 1);
        assert_eq!(stats.declining, 1);
    }
}

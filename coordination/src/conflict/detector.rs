//! Per-round conflict detection over all divergence points.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConflictAlert, ConflictThresholds, FiredCondition, TriggerCondition};
use crate::points::{divergence_id, DivergencePoint, ResolutionStrategy, Severity};

/// One detection that produced an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub round: u32,
    pub divergence_id: String,
    pub conditions: Vec<TriggerCondition>,
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Stateful detector. Keeps an intensity history per divergence id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictDetector {
    thresholds: ConflictThresholds,
    intensity_history: BTreeMap<String, Vec<f64>>,
    detection_history: Vec<DetectionRecord>,
}

impl ConflictDetector {
    pub fn new(thresholds: ConflictThresholds) -> Self {
        Self {
            thresholds,
            intensity_history: BTreeMap::new(),
            detection_history: Vec::new(),
        }
    }

    pub fn thresholds(&self) -> &ConflictThresholds {
        &self.thresholds
    }

    pub fn intensity_history(&self, divergence_id: &str) -> &[f64] {
        self.intensity_history
            .get(divergence_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn detection_history(&self) -> &[DetectionRecord] {
        &self.detection_history
    }

    /// Record this round's intensities and return an alert for every
    /// divergence with at least one fired condition.
    pub fn monitor_divergences(
        &mut self,
        divergences: &[DivergencePoint],
        current_round: u32,
    ) -> Vec<ConflictAlert> {
        let mut alerts = Vec::new();

        for (index, divergence) in divergences.iter().enumerate() {
            let id = divergence_id(index);
            let limit = self.thresholds.history_limit.max(self.thresholds.stagnation_rounds);
            let history = self.intensity_history.entry(id.clone()).or_default();
            history.push(divergence.intensity());
            if history.len() > limit {
                let excess = history.len() - limit;
                history.drain(..excess);
            }

            let fired = self.evaluate(&id, divergence, current_round);
            if fired.is_empty() {
                continue;
            }

            let alert = self.build_alert(&id, divergence, current_round, fired);
            info!(
                divergence_id = %id,
                trigger = %alert.trigger,
                severity = %alert.severity,
                urgency = alert.urgency,
                "Conflict detected"
            );
            self.detection_history.push(DetectionRecord {
                round: current_round,
                divergence_id: id,
                conditions: alert.conditions.iter().map(|c| c.condition).collect(),
                alert_id: alert.id.clone(),
                timestamp: Utc::now(),
            });
            alerts.push(alert);
        }

        alerts
    }

    /// Every condition that fires for `divergence` given its recorded history.
    pub fn evaluate(
        &self,
        id: &str,
        divergence: &DivergencePoint,
        current_round: u32,
    ) -> Vec<FiredCondition> {
        let t = &self.thresholds;
        let mut fired = Vec::new();

        if divergence.intensity() >= t.intensity {
            fired.push(FiredCondition {
                condition: TriggerCondition::Intensity,
                value: divergence.intensity(),
                threshold: t.intensity,
                note: String::new(),
            });
        }

        let pairs = divergence.opposing_pairs().len();
        if pairs >= t.opposing_pairs {
            fired.push(FiredCondition {
                condition: TriggerCondition::OpposingPositions,
                value: pairs as f64,
                threshold: t.opposing_pairs as f64,
                note: String::new(),
            });
        }

        if let Some(variance) = self.stagnation_variance(id) {
            fired.push(FiredCondition {
                condition: TriggerCondition::Stagnation,
                value: variance,
                threshold: t.stagnation_variance,
                note: format!("flat over {} rounds", t.stagnation_rounds),
            });
        }

        let rate = self.escalation_rate(id);
        if rate >= t.escalation_rate {
            fired.push(FiredCondition {
                condition: TriggerCondition::Escalation,
                value: rate,
                threshold: t.escalation_rate,
                note: String::new(),
            });
        }

        if divergence.requires_debate() && !divergence.debate_requested_by().is_empty() {
            fired.push(FiredCondition {
                condition: TriggerCondition::ExpertRequest,
                value: divergence.debate_requested_by().len() as f64,
                threshold: 1.0,
                note: divergence.debate_requested_by().join(", "),
            });
        }

        let polarization = polarization(divergence);
        if polarization >= t.polarization {
            fired.push(FiredCondition {
                condition: TriggerCondition::Polarization,
                value: polarization,
                threshold: t.polarization,
                note: String::new(),
            });
        }

        let age = current_round.saturating_sub(divergence.round_created);
        if divergence.resolution_attempts() >= t.deadlock_attempts
            && age >= t.deadlock_age
            && divergence.intensity() >= t.deadlock_intensity
        {
            fired.push(FiredCondition {
                condition: TriggerCondition::Deadlock,
                value: divergence.resolution_attempts() as f64,
                threshold: t.deadlock_attempts as f64,
                note: format!("{age} rounds old"),
            });
        }

        fired
    }

    /// `intensity×0.4 + condition, severity, participant and opposition bonuses`, capped at 1.
    pub fn calculate_urgency(&self, divergence: &DivergencePoint, condition_count: usize) -> f64 {
        let urgency = divergence.intensity() * 0.4
            + (condition_count as f64 * 0.1).min(0.3)
            + self.thresholds.severity_weights.get(divergence.severity()) * 0.2
            + (divergence.proponents().len() as f64 * 0.03).min(0.15)
            + (divergence.opposing_pairs().len() as f64 * 0.05).min(0.15);
        urgency.clamp(0.0, 1.0)
    }

    /// Whether an alert should start a resolution session without a human.
    pub fn should_auto_trigger(&self, alert: &ConflictAlert) -> bool {
        alert.urgency >= self.thresholds.auto_trigger_urgency
            || alert.severity.is_high_or_worse()
            || matches!(
                alert.trigger,
                TriggerCondition::Deadlock | TriggerCondition::Escalation
            )
    }

    fn build_alert(
        &self,
        id: &str,
        divergence: &DivergencePoint,
        round: u32,
        fired: Vec<FiredCondition>,
    ) -> ConflictAlert {
        let trigger = primary_condition(&fired);
        let urgency = self.calculate_urgency(divergence, fired.len());
        let severity = determine_severity(divergence, &fired);
        let recommended_strategy = recommend_strategy(trigger, divergence);
        debug!(divergence_id = id, conditions = fired.len(), %recommended_strategy, "Building alert");

        ConflictAlert {
            id: Uuid::new_v4().to_string(),
            divergence_id: id.to_string(),
            round,
            trigger,
            conditions: fired,
            recommended_strategy,
            urgency,
            severity,
            participants: divergence.participants(),
            acknowledged: false,
            acknowledged_at: None,
            created_at: Utc::now(),
        }
    }

    /// Variance of the last window when it is flat and high.
    fn stagnation_variance(&self, id: &str) -> Option<f64> {
        let window = self.thresholds.stagnation_rounds.max(1);
        let history = self.intensity_history(id);
        if history.len() < window {
            return None;
        }
        let recent = &history[history.len() - window..];
        let mean = recent.iter().sum::<f64>() / window as f64;
        let variance = recent.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window as f64;
        (variance < self.thresholds.stagnation_variance && mean > self.thresholds.stagnation_mean)
            .then_some(variance)
    }

    /// Average positive delta over the last three intensity changes.
    fn escalation_rate(&self, id: &str) -> f64 {
        let history = self.intensity_history(id);
        if history.len() < 2 {
            return 0.0;
        }
        let deltas: Vec<f64> = history.windows(2).map(|w| w[1] - w[0]).collect();
        let recent = &deltas[deltas.len().saturating_sub(3)..];
        recent.iter().map(|d| d.max(0.0)).sum::<f64>() / recent.len() as f64
    }
}

fn polarization(divergence: &DivergencePoint) -> f64 {
    let n = divergence.proponents().len();
    if n < 2 {
        return 0.0;
    }
    let opposing_ratio = divergence.opposing_pairs().len() as f64 / n as f64;
    (opposing_ratio * 0.6 + (n as f64 / 5.0) * 0.4).min(1.0)
}

fn primary_condition(fired: &[FiredCondition]) -> TriggerCondition {
    TriggerCondition::PRIORITY
        .into_iter()
        .find(|p| fired.iter().any(|f| f.condition == *p))
        .unwrap_or(TriggerCondition::Intensity)
}

fn determine_severity(divergence: &DivergencePoint, fired: &[FiredCondition]) -> Severity {
    if divergence.severity().is_high_or_worse() {
        return divergence.severity();
    }
    let has = |c: TriggerCondition| fired.iter().any(|f| f.condition == c);
    if has(TriggerCondition::Deadlock) || has(TriggerCondition::Escalation) {
        Severity::Critical
    } else if has(TriggerCondition::Polarization)
        || has(TriggerCondition::Intensity)
        || fired.len() >= 3
    {
        Severity::High
    } else if fired.len() >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn recommend_strategy(primary: TriggerCondition, divergence: &DivergencePoint) -> ResolutionStrategy {
    if divergence.opposing_pairs().len() >= 4 {
        ResolutionStrategy::Mediation
    } else if divergence.resolution_attempts() >= 3 {
        ResolutionStrategy::Voting
    } else if divergence.intensity() >= 0.9 {
        ResolutionStrategy::Debate
    } else {
        primary.default_strategy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Category;

    fn divergence(positions: &[(&str, &str)]) -> DivergencePoint {
        let props: Vec<(String, String)> = positions
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        DivergencePoint::new("approach", Category::Technical, &props, 0)
    }

    fn conditions(alert: &ConflictAlert) -> Vec<TriggerCondition> {
        alert.conditions.iter().map(|c| c.condition).collect()
    }

    #[test]
    fn test_quiet_divergence_raises_nothing() {
        let mut detector = ConflictDetector::default();
        let d = divergence(&[("A", "yes"), ("B", "yes")]);
        assert!(detector.monitor_divergences(&[d], 1).is_empty());
        assert_eq!(detector.intensity_history("divergence_0").len(), 1);
    }

    #[test]
    fn test_three_way_split_fires_intensity_and_opposition() {
        let mut detector = ConflictDetector::default();
        let d = divergence(&[("A", "x"), ("B", "y"), ("C", "z")]);
        let alerts = detector.monitor_divergences(&[d], 1);
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert!(alert.has_condition(TriggerCondition::Intensity));
        assert!(alert.has_condition(TriggerCondition::OpposingPositions));
        assert_eq!(alert.severity, Severity::Critical);
        assert!(detector.should_auto_trigger(alert));
        assert_eq!(detector.detection_history().len(), 1);
    }

    #[test]
    fn test_stagnation_after_flat_rounds() {
        let mut detector = ConflictDetector::default();
        let d = divergence(&[("A", "x"), ("B", "y"), ("C", "z")]);
        let mut last = Vec::new();
        for round in 1..=3 {
            last = detector.monitor_divergences(std::slice::from_ref(&d), round);
        }
        assert!(conditions(&last[0]).contains(&TriggerCondition::Stagnation));
    }

    #[test]
    fn test_primary_condition_priority() {
        let fired = vec![
            FiredCondition { condition: TriggerCondition::Stagnation, value: 0.0, threshold: 0.0, note: String::new() },
            FiredCondition { condition: TriggerCondition::Polarization, value: 0.0, threshold: 0.0, note: String::new() },
            FiredCondition { condition: TriggerCondition::Intensity, value: 0.0, threshold: 0.0, note: String::new() },
        ];
        assert_eq!(primary_condition(&fired), TriggerCondition::Polarization);
    }

    #[test]
    fn test_expert_request_recommends_review() {
        let mut detector = ConflictDetector::default();
        let mut d = divergence(&[("A", "x"), ("B", "x")]);
        d.mark_for_debate("A", "unclear");
        let alerts = detector.monitor_divergences(&[d], 1);
        assert_eq!(alerts[0].trigger, TriggerCondition::ExpertRequest);
        assert_eq!(alerts[0].recommended_strategy, ResolutionStrategy::ExpertReview);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn test_many_opposing_pairs_prefer_mediation() {
        let d = divergence(&[("A", "1"), ("B", "2"), ("C", "3")]);
        assert_eq!(recommend_strategy(TriggerCondition::Intensity, &d), ResolutionStrategy::Debate);
        let d = divergence(&[("A", "1"), ("B", "2"), ("C", "3"), ("D", "4")]);
        assert_eq!(recommend_strategy(TriggerCondition::Intensity, &d), ResolutionStrategy::Mediation);
    }

    #[test]
    fn test_urgency_capped() {
        let detector = ConflictDetector::default();
        let d = divergence(&[("A", "1"), ("B", "2"), ("C", "3"), ("D", "4"), ("E", "5")]);
        let u = detector.calculate_urgency(&d, 7);
        assert!(u <= 1.0);
        assert!(u > 0.9);
    }

    #[test]
    fn test_escalation_rate() {
        let mut detector = ConflictDetector::default();
        let mut d = divergence(&[("A", "x"), ("B", "x")]);
        detector.monitor_divergences(std::slice::from_ref(&d), 1);
        d.add_proponent("B", "y");
        d.add_proponent("C", "z");
        let alerts = detector.monitor_divergences(std::slice::from_ref(&d), 2);
        assert!(alerts[0].has_condition(TriggerCondition::Escalation));
        assert_eq!(alerts[0].trigger, TriggerCondition::Escalation);
    }
}

//! Alert lifecycle: pending → acknowledged → triggered → resolved.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::detector::ConflictDetector;
use super::{ConflictAlert, ConflictThresholds};
use crate::points::DivergencePoint;

/// Counts across the alert lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStatistics {
    pub pending: usize,
    pub triggered: usize,
    pub resolved: usize,
    pub resolved_successfully: usize,
    pub auto_trigger_enabled: bool,
    pub last_check_round: Option<u32>,
    pub detections: usize,
}

/// An alert that finished its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAlert {
    pub alert: ConflictAlert,
    pub success: bool,
}

/// Owns the detector and the three alert lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerManager {
    detector: ConflictDetector,
    pending: Vec<ConflictAlert>,
    triggered: Vec<ConflictAlert>,
    resolved: Vec<ResolvedAlert>,
    pub auto_trigger_enabled: bool,
    last_check_round: Option<u32>,
}

impl Default for TriggerManager {
    fn default() -> Self {
        Self::new(ConflictThresholds::default())
    }
}

impl TriggerManager {
    pub fn new(thresholds: ConflictThresholds) -> Self {
        Self {
            detector: ConflictDetector::new(thresholds),
            pending: Vec::new(),
            triggered: Vec::new(),
            resolved: Vec::new(),
            auto_trigger_enabled: true,
            last_check_round: None,
        }
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    pub fn pending(&self) -> &[ConflictAlert] {
        &self.pending
    }

    pub fn triggered(&self) -> &[ConflictAlert] {
        &self.triggered
    }

    pub fn resolved(&self) -> &[ResolvedAlert] {
        &self.resolved
    }

    pub fn last_check_round(&self) -> Option<u32> {
        self.last_check_round
    }

    /// Run detection for `current_round` and return alerts to auto-trigger.
    ///
    /// A second call for the same round skips detection and returns the
    /// pending auto-triggers.
    pub fn check_and_trigger(
        &mut self,
        divergences: &[DivergencePoint],
        current_round: u32,
    ) -> Vec<ConflictAlert> {
        if self.last_check_round == Some(current_round) {
            debug!(round = current_round, "Conflict check already ran this round");
            return self.pending_auto_triggers();
        }
        self.last_check_round = Some(current_round);

        let detected = self.detector.monitor_divergences(divergences, current_round);
        let mut added = 0;
        for alert in detected {
            let duplicate = self
                .pending
                .iter()
                .chain(self.triggered.iter())
                .any(|a| a.divergence_id == alert.divergence_id);
            if !duplicate {
                self.pending.push(alert);
                added += 1;
            }
        }
        info!(round = current_round, new_alerts = added, pending = self.pending.len(), "Conflict check complete");

        if self.auto_trigger_enabled {
            self.pending_auto_triggers()
        } else {
            Vec::new()
        }
    }

    /// Unacknowledged pending alerts that qualify for auto-triggering.
    pub fn pending_auto_triggers(&self) -> Vec<ConflictAlert> {
        self.pending
            .iter()
            .filter(|a| !a.acknowledged && self.detector.should_auto_trigger(a))
            .cloned()
            .collect()
    }

    pub fn acknowledge_alert(&mut self, alert_id: &str) -> bool {
        match self.pending.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledge();
                true
            }
            None => false,
        }
    }

    /// Move a pending alert to the triggered list.
    pub fn start_resolution(&mut self, alert_id: &str) -> Option<ConflictAlert> {
        let index = self.pending.iter().position(|a| a.id == alert_id)?;
        let alert = self.pending.remove(index);
        self.triggered.push(alert.clone());
        Some(alert)
    }

    /// Move a triggered alert to the resolved list.
    pub fn complete_resolution(&mut self, alert_id: &str, success: bool) -> bool {
        let Some(index) = self.triggered.iter().position(|a| a.id == alert_id) else {
            return false;
        };
        let alert = self.triggered.remove(index);
        info!(alert_id, divergence_id = %alert.divergence_id, success, "Conflict resolution completed");
        self.resolved.push(ResolvedAlert { alert, success });
        true
    }

    /// Most pressing pending alerts, by urgency then severity.
    pub fn priority_conflicts(&self, max: usize) -> Vec<ConflictAlert> {
        let mut sorted = self.pending.clone();
        sorted.sort_by(|a, b| {
            b.urgency
                .total_cmp(&a.urgency)
                .then_with(|| b.severity.cmp(&a.severity))
        });
        sorted.truncate(max);
        sorted
    }

    pub fn statistics(&self) -> TriggerStatistics {
        TriggerStatistics {
            pending: self.pending.len(),
            triggered: self.triggered.len(),
            resolved: self.resolved.len(),
            resolved_successfully: self.resolved.iter().filter(|r| r.success).count(),
            auto_trigger_enabled: self.auto_trigger_enabled,
            last_check_round: self.last_check_round,
            detections: self.detector.detection_history().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Category;

    fn split(names: &[(&str, &str)]) -> DivergencePoint {
        let props: Vec<(String, String)> = names
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        DivergencePoint::new("schema", Category::Core, &props, 0)
    }

    #[test]
    fn test_lifecycle() {
        let mut manager = TriggerManager::default();
        let divs = vec![split(&[("A", "x"), ("B", "y"), ("C", "z")])];
        let auto = manager.check_and_trigger(&divs, 1);
        assert_eq!(auto.len(), 1);
        let id = auto[0].id.clone();

        assert!(manager.acknowledge_alert(&id));
        assert!(manager.pending_auto_triggers().is_empty());
        assert!(manager.start_resolution(&id).is_some());
        assert!(manager.pending().is_empty());
        assert!(manager.complete_resolution(&id, true));
        assert!(!manager.complete_resolution(&id, true));

        let stats = manager.statistics();
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.resolved_successfully, 1);
    }

    #[test]
    fn test_same_round_skips_detection() {
        let mut manager = TriggerManager::default();
        let divs = vec![split(&[("A", "x"), ("B", "y"), ("C", "z")])];
        manager.check_and_trigger(&divs, 1);
        let again = manager.check_and_trigger(&divs, 1);
        assert_eq!(again.len(), 1);
        assert_eq!(manager.detector().detection_history().len(), 1);
    }

    #[test]
    fn test_dedupes_by_divergence() {
        let mut manager = TriggerManager::default();
        let divs = vec![split(&[("A", "x"), ("B", "y"), ("C", "z")])];
        manager.check_and_trigger(&divs, 1);
        manager.check_and_trigger(&divs, 2);
        assert_eq!(manager.pending().len(), 1);
    }

    #[test]
    fn test_auto_trigger_toggle() {
        let mut manager = TriggerManager::default();
        manager.auto_trigger_enabled = false;
        let divs = vec![split(&[("A", "x"), ("B", "y"), ("C", "z")])];
        assert!(manager.check_and_trigger(&divs, 1).is_empty());
        assert_eq!(manager.priority_conflicts(5).len(), 1);
        assert!(manager.priority_conflicts(0).is_empty());
    }
}

//! Versioned, validated tracker snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tracker;
use crate::error::{SnapshotError, SnapshotResult};
use crate::points::{consensus_index, divergence_index};

/// Schema version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete tracker state: points, every sub-component, sessions, histories
/// and caller inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub tracker: Tracker,
}

impl TrackerSnapshot {
    pub(crate) fn capture(tracker: &Tracker) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            tracker: tracker.clone(),
        }
    }

    /// Check version and cross-references. All integrity failures are
    /// collected into one error.
    pub fn validate(&self) -> SnapshotResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let t = &self.tracker;
        let consensus_count = t.consensus_points.len();
        let divergence_count = t.divergence_points.len();
        let known_consensus = |id: &str| consensus_index(id).is_some_and(|i| i < consensus_count);
        let known_divergence = |id: &str| divergence_index(id).is_some_and(|i| i < divergence_count);
        let mut errors = Vec::new();

        for (i, point) in t.consensus_points.iter().enumerate() {
            if !point.is_consistent() {
                errors.push(format!("consensus_{i}: strength or peak out of range"));
            }
            if point.round_created > t.current_round {
                errors.push(format!(
                    "consensus_{i}: created in round {} after current round {}",
                    point.round_created, t.current_round
                ));
            }
        }
        for (i, point) in t.divergence_points.iter().enumerate() {
            if !(0.0..=1.0).contains(&point.intensity()) {
                errors.push(format!("divergence_{i}: intensity out of range"));
            }
        }

        let order = t.dependencies.get_aggregation_order();
        if order.len() != t.dependencies.node_count() {
            errors.push("dependency graph contains a cycle".to_string());
        }
        for id in order.iter().filter(|id| !known_consensus(id)) {
            errors.push(format!("dependency node {id} has no consensus point"));
        }
        for id in t.stability.keys().filter(|id| !known_consensus(id)) {
            errors.push(format!("stability history for unknown point {id}"));
        }
        for id in t.decay.histories().keys().filter(|id| !known_consensus(id)) {
            errors.push(format!("decay history for unknown point {id}"));
        }

        let alerts = t
            .triggers
            .pending()
            .iter()
            .chain(t.triggers.triggered())
            .chain(t.triggers.resolved().iter().map(|r| &r.alert));
        for alert in alerts.filter(|a| !known_divergence(&a.divergence_id)) {
            errors.push(format!("alert {} targets unknown {}", alert.id, alert.divergence_id));
        }
        let sessions = t
            .orchestrator
            .active_sessions()
            .chain(t.orchestrator.completed_sessions());
        for session in sessions.filter(|s| !known_divergence(&s.divergence_id)) {
            errors.push(format!(
                "session {} targets unknown {}",
                session.id, session.divergence_id
            ));
        }
        for id in t.resolution_inputs.keys().filter(|id| !known_divergence(id)) {
            errors.push(format!("resolution inputs for unknown {id}"));
        }
        for plan in t.plans.iter().filter(|p| !known_divergence(&p.divergence_id)) {
            errors.push(format!("plan targets unknown {}", plan.divergence_id));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SnapshotError::Integrity(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Category;

    fn tracker() -> Tracker {
        let mut t = Tracker::default();
        t.add_consensus("ship weekly", Category::Strategic, &["A".into(), "B".into()]);
        t.add_divergence(
            "release branch",
            Category::Procedural,
            &[("A".into(), "trunk".into()), ("B".into(), "gitflow".into())],
        );
        t
    }

    #[test]
    fn test_fresh_snapshot_validates() {
        let snapshot = tracker().export_state();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        snapshot.validate().unwrap();
    }

    #[test]
    fn test_version_mismatch() {
        let mut snapshot = tracker().export_state();
        snapshot.version = 99;
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::VersionMismatch { found: 99, .. })
        ));
    }

    #[test]
    fn test_dangling_references_are_collected() {
        let mut snapshot = tracker().export_state();
        snapshot.tracker.stability.insert("consensus_7".into(), vec![0.5]);
        snapshot
            .tracker
            .resolution_inputs
            .insert("divergence_3".into(), Default::default());
        match snapshot.validate() {
            Err(SnapshotError::Integrity(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("consensus_7"));
                assert!(errors[1].contains("divergence_3"));
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_round_ordering_checked() {
        let mut t = tracker();
        t.set_current_round(4);
        t.add_consensus("late point", Category::Auxiliary, &["C".into()]);
        let mut snapshot = t.export_state();
        snapshot.tracker.current_round = 1;
        assert!(matches!(snapshot.validate(), Err(SnapshotError::Integrity(_))));
    }
}

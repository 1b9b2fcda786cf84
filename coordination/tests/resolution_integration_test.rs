//! Integration tests for multi-strategy resolution
//!
//! Runs sessions through the tracker with caller-supplied inputs and
//! checks the event stream, escalation path and resulting state.

use consensus_coordination::debate::ArgumentSubmission;
use consensus_coordination::resolution::{OutcomeType, ResolutionEvent, ResolutionInputs};
use consensus_coordination::{
    Category, ResolutionStrategy, SessionState, SupportAction, Tracker,
};

fn positions(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(p, pos)| (p.to_string(), pos.to_string()))
        .collect()
}

/// Step a session until it stops producing events.
fn drive(tracker: &mut Tracker, session_id: &str) -> Vec<ResolutionEvent> {
    let mut events = Vec::new();
    for _ in 0..64 {
        let step = tracker.advance_resolution(session_id);
        if step.is_empty() {
            break;
        }
        events.extend(step);
    }
    events
}

fn escalations(events: &[ResolutionEvent]) -> Vec<(ResolutionStrategy, ResolutionStrategy)> {
    events
        .iter()
        .filter_map(|e| match e {
            ResolutionEvent::ResolutionEscalated { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

// ── Debate ──────────────────────────────────────────────────────────

#[test]
fn test_debate_with_evidence_picks_a_winner() {
    let mut tracker = Tracker::default();
    let div = tracker.add_divergence(
        "session store",
        Category::Technical,
        &positions(&[("A", "redis"), ("B", "postgres")]),
    );
    assert!(tracker.set_resolution_inputs(
        &div,
        ResolutionInputs {
            arguments: vec![
                ArgumentSubmission::new("A", "redis keeps sessions in memory")
                    .with_evidence(&["load test"]),
                ArgumentSubmission::new("A", "redis expires keys natively")
                    .with_evidence(&["docs"]),
            ],
            ..Default::default()
        },
    ));

    let session = tracker
        .start_conflict_resolution(&div, Some(ResolutionStrategy::Debate))
        .unwrap();
    let events = drive(&mut tracker, &session);

    assert!(events.iter().any(|e| matches!(
        e,
        ResolutionEvent::Progress { event, .. } if event.step == "argument_submitted"
    )));
    let completed = events.iter().find_map(|e| match e {
        ResolutionEvent::ResolutionCompleted { outcome, new_consensus_ids, .. } => {
            Some((*outcome, new_consensus_ids.clone()))
        }
        _ => None,
    });
    let (outcome, new_ids) = completed.expect("debate should settle");
    assert_eq!(outcome, OutcomeType::Consensus);
    assert_eq!(tracker.consensus(&new_ids[0]).unwrap().content, "redis");
    assert!(escalations(&events).is_empty());
}

#[test]
fn test_resolved_points_start_at_seed_strength() {
    let mut tracker = Tracker::default();
    let div = tracker.add_divergence(
        "deploy cadence",
        Category::Tactical,
        &positions(&[("A", "daily"), ("B", "weekly")]),
    );
    let session = tracker
        .start_conflict_resolution(&div, Some(ResolutionStrategy::Compromise))
        .unwrap();
    let events = drive(&mut tracker, &session);

    let new_ids = events
        .iter()
        .find_map(|e| match e {
            ResolutionEvent::ResolutionCompleted { new_consensus_ids, .. } => {
                Some(new_consensus_ids.clone())
            }
            _ => None,
        })
        .expect("compromise should settle");
    let point = tracker.consensus(&new_ids[0]).unwrap();
    assert_eq!(point.category, Category::Auxiliary);
    assert!((point.strength() - 0.6).abs() < 1e-9);
    assert!((point.peak_strength() - 0.6).abs() < 1e-9);

    // The next mutation re-derives strength; the peak keeps the seed.
    tracker.update_support(&new_ids[0], "C", SupportAction::Add);
    let point = tracker.consensus(&new_ids[0]).unwrap();
    assert!(point.strength() < 0.6);
    assert!((point.peak_strength() - 0.6).abs() < 1e-9);
}

// ── Escalation ──────────────────────────────────────────────────────

#[test]
fn test_rejected_mediation_escalates_until_exhausted() {
    let mut tracker = Tracker::default();
    let div = tracker.add_divergence(
        "release train",
        Category::Tactical,
        &positions(&[("A", "weekly"), ("B", "monthly")]),
    );
    tracker.set_resolution_inputs(
        &div,
        ResolutionInputs {
            acceptance_rate: Some(0.1),
            ..Default::default()
        },
    );

    let session_id = tracker
        .start_conflict_resolution(&div, Some(ResolutionStrategy::Mediation))
        .unwrap();
    let events = drive(&mut tracker, &session_id);

    // Data-driven needs discussion history and voting needs three parties,
    // so an argument-free debate is the only rung left.
    assert_eq!(
        escalations(&events),
        vec![(ResolutionStrategy::Mediation, ResolutionStrategy::Debate)]
    );
    match events.last() {
        Some(ResolutionEvent::ResolutionFailed { reason, .. }) => {
            assert_eq!(reason, "escalation ladder exhausted")
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let session = tracker.orchestrator().session(&session_id).unwrap();
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.escalation_count, 1);
    assert!(tracker.consensus_points().is_empty());
    assert_eq!(tracker.divergence(&div).unwrap().resolution_attempts(), 0);
}

#[test]
fn test_paused_session_waits() {
    let mut tracker = Tracker::default();
    let div = tracker.add_divergence(
        "deploy cadence",
        Category::Tactical,
        &positions(&[("A", "daily"), ("B", "weekly")]),
    );
    let session = tracker
        .start_conflict_resolution(&div, Some(ResolutionStrategy::Compromise))
        .unwrap();

    assert!(!tracker.advance_resolution(&session).is_empty());
    assert!(tracker.pause_resolution(&session));
    assert!(tracker.advance_resolution(&session).is_empty());
    assert!(tracker.resume_resolution(&session));

    let events = drive(&mut tracker, &session);
    assert!(matches!(
        events.last(),
        Some(ResolutionEvent::ResolutionCompleted { .. })
    ));
    assert_eq!(tracker.conflict_resolution_status().sessions.completed_sessions, 1);
}

// ── Plans ───────────────────────────────────────────────────────────

#[test]
fn test_plan_for_critical_core_split() {
    let mut tracker = Tracker::default();
    let div = tracker.add_divergence(
        "product direction",
        Category::Core,
        &positions(&[("A", "enterprise"), ("B", "consumer"), ("C", "developer tools")]),
    );
    let plan = tracker.generate_conflict_resolution_plan(&div).unwrap();
    assert_eq!(plan.strategy, ResolutionStrategy::Debate);
    assert_eq!(plan.participants.len(), 3);
    assert!(!plan.executed);

    assert!(tracker.execute_resolution_plan(0, false, "no agreement"));
    let divergence = tracker.divergence(&div).unwrap();
    assert_eq!(divergence.resolution_damping(), 1.0);
    assert!(tracker.plans()[0].executed);
}

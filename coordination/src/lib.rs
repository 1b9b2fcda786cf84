//! Consensus Coordination Library
//!
//! Tracks agreement and disagreement across the rounds of a multi-party
//! discussion, computes a correlation-aware consensus level, detects when a
//! disagreement has turned into a conflict and drives multi-strategy
//! resolution to a terminal state.
//!
//! # Components
//!
//! - [`points`]: consensus and divergence points with derived strength,
//!   intensity and severity
//! - [`decay`]: category-specific strength decay with peak protection
//! - [`dependency`]: dependency DAG between consensus points
//! - [`weights`]: phase, expert and context weighting
//! - [`aggregator`]: correlation-discounted aggregation strategies
//! - [`conflict`]: conflict detection and alert lifecycle
//! - [`debate`]: structured debate state machine and scoring
//! - [`resolution`]: strategy executors, sessions and escalation
//! - [`tracker`]: the per-round facade, reports and snapshots
//!
//! # Usage
//!
//! ```no_run
//! use consensus_coordination::{Category, Tracker};
//!
//! let mut tracker = Tracker::default();
//! let supporters = vec!["alice".to_string(), "bob".to_string()];
//! tracker.add_consensus("use caching for reads", Category::Core, &supporters);
//! tracker.set_current_round(1);
//! let report = tracker.calculate_overall_consensus();
//! let events = tracker.check_and_handle_conflicts(1);
//! println!("{:.2} ({} resolution events)", report.overall_level, events.len());
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod aggregator;
pub mod config;
pub mod conflict;
pub mod debate;
pub mod decay;
pub mod dependency;
pub mod error;
pub mod points;
pub mod resolution;
pub mod scenario;
pub mod tracker;
pub mod weights;

// Re-export scoring primitives
pub use points::{
    Category, ConsensusPoint, DivergencePoint, Priority, ResolutionStrategy, Severity,
};

// Re-export component types
pub use aggregator::{AggregationConfig, AggregationStrategy, ConsensusAggregator};
pub use decay::{AdaptiveDecayModel, DecayConfig};
pub use dependency::{DependencyGraph, DependencyType, HierarchyLevel};
pub use weights::{AuthorityUpdate, DiscussionPhase, WeightCalculator, WeightConfig};

// Re-export conflict handling types
pub use conflict::{ConflictAlert, ConflictThresholds, TriggerCondition, TriggerManager};
pub use debate::{DebateEngine, DebateOutcome, DebatePhase, DebateRules};
pub use resolution::{
    ResolutionEvent, ResolutionInputs, ResolutionOrchestrator, ResolutionResult,
    ResolutionSession, SessionState,
};

// Re-export facade types
pub use config::EngineConfig;
pub use error::{ConfigError, DebateError, SnapshotError, TransitionError};
pub use scenario::Scenario;
pub use tracker::{
    ConsensusInput, ConsensusReport, SupportAction, Tracker, TrackerConfig, TrackerSnapshot,
};

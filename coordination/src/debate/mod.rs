//! Structured Debate
//!
//! Seven-phase debate over a single divergence point. Used by the
//! resolution executors when a conflict's strategy is `debate`.
//!
//! # Debate Flow
//!
//! ```text
//! Opening → Argumentation → CrossExamination → Rebuttal
//!                                                  │
//!        Closing ← Synthesis ← CommonGround ◄──────┘
//!           │          │             │
//!           │          │             └─ shared terms, jointly supported arguments
//!           │          └─ rank positions: clear_winner / draw / partial_consensus
//!           └─ advance again → debate ends
//! ```

pub mod engine;
pub mod state;

pub use engine::{
    ArgumentSubmission, DebateArgument, DebateEngine, DebateOutcome, DebatePosition,
    DebateRules, DebateSynthesis, RankedPosition,
};
pub use state::{DebatePhase, DebateState, DebateTransition};

//! Multi-strategy conflict resolution.
//!
//! A [`ResolutionSession`] runs one strategy at a time through an
//! [`ExecutionRun`]. When a strategy fails the orchestrator walks the
//! escalation ladder until a strategy succeeds or none applies.
//!
//! ```text
//! ConflictAlert ─► start_resolution ─► advance_session ─► ... ─► Succeeded
//!                                            │
//!                                            └─ failed result ─► next ladder strategy
//!                                                                 or Failed
//! ```

pub mod executors;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use executors::{ExecutionRun, ExecutorConfig, StrategyExecutor};
pub use orchestrator::{
    OrchestratorStatistics, ResolutionOrchestrator, SessionStep, StepOutcome, ESCALATION_LADDER,
};
pub use session::{ResolutionSession, SessionState, SessionTransition};
pub use types::{
    OutcomeType, ProgressEvent, ResolutionContext, ResolutionEvent, ResolutionInputs,
    ResolutionResult,
};

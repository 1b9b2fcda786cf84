//! Error types
//!
//! Lookups with unknown ids never error; they return `false` or `None`.
//! The enums here cover state restoration, configuration loading, debate
//! misuse and invalid state machine transitions.

use std::path::PathBuf;

use thiserror::Error;

use crate::debate::DebatePhase;

/// Result type alias for snapshot restoration
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Result type alias for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for debate operations
pub type DebateResult<T> = Result<T, DebateError>;

/// Errors raised while restoring a tracker snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Snapshot JSON could not be parsed
    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot written by an incompatible schema
    #[error("Snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    /// One or more integrity checks failed
    #[error("Snapshot failed {} integrity check(s): {}", .0.len(), .0.join("; "))]
    Integrity(Vec<String>),
}

/// Errors raised while loading an engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `EngineConfig`
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment override could not be parsed
    #[error("Invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
}

/// Errors raised by the debate engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DebateError {
    /// Debate not started or already ended
    #[error("Debate is not active")]
    NotActive,

    /// Speaker holds no position in this debate
    #[error("Speaker '{0}' holds no position in this debate")]
    UnknownSpeaker(String),

    /// Fewer participants than the rules require
    #[error("Debate needs at least {required} participants, found {found}")]
    NotEnoughParticipants { found: usize, required: usize },

    /// More participants than the rules allow
    #[error("Debate allows at most {allowed} participants, found {found}")]
    TooManyParticipants { found: usize, allowed: usize },

    /// Phase machine refused the transition
    #[error(transparent)]
    Transition(#[from] TransitionError<DebatePhase>),
}

/// Error for invalid state transitions. Shared by the debate phase machine
/// and the resolution session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError<S> {
    pub from: S,
    pub to: S,
    pub reason: String,
}

impl<S: std::fmt::Display> std::fmt::Display for TransitionError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl<S: std::fmt::Debug + std::fmt::Display> std::error::Error for TransitionError<S> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_message_lists_failures() {
        let err = SnapshotError::Integrity(vec!["a".into(), "b".into()]);
        let msg = err.to_string();
        assert!(msg.contains("2 integrity"));
        assert!(msg.contains("a; b"));
    }

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError {
            from: DebatePhase::Opening,
            to: DebatePhase::Closing,
            reason: "skip".to_string(),
        };
        assert_eq!(err.to_string(), "invalid transition opening → closing: skip");
        let debate: DebateError = err.into();
        assert!(matches!(debate, DebateError::Transition(_)));
    }
}

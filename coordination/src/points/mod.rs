//! Scoring primitives: consensus and divergence points plus the shared
//! classification enums.

pub mod category;
pub mod consensus;
pub mod divergence;

pub use category::{Category, CategoryWeights, Priority, PriorityWeights, Severity, SeverityWeights};
pub use consensus::{ActivationEvent, ActivationKind, ConsensusPoint};
pub use divergence::{
    DiscussionEntry, DiscussionKind, DivergencePoint, OpposingPair, Proponent, ResolutionStrategy,
};

pub(crate) use category::unit;

const CONSENSUS_PREFIX: &str = "consensus_";
const DIVERGENCE_PREFIX: &str = "divergence_";

/// Stable id of the consensus point at `index`.
pub fn consensus_id(index: usize) -> String {
    format!("{CONSENSUS_PREFIX}{index}")
}

/// Stable id of the divergence point at `index`.
pub fn divergence_id(index: usize) -> String {
    format!("{DIVERGENCE_PREFIX}{index}")
}

/// Index encoded in a consensus id.
pub fn consensus_index(id: &str) -> Option<usize> {
    id.strip_prefix(CONSENSUS_PREFIX)?.parse().ok()
}

/// Index encoded in a divergence id.
pub fn divergence_index(id: &str) -> Option<usize> {
    id.strip_prefix(DIVERGENCE_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        assert_eq!(consensus_id(3), "consensus_3");
        assert_eq!(consensus_index("consensus_3"), Some(3));
        assert_eq!(divergence_index(&divergence_id(0)), Some(0));
        assert_eq!(divergence_index("consensus_0"), None);
        assert_eq!(consensus_index("consensus_x"), None);
    }
}

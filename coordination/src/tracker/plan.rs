//! Manual, plan-based resolution path.
//!
//! A plan names a strategy and an approach for one divergence. The caller
//! carries it out outside the engine and reports back through
//! `Tracker::execute_resolution_plan`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::points::{DivergencePoint, ResolutionStrategy, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub divergence_id: String,
    pub strategy: ResolutionStrategy,
    pub approach: String,
    pub participants: Vec<String>,
    pub expected_outcome: String,
    pub created_at: DateTime<Utc>,
    pub executed: bool,
    pub execution_result: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl ResolutionPlan {
    pub fn new(divergence_id: &str, divergence: &DivergencePoint) -> Self {
        let strategy = recommend_strategy(divergence);
        let participants = divergence.participants();
        Self {
            divergence_id: divergence_id.to_string(),
            strategy,
            approach: approach_text(strategy, divergence, &participants),
            participants,
            expected_outcome: expected_outcome(strategy).to_string(),
            created_at: Utc::now(),
            executed: false,
            execution_result: None,
            executed_at: None,
        }
    }

    pub fn mark_executed(&mut self, result: &str) {
        self.executed = true;
        self.execution_result = Some(result.to_string());
        self.executed_at = Some(Utc::now());
    }
}

/// Strategy suggested for a divergence that needs attention.
///
/// Critical splits go to debate when they touch core or strategic ground and
/// to mediation otherwise. High severity is put to a vote once four or more
/// people are involved.
pub fn recommend_strategy(divergence: &DivergencePoint) -> ResolutionStrategy {
    match divergence.severity() {
        Severity::Critical if divergence.category.is_high_level() => ResolutionStrategy::Debate,
        Severity::Critical => ResolutionStrategy::Mediation,
        Severity::High if divergence.proponents().len() >= 4 => ResolutionStrategy::Voting,
        Severity::High => ResolutionStrategy::Debate,
        _ if divergence.intensity() >= 0.6 => ResolutionStrategy::Compromise,
        _ => ResolutionStrategy::DataDriven,
    }
}

fn approach_text(
    strategy: ResolutionStrategy,
    divergence: &DivergencePoint,
    participants: &[String],
) -> String {
    let who = participants.join(", ");
    match strategy {
        ResolutionStrategy::Debate => format!(
            "structured debate between {who} on '{}': opening statements, argumentation with evidence, cross-examination, synthesis",
            divergence.content
        ),
        ResolutionStrategy::Voting => format!(
            "ballot over {} positions among {who}; a simple majority carries",
            divergence.distinct_positions().len()
        ),
        ResolutionStrategy::Mediation => format!(
            "neutral mediator collects the interests of {who} and proposes a balanced position"
        ),
        ResolutionStrategy::Compromise => format!(
            "each of {who} names the part of their position they can give up; combine the rest"
        ),
        ResolutionStrategy::DataDriven => format!(
            "{who} submit evidence for their positions; the best-supported position is adopted"
        ),
        ResolutionStrategy::ExpertReview => format!("refer '{}' to a domain expert", divergence.content),
        ResolutionStrategy::Postpone => "revisit in a later round".to_string(),
    }
}

fn expected_outcome(strategy: ResolutionStrategy) -> &'static str {
    match strategy {
        ResolutionStrategy::Debate => "a winning position or shared ground",
        ResolutionStrategy::Voting => "a majority decision",
        ResolutionStrategy::Mediation => "an accepted mediated proposal",
        ResolutionStrategy::Compromise => "a combined position",
        ResolutionStrategy::DataDriven => "the position best backed by evidence",
        ResolutionStrategy::ExpertReview => "an expert ruling",
        ResolutionStrategy::Postpone => "a deferred decision",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::Category;

    fn divergence(category: Category, positions: &[(&str, &str)]) -> DivergencePoint {
        let proponents: Vec<(String, String)> = positions
            .iter()
            .map(|(p, pos)| (p.to_string(), pos.to_string()))
            .collect();
        DivergencePoint::new("storage engine", category, &proponents, 1)
    }

    #[test]
    fn test_critical_core_goes_to_debate() {
        let div = divergence(Category::Core, &[("A", "x"), ("B", "y"), ("C", "z")]);
        assert_eq!(div.severity(), Severity::Critical);
        assert_eq!(recommend_strategy(&div), ResolutionStrategy::Debate);
    }

    #[test]
    fn test_critical_tactical_goes_to_mediation() {
        let div = divergence(Category::Tactical, &[("A", "x"), ("B", "y"), ("C", "z")]);
        assert_eq!(recommend_strategy(&div), ResolutionStrategy::Mediation);
    }

    #[test]
    fn test_low_intensity_is_data_driven() {
        let div = divergence(Category::Auxiliary, &[("A", "x"), ("B", "y")]);
        assert_eq!(div.severity(), Severity::Medium);
        assert!(div.intensity() < 0.6);
        assert_eq!(recommend_strategy(&div), ResolutionStrategy::DataDriven);
    }

    #[test]
    fn test_plan_execution_marks_result() {
        let div = divergence(Category::Technical, &[("A", "x"), ("B", "y")]);
        let mut plan = ResolutionPlan::new("divergence_0", &div);
        assert!(plan.approach.contains("A, B"));
        assert!(!plan.executed);
        plan.mark_executed("agreed on x");
        assert!(plan.executed);
        assert_eq!(plan.execution_result.as_deref(), Some("agreed on x"));
    }
}

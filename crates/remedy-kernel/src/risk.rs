//! Risk scoring
//!
//! Maps (action type, environment, blast radius) to a score in `[0, 1]`
//! and a risk level. Pure and deterministic.

use crate::types::{ActionType, Environment, RiskLevel};
use serde::{Deserialize, Serialize};

/// Score added per affected unit
const BLAST_RADIUS_STEP: f64 = 0.01;

/// Upper bound on the blast-radius contribution
const MAX_BLAST_ADJUSTMENT: f64 = 0.3;

/// Result of scoring a proposal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Score in `[0, 1]`, rounded to 4 decimals
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

/// Base risk of an action type
#[must_use]
pub fn base_score(action_type: &ActionType) -> f64 {
    match action_type {
        ActionType::Restart => 0.20,
        ActionType::Scale => 0.30,
        ActionType::Rollback => 0.50,
        ActionType::Failover => 0.60,
        ActionType::Patch => 0.70,
        ActionType::Custom(_) => 0.50,
    }
}

/// Severity multiplier of an environment
#[must_use]
pub fn environment_multiplier(environment: &Environment) -> f64 {
    match environment {
        Environment::Production => 1.5,
        Environment::Staging => 1.0,
        Environment::Development => 0.5,
        Environment::Custom(_) => 1.0,
    }
}

/// Contribution of the number of affected units
#[must_use]
pub fn blast_adjustment(blast_radius: u32) -> f64 {
    (f64::from(blast_radius) * BLAST_RADIUS_STEP).min(MAX_BLAST_ADJUSTMENT)
}

/// Score a proposed action
///
/// `min(1.0, base * multiplier + min(0.3, blast_radius / 100))`, rounded to
/// 4 decimals, then bucketed into a [`RiskLevel`].
#[must_use]
pub fn calculate_risk_score(
    action_type: &ActionType,
    environment: &Environment,
    blast_radius: u32,
) -> RiskAssessment {
    let raw = base_score(action_type) * environment_multiplier(environment)
        + blast_adjustment(blast_radius);
    let risk_score = round4(raw.min(1.0));

    RiskAssessment {
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_in_production_with_one_unit() {
        let assessment = calculate_risk_score(&ActionType::Restart, &Environment::Production, 1);
        assert_eq!(assessment.risk_score, 0.31);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn unknown_types_and_environments_use_defaults() {
        let assessment = calculate_risk_score(
            &ActionType::Custom("drain".to_string()),
            &Environment::Custom("qa".to_string()),
            0,
        );
        assert_eq!(assessment.risk_score, 0.5);
        assert_eq!(assessment.risk_level, RiskLevel::Moderate);
    }

    #[test]
    fn blast_adjustment_is_capped() {
        assert_eq!(blast_adjustment(10), 0.1);
        assert_eq!(blast_adjustment(30), 0.3);
        assert_eq!(blast_adjustment(10_000), 0.3);
    }

    #[test]
    fn score_is_capped_at_one() {
        let assessment = calculate_risk_score(&ActionType::Patch, &Environment::Production, 500);
        assert_eq!(assessment.risk_score, 1.0);
        assert_eq!(assessment.risk_level, RiskLevel::Extreme);
    }

    #[test]
    fn development_halves_the_base() {
        let assessment = calculate_risk_score(&ActionType::Scale, &Environment::Development, 0);
        assert_eq!(assessment.risk_score, 0.15);
        assert_eq!(assessment.risk_level, RiskLevel::Minimal);
    }
}

//! Policy gate
//!
//! Pure mapping from a risk score (and optional policy) to a decision
//! outcome. Without a policy the default bands apply:
//!
//! | score        | outcome            |
//! |--------------|--------------------|
//! | `< 0.3`      | `AUTO_EXECUTE`     |
//! | `< 0.6`      | `REQUIRE_APPROVAL` |
//! | otherwise    | `ESCALATE`         |
//!
//! With a policy, `block_above` and `require_approval_above` take over and
//! the middle band defers instead of escalating.

use crate::error::RemedyError;
use crate::policy::DecisionPolicy;
use crate::types::{ActionType, DecisionOutcome};
use serde::{Deserialize, Serialize};

/// Scores below this auto-execute
pub const AUTO_EXECUTE_BELOW: f64 = 0.3;

/// Without a policy, scores below this require approval; above, escalate
pub const DEFAULT_APPROVAL_BELOW: f64 = 0.6;

/// Outcome plus a human-readable reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub outcome: DecisionOutcome,
    pub rationale: String,
}

/// Reject scores that are not a number or fall outside `[0, 1]`
///
/// # Errors
/// Returns [`RemedyError::InvalidScore`].
pub fn check_score(risk_score: f64) -> Result<f64, RemedyError> {
    if risk_score.is_finite() && (0.0..=1.0).contains(&risk_score) {
        Ok(risk_score)
    } else {
        Err(RemedyError::InvalidScore(risk_score))
    }
}

/// Map a score to an outcome
#[must_use]
pub fn determine_outcome(risk_score: f64, policy: Option<&DecisionPolicy>) -> DecisionOutcome {
    match policy {
        None => {
            if risk_score < AUTO_EXECUTE_BELOW {
                DecisionOutcome::AutoExecute
            } else if risk_score < DEFAULT_APPROVAL_BELOW {
                DecisionOutcome::RequireApproval
            } else {
                DecisionOutcome::Escalate
            }
        }
        Some(policy) => {
            if risk_score >= policy.block_above {
                DecisionOutcome::Block
            } else if risk_score >= policy.require_approval_above {
                DecisionOutcome::RequireApproval
            } else if risk_score < AUTO_EXECUTE_BELOW {
                DecisionOutcome::AutoExecute
            } else {
                DecisionOutcome::Defer
            }
        }
    }
}

/// Full gate: allow-list first, then thresholds
///
/// An action type missing from a non-empty allow-list always blocks,
/// whatever the score.
#[must_use]
pub fn evaluate(
    action_type: &ActionType,
    risk_score: f64,
    policy: Option<&DecisionPolicy>,
) -> GateVerdict {
    if let Some(policy) = policy {
        if !policy.allows(action_type) {
            return GateVerdict {
                outcome: DecisionOutcome::Block,
                rationale: format!(
                    "action type '{}' not allowed by policy '{}'",
                    action_type, policy.name
                ),
            };
        }
    }

    let outcome = determine_outcome(risk_score, policy);
    let rationale = match policy {
        None => format!("risk score {risk_score:.4} -> {outcome} (default thresholds)"),
        Some(policy) => {
            let mut reason = format!(
                "risk score {risk_score:.4} -> {outcome} under policy '{}' (approval>={}, block>={})",
                policy.name, policy.require_approval_above, policy.block_above
            );
            if risk_score > policy.max_risk_score {
                reason.push_str(&format!(
                    "; exceeds max_risk_score {}",
                    policy.max_risk_score
                ));
            }
            reason
        }
    };

    GateVerdict { outcome, rationale }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicySpec;
    use crate::types::Environment;

    fn policy(approval: f64, block: f64) -> DecisionPolicy {
        DecisionPolicy::from_spec(
            PolicySpec::new("test", Environment::Production).with_thresholds(approval, block),
        )
        .unwrap()
    }

    #[test]
    fn default_bands() {
        assert_eq!(determine_outcome(0.0, None), DecisionOutcome::AutoExecute);
        assert_eq!(determine_outcome(0.29, None), DecisionOutcome::AutoExecute);
        assert_eq!(determine_outcome(0.3, None), DecisionOutcome::RequireApproval);
        assert_eq!(determine_outcome(0.59, None), DecisionOutcome::RequireApproval);
        assert_eq!(determine_outcome(0.6, None), DecisionOutcome::Escalate);
        assert_eq!(determine_outcome(1.0, None), DecisionOutcome::Escalate);
    }

    #[test]
    fn policy_bands() {
        let p = policy(0.5, 0.9);
        assert_eq!(determine_outcome(0.95, Some(&p)), DecisionOutcome::Block);
        assert_eq!(determine_outcome(0.9, Some(&p)), DecisionOutcome::Block);
        assert_eq!(determine_outcome(0.5, Some(&p)), DecisionOutcome::RequireApproval);
        assert_eq!(determine_outcome(0.4, Some(&p)), DecisionOutcome::Defer);
        assert_eq!(determine_outcome(0.1, Some(&p)), DecisionOutcome::AutoExecute);
    }

    #[test]
    fn disallowed_type_blocks_with_reason() {
        let p = DecisionPolicy::from_spec(
            PolicySpec::new("restarts-only", Environment::Production).allow(ActionType::Restart),
        )
        .unwrap();

        let verdict = evaluate(&ActionType::Patch, 0.0, Some(&p));
        assert_eq!(verdict.outcome, DecisionOutcome::Block);
        assert!(verdict.rationale.contains("'patch' not allowed"));

        let verdict = evaluate(&ActionType::Restart, 0.1, Some(&p));
        assert_eq!(verdict.outcome, DecisionOutcome::AutoExecute);
    }

    #[test]
    fn score_validation() {
        assert!(check_score(0.0).is_ok());
        assert!(check_score(1.0).is_ok());
        assert!(matches!(check_score(1.01), Err(RemedyError::InvalidScore(_))));
        assert!(matches!(check_score(-0.1), Err(RemedyError::InvalidScore(_))));
        assert!(check_score(f64::NAN).is_err());
        assert!(check_score(f64::INFINITY).is_err());
    }

    #[test]
    fn rationale_mentions_max_risk_score() {
        let p = DecisionPolicy::from_spec(
            PolicySpec::new("cap", Environment::Staging)
                .with_thresholds(0.9, 1.0)
                .with_max_risk_score(0.2),
        )
        .unwrap();
        let verdict = evaluate(&ActionType::Scale, 0.25, Some(&p));
        assert_eq!(verdict.outcome, DecisionOutcome::AutoExecute);
        assert!(verdict.rationale.contains("exceeds max_risk_score"));
    }
}

//! Decision lifecycle state machine
//!
//! ```text
//! Proposed -> Scored -> {AutoExecute, RequireApproval, Defer, Escalate, Block}
//! AutoExecute -> Executing -> {Succeeded, Failed}
//! Failed -> RolledBack
//! ```
//!
//! Only auto-execute decisions run, and only failed executions roll back.

use crate::error::LifecycleError;
use crate::types::DecisionOutcome;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
    Proposed,
    Scored,
    AutoExecute,
    RequireApproval,
    Defer,
    Escalate,
    Block,
    Executing,
    Succeeded,
    Failed,
    RolledBack,
}

impl DecisionState {
    /// No further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl From<DecisionOutcome> for DecisionState {
    fn from(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::AutoExecute => DecisionState::AutoExecute,
            DecisionOutcome::RequireApproval => DecisionState::RequireApproval,
            DecisionOutcome::Defer => DecisionState::Defer,
            DecisionOutcome::Escalate => DecisionState::Escalate,
            DecisionOutcome::Block => DecisionState::Block,
        }
    }
}

/// Validate a state transition
///
/// # Errors
/// Returns [`LifecycleError::IllegalTransition`] if `to` is not reachable
/// from `from` in one step.
pub fn validate_transition(from: DecisionState, to: DecisionState) -> Result<(), LifecycleError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(LifecycleError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: DecisionState) -> Vec<DecisionState> {
    use DecisionState::*;
    match from {
        Proposed => vec![Scored],
        Scored => vec![AutoExecute, RequireApproval, Defer, Escalate, Block],
        AutoExecute => vec![Executing],
        Executing => vec![Succeeded, Failed],
        Failed => vec![RolledBack],
        RequireApproval | Defer | Escalate | Block | Succeeded | RolledBack => vec![],
    }
}

/// Tracks one remediation through the state machine
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: DecisionState,
    history: Vec<DecisionState>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecisionState::Proposed,
            history: vec![DecisionState::Proposed],
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> DecisionState {
        self.state
    }

    /// Every state visited, in order
    #[must_use]
    pub fn history(&self) -> &[DecisionState] {
        &self.history
    }

    /// Move to `to` if the transition is legal
    ///
    /// # Errors
    /// Returns [`LifecycleError::IllegalTransition`] and leaves the state
    /// unchanged otherwise.
    pub fn advance(&mut self, to: DecisionState) -> Result<(), LifecycleError> {
        validate_transition(self.state, to)?;
        tracing::debug!("lifecycle {:?} -> {:?}", self.state, to);
        self.state = to;
        self.history.push(to);
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_to_success() {
        let mut lc = Lifecycle::new();
        lc.advance(DecisionState::Scored).unwrap();
        lc.advance(DecisionState::AutoExecute).unwrap();
        lc.advance(DecisionState::Executing).unwrap();
        lc.advance(DecisionState::Succeeded).unwrap();
        assert!(lc.state().is_terminal());
        assert_eq!(lc.history().len(), 5);
    }

    #[test]
    fn only_failed_rolls_back() {
        assert!(validate_transition(DecisionState::Failed, DecisionState::RolledBack).is_ok());
        assert!(validate_transition(DecisionState::Succeeded, DecisionState::RolledBack).is_err());
        assert!(validate_transition(DecisionState::Executing, DecisionState::RolledBack).is_err());
    }

    #[test]
    fn only_auto_execute_runs() {
        for state in [
            DecisionState::RequireApproval,
            DecisionState::Defer,
            DecisionState::Escalate,
            DecisionState::Block,
        ] {
            assert_eq!(
                validate_transition(state, DecisionState::Executing),
                Err(LifecycleError::IllegalTransition {
                    from: state,
                    to: DecisionState::Executing
                })
            );
        }
    }

    #[test]
    fn rejected_advance_keeps_state() {
        let mut lc = Lifecycle::new();
        assert!(lc.advance(DecisionState::Executing).is_err());
        assert_eq!(lc.state(), DecisionState::Proposed);
    }

    #[test]
    fn outcomes_map_to_states() {
        assert_eq!(
            DecisionState::from(DecisionOutcome::Block),
            DecisionState::Block
        );
        assert!(allowed_transitions(DecisionState::Scored)
            .contains(&DecisionState::from(DecisionOutcome::Defer)));
    }
}

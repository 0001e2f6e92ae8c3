use proptest::prelude::*;
use remedy_kernel::lifecycle::{allowed_transitions, validate_transition, DecisionState};
use remedy_kernel::ring::RingBuffer;

fn state() -> impl Strategy<Value = DecisionState> {
    prop_oneof![
        Just(DecisionState::Proposed),
        Just(DecisionState::Scored),
        Just(DecisionState::AutoExecute),
        Just(DecisionState::RequireApproval),
        Just(DecisionState::Defer),
        Just(DecisionState::Escalate),
        Just(DecisionState::Block),
        Just(DecisionState::Executing),
        Just(DecisionState::Succeeded),
        Just(DecisionState::Failed),
        Just(DecisionState::RolledBack),
    ]
}

#[test]
fn test_scored_fans_out_to_outcomes() {
    assert_eq!(allowed_transitions(DecisionState::Scored).len(), 5);
    assert!(validate_transition(DecisionState::Scored, DecisionState::Executing).is_err());
}

#[test]
fn test_rollback_requires_failure() {
    assert!(validate_transition(DecisionState::Failed, DecisionState::RolledBack).is_ok());
    assert!(validate_transition(DecisionState::Succeeded, DecisionState::RolledBack).is_err());
}

proptest! {
    #[test]
    fn prop_validate_agrees_with_table(from in state(), to in state()) {
        let ok = validate_transition(from, to).is_ok();
        prop_assert_eq!(ok, allowed_transitions(from).contains(&to));
    }

    #[test]
    fn prop_only_auto_execute_reaches_executing(from in state()) {
        if validate_transition(from, DecisionState::Executing).is_ok() {
            prop_assert_eq!(from, DecisionState::AutoExecute);
        }
    }

    #[test]
    fn prop_ring_keeps_most_recent(capacity in 1usize..32, extra in 0usize..64) {
        let mut ring = RingBuffer::new(capacity);
        let total = capacity + extra;
        for i in 0..total {
            ring.push(i);
        }
        let kept: Vec<_> = ring.iter().copied().collect();
        let expected: Vec<_> = (total - capacity..total).collect();
        prop_assert_eq!(kept, expected);
    }
}

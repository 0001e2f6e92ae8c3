use proptest::prelude::*;
use remedy_kernel::gate::{determine_outcome, evaluate};
use remedy_kernel::policy::{DecisionPolicy, PolicySpec};
use remedy_kernel::risk::calculate_risk_score;
use remedy_kernel::types::{ActionType, DecisionOutcome, Environment, RiskLevel};

fn action_type() -> impl Strategy<Value = ActionType> {
    prop_oneof![
        Just(ActionType::Restart),
        Just(ActionType::Scale),
        Just(ActionType::Rollback),
        Just(ActionType::Failover),
        Just(ActionType::Patch),
        "[a-z]{3,8}".prop_map(ActionType::from),
    ]
}

fn environment() -> impl Strategy<Value = Environment> {
    prop_oneof![
        Just(Environment::Production),
        Just(Environment::Staging),
        Just(Environment::Development),
        "[a-z]{3,8}".prop_map(Environment::from),
    ]
}

fn policy() -> impl Strategy<Value = DecisionPolicy> {
    (0.0f64..=1.0, 0.0f64..=1.0).prop_map(|(a, b)| {
        let (approval, block) = if a <= b { (a, b) } else { (b, a) };
        DecisionPolicy::from_spec(
            PolicySpec::new("generated", Environment::Production).with_thresholds(approval, block),
        )
        .unwrap()
    })
}

#[test]
fn restart_in_production_scores_low() {
    let assessment = calculate_risk_score(&ActionType::Restart, &Environment::Production, 1);
    assert_eq!(assessment.risk_score, 0.31);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
}

#[test]
fn score_above_block_threshold_blocks() {
    let policy = DecisionPolicy::from_spec(
        PolicySpec::new("prod", Environment::Production).with_thresholds(0.5, 0.9),
    )
    .unwrap();
    assert_eq!(determine_outcome(0.95, Some(&policy)), DecisionOutcome::Block);
}

proptest! {
    #[test]
    fn prop_score_in_unit_interval(t in action_type(), e in environment(), r in 0u32..10_000) {
        let a = calculate_risk_score(&t, &e, r);
        prop_assert!((0.0..=1.0).contains(&a.risk_score));
        prop_assert_eq!(a.risk_level, RiskLevel::from_score(a.risk_score));
    }

    #[test]
    fn prop_score_non_decreasing_in_blast_radius(
        t in action_type(),
        e in environment(),
        r in 0u32..1_000,
        extra in 0u32..1_000,
    ) {
        let lower = calculate_risk_score(&t, &e, r).risk_score;
        let higher = calculate_risk_score(&t, &e, r + extra).risk_score;
        prop_assert!(higher >= lower);
    }

    #[test]
    fn prop_environment_ordering(t in action_type(), r in 0u32..1_000) {
        let prod = calculate_risk_score(&t, &Environment::Production, r).risk_score;
        let staging = calculate_risk_score(&t, &Environment::Staging, r).risk_score;
        let dev = calculate_risk_score(&t, &Environment::Development, r).risk_score;
        prop_assert!(prod >= staging);
        prop_assert!(staging >= dev);
    }

    #[test]
    fn prop_never_auto_execute_at_or_above_block(p in policy(), score in 0.0f64..=1.0) {
        let outcome = determine_outcome(score, Some(&p));
        if score >= p.block_above {
            prop_assert_eq!(outcome, DecisionOutcome::Block);
        }
        if outcome == DecisionOutcome::AutoExecute {
            prop_assert!(score < p.block_above);
            prop_assert!(score < p.require_approval_above);
        }
    }

    #[test]
    fn prop_disallowed_type_always_blocks(score in 0.0f64..=1.0, t in action_type()) {
        prop_assume!(t != ActionType::Restart);
        let p = DecisionPolicy::from_spec(
            PolicySpec::new("restarts", Environment::Production).allow(ActionType::Restart),
        )
        .unwrap();
        let verdict = evaluate(&t, score, Some(&p));
        prop_assert_eq!(verdict.outcome, DecisionOutcome::Block);
        prop_assert!(verdict.rationale.contains("not allowed"));
    }
}

//! Reducer scenarios against the in-memory ledger fake.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use lmr_ledger::wire::{
    CreatedEvent, ExercisedEvent, Transaction, TreeEvent, UpdateCursor,
};
use lmr_ledger::{DynLedger, FailWith, FakeLedger};
use lmr_rewards::{
    CHOICE_CLAIM, CHOICE_EXPIRE, Phase, ReducerConfig, RewardsError, reduce,
};
use lmr_types::RecordTime;

fn rt(minute: u32) -> RecordTime {
    RecordTime(Utc.with_ymd_and_hms(2024, 7, 1, 12, minute, 0).unwrap())
}

fn tx(id: &str, minute: u32, events: Vec<(&str, TreeEvent)>) -> Transaction {
    let root_event_ids = events.iter().map(|(eid, _)| eid.to_string()).collect();
    Transaction {
        update_id: id.to_string(),
        record_time: rt(minute),
        migration_id: 0,
        root_event_ids,
        events_by_id: events
            .into_iter()
            .map(|(eid, event)| (eid.to_string(), event))
            .collect(),
    }
}

fn issuing_round(round: u64, rate: &str) -> TreeEvent {
    TreeEvent::Created(CreatedEvent {
        contract_id: format!("round-{round}"),
        template_id: "acme.ledger:Rewards:IssuingRound".into(),
        create_arguments: json!({ "round": round, "rate_per_weight": rate }),
    })
}

fn closed_round(round: u64, rate: &str) -> TreeEvent {
    TreeEvent::Created(CreatedEvent {
        contract_id: format!("closed-{round}"),
        template_id: "acme.ledger:Rewards:ClosedRound".into(),
        create_arguments: json!({ "round": round, "rate_per_weight": rate }),
    })
}

fn coupon(id: &str, beneficiary: &str, weight: &str, round: u64) -> TreeEvent {
    TreeEvent::Created(CreatedEvent {
        contract_id: id.to_string(),
        template_id: "acme.ledger:Rewards:RewardCoupon".into(),
        create_arguments: json!({
            "beneficiary": beneficiary,
            "weight": weight,
            "round": round
        }),
    })
}

fn consume(id: &str, choice: &str, children: Vec<&str>) -> TreeEvent {
    TreeEvent::Exercised(ExercisedEvent {
        contract_id: id.to_string(),
        template_id: "acme.ledger:Rewards:RewardCoupon".into(),
        choice: choice.to_string(),
        choice_argument: json!({}),
        child_event_ids: children.into_iter().map(String::from).collect(),
    })
}

fn config() -> ReducerConfig {
    ReducerConfig::new(
        "alice",
        UpdateCursor {
            migration_id: 0,
            record_time: rt(0),
        },
        rt(30),
        "5.0".parse().unwrap(),
    )
}

fn ledger_with(transactions: Vec<Transaction>) -> DynLedger {
    let ledger = FakeLedger::new();
    ledger.set_transactions(transactions);
    Arc::new(ledger)
}

#[tokio::test(flavor = "current_thread")]
async fn claim_in_window_pays_weight_times_issuing_rate() {
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0000000000"))]),
        tx("u2", 2, vec![("e1", coupon("cpn-1", "alice", "5.0", 3))]),
        tx("u3", 3, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 1);
    assert_eq!(summary.claimed_amount.to_string(), "10.0000000000");
    assert_eq!(summary.expired_count, 0);
    assert_eq!(summary.unclaimed_count, 0);
    assert_eq!(summary.estimated_unclaimed_amount.to_string(), "0.0000000000");
    assert!(!summary.truncated);
}

#[tokio::test(flavor = "current_thread")]
async fn unconsumed_coupon_counts_as_unclaimed_only() {
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))]),
        tx("u2", 2, vec![("e1", coupon("cpn-1", "alice", "5.0", 3))]),
        tx("u3", 3, vec![("e1", coupon("cpn-2", "alice", "5.0", 3))]),
        tx("u4", 4, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 1);
    assert_eq!(summary.claimed_amount.to_string(), "10.0000000000");
    assert_eq!(summary.unclaimed_count, 1);
    // Extrapolated from the average claimed amount per coupon.
    assert_eq!(summary.estimated_unclaimed_amount.to_string(), "10.0000000000");
}

#[tokio::test(flavor = "current_thread")]
async fn expiry_resolves_against_the_closed_table_minus_minted_weight() {
    let mut cfg = config();
    cfg.expected_weight = "5.0".parse().unwrap();
    let coupon_with_minted = TreeEvent::Created(CreatedEvent {
        contract_id: "cpn-1".into(),
        template_id: "acme.ledger:Rewards:RewardCoupon".into(),
        create_arguments: json!({
            "beneficiary": "alice",
            "weight": "5.0",
            "round": 7,
            "minted_weight": "2.0"
        }),
    });
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", closed_round(7, "1.5000000000"))]),
        tx("u2", 2, vec![("e1", coupon_with_minted)]),
        tx("u3", 3, vec![("e1", consume("cpn-1", CHOICE_EXPIRE, vec![]))]),
    ]);

    let summary = reduce(&ledger, &cfg).await.expect("reduce");
    assert_eq!(summary.expired_count, 1);
    // max(0, 5.0 - 2.0) * 1.5
    assert_eq!(summary.expired_amount.to_string(), "4.5000000000");
    assert_eq!(summary.claimed_count, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn late_round_within_grace_still_resolves_rates() {
    // Round creation lands after the nominal end (minute 30) but inside the
    // ten-minute grace; the in-window claim must still find its rate.
    let ledger = ledger_with(vec![
        tx("u1", 2, vec![("e1", coupon("cpn-1", "alice", "5.0", 9))]),
        tx("u2", 3, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
        tx("u3", 35, vec![("e1", issuing_round(9, "3.0"))]),
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 1);
    assert_eq!(summary.claimed_amount.to_string(), "15.0000000000");
    assert!(summary.warnings.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn events_after_the_window_end_are_not_replayed() {
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))]),
        tx("u2", 2, vec![("e1", coupon("cpn-1", "alice", "5.0", 3))]),
        // Consume lands after the nominal end; the coupon stays outstanding.
        tx("u3", 31, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 0);
    assert_eq!(summary.unclaimed_count, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn coupons_are_found_deep_in_the_event_tree() {
    let batch_op = TreeEvent::Exercised(ExercisedEvent {
        contract_id: "batch-1".into(),
        template_id: "acme.ledger:Rewards:RewardDistribution".into(),
        choice: "RewardDistribution_Run".into(),
        choice_argument: json!({}),
        child_event_ids: vec!["e2".into(), "e3".into()],
    });
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))]),
        Transaction {
            update_id: "u2".into(),
            record_time: rt(2),
            migration_id: 0,
            root_event_ids: vec!["e1".into()],
            events_by_id: HashMap::from([
                ("e1".to_string(), batch_op),
                ("e2".to_string(), coupon("cpn-1", "alice", "5.0", 3)),
                ("e3".to_string(), consume("cpn-1", CHOICE_CLAIM, vec![])),
            ]),
        },
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 1);
    assert_eq!(summary.claimed_amount.to_string(), "10.0000000000");
}

#[tokio::test(flavor = "current_thread")]
async fn weight_mismatch_is_not_accounted() {
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))]),
        tx("u2", 2, vec![("e1", coupon("cpn-1", "alice", "7.0", 3))]),
        tx("u3", 3, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 0);
    assert_eq!(summary.unclaimed_count, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn other_beneficiaries_are_ignored() {
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))]),
        tx("u2", 2, vec![("e1", coupon("cpn-1", "bob", "5.0", 3))]),
        tx("u3", 3, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
    ]);

    let summary = reduce(&ledger, &config()).await.expect("reduce");
    assert_eq!(summary.claimed_count, 0);
    assert_eq!(summary.unclaimed_count, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn batch_ceiling_yields_partial_result_with_warning() {
    let mut cfg = config();
    cfg.max_batches = 1;
    cfg.page_size = 1;
    let ledger = ledger_with(vec![
        tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))]),
        tx("u2", 2, vec![("e1", coupon("cpn-1", "alice", "5.0", 3))]),
        tx("u3", 3, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
    ]);

    let summary = reduce(&ledger, &cfg).await.expect("partial, not an error");
    assert!(summary.truncated);
    assert!(!summary.warnings.is_empty());
    assert_eq!(summary.claimed_count, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_input_fails_before_any_fetch() {
    let ledger: DynLedger = Arc::new(FakeLedger::new());

    let mut empty_beneficiary = config();
    empty_beneficiary.beneficiary = "  ".into();
    assert!(matches!(
        reduce(&ledger, &empty_beneficiary).await,
        Err(RewardsError::InvalidInput(_))
    ));

    let mut inverted_window = config();
    inverted_window.end_time = rt(0);
    assert!(matches!(
        reduce(&ledger, &inverted_window).await,
        Err(RewardsError::InvalidInput(_))
    ));

    let mut zero_weight = config();
    zero_weight.expected_weight = lmr_types::Amount::ZERO;
    assert!(matches!(
        reduce(&ledger, &zero_weight).await,
        Err(RewardsError::InvalidInput(_))
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn upstream_failure_reports_the_phase() {
    let ledger = FakeLedger::new();
    ledger.set_transactions(vec![tx("u1", 1, vec![("e1", issuing_round(3, "2.0"))])]);
    ledger.fail_next(FailWith::Timeout);
    let ledger: DynLedger = Arc::new(ledger);

    let err = reduce(&ledger, &config()).await.expect_err("aborts");
    match err {
        RewardsError::Upstream { phase, batch, .. } => {
            assert_eq!(phase, Phase::CollectingRounds);
            assert_eq!(batch, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn grace_configuration_is_respected() {
    let mut cfg = config();
    cfg.grace = Duration::minutes(2);
    // Round lands past end + grace: claims cannot resolve, counted at zero
    // with an explicit warning.
    let ledger = ledger_with(vec![
        tx("u1", 2, vec![("e1", coupon("cpn-1", "alice", "5.0", 9))]),
        tx("u2", 3, vec![("e1", consume("cpn-1", CHOICE_CLAIM, vec![]))]),
        tx("u3", 40, vec![("e1", issuing_round(9, "3.0"))]),
    ]);

    let summary = reduce(&ledger, &cfg).await.expect("reduce");
    assert_eq!(summary.claimed_count, 1);
    assert_eq!(summary.claimed_amount.to_string(), "0.0000000000");
    assert!(!summary.warnings.is_empty());
}

mod support;

use chrono::{Duration, Utc};
use taskpay_common::Cents;
use taskpay_engine::{
    db_types::{NewOrder, OrderStatus, Role, UserId},
    traits::{AccountManagement, EscrowDatabase, EscrowError},
    LifecycleSettings,
};

use crate::support::{lifecycle_api, prepare_test_env, ScriptedGateway};

const ALICE: UserId = UserId(1001);
const BOB: UserId = UserId(1002);
const CAROL: UserId = UserId(1003);

fn order_for(requester: UserId, amount: i64) -> NewOrder {
    NewOrder::new(requester, "Design a logo", "SVG plus a PNG export", Cents::from(amount), Utc::now() + Duration::days(3))
}

#[tokio::test]
async fn happy_path_pays_the_worker() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let api = lifecycle_api(db, gateway.clone(), LifecycleSettings::default());

    api.register_role(ALICE, Role::Requester).await.unwrap();
    api.register_role(BOB, Role::Worker).await.unwrap();
    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(1000)).await.unwrap();

    let order = api.create_order(order_for(ALICE, 300)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    let alice = api.db().fetch_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.balance, Cents::from(700), "escrow must be debited at creation");

    api.apply_to_order(order.id, BOB).await.unwrap();
    let assigned = api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    assert_eq!(assigned.status, OrderStatus::InProgress);
    assert_eq!(assigned.worker, Some(BOB));

    let outcome = api.mark_delivered(order.id, BOB).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatus::WaitingConfirmation);
    assert!(outcome.dispatch_error.is_none());
    let sent = gateway.last_sent().expect("a confirmation mail must have gone out");
    assert_eq!(sent.to, "bob@example.com");
    assert_eq!(sent.order_id, order.id);
    assert_eq!(sent.code.len(), 6);

    // Bob forwards the mail back from his registered address.
    gateway.forward_confirmation("Bob <bob@example.com>", order.id, &sent.code);
    let completed = api.check_confirmations(BOB).await.unwrap().expect("the forwarded code must confirm");
    assert_eq!(completed.id, order.id);
    assert_eq!(completed.status, OrderStatus::Completed);

    let alice = api.db().fetch_account(ALICE).await.unwrap().unwrap();
    let bob = api.db().fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(alice.balance, Cents::from(700));
    assert_eq!(bob.balance, Cents::from(300));

    // The code is single-use; a second scan of the same inbox confirms nothing.
    assert!(api.check_confirmations(BOB).await.unwrap().is_none());
    let bob = api.db().fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(bob.balance, Cents::from(300));
}

#[tokio::test]
async fn underfunded_orders_are_rejected_without_side_effects() {
    let db = prepare_test_env().await;
    let api = lifecycle_api(db, ScriptedGateway::new(), LifecycleSettings::default());

    api.top_up(ALICE, Cents::from(100)).await.unwrap();
    let result = api.create_order(order_for(ALICE, 300)).await;
    assert!(matches!(result, Err(EscrowError::InsufficientFunds { .. })));

    let alice = api.db().fetch_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.balance, Cents::from(100), "a failed creation must not touch the balance");
    assert!(api.orders_for_requester(ALICE).await.unwrap().is_empty());

    let result = api.create_order(order_for(ALICE, 0)).await;
    assert!(matches!(result, Err(EscrowError::InvalidAmount(_))));
}

#[tokio::test]
async fn applications_are_unique_and_never_by_the_owner() {
    let db = prepare_test_env().await;
    let api = lifecycle_api(db, ScriptedGateway::new(), LifecycleSettings::default());

    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();

    assert!(matches!(api.apply_to_order(order.id, ALICE).await, Err(EscrowError::CannotApplyToOwnOrder(_))));

    api.apply_to_order(order.id, BOB).await.unwrap();
    let result = api.apply_to_order(order.id, BOB).await;
    assert!(matches!(result, Err(EscrowError::AlreadyApplied { .. })));
    assert_eq!(api.responses_for_order(order.id).await.unwrap().len(), 1);

    assert!(matches!(api.apply_to_order(9999, BOB).await, Err(EscrowError::OrderNotFound(9999))));
}

#[tokio::test]
async fn assignment_requires_ownership_and_an_application() {
    let db = prepare_test_env().await;
    let api = lifecycle_api(db, ScriptedGateway::new(), LifecycleSettings::default());

    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();

    assert!(matches!(
        api.assign_worker(order.id, CAROL, BOB).await,
        Err(EscrowError::NotOwner { .. })
    ));
    assert!(matches!(
        api.assign_worker(order.id, ALICE, CAROL).await,
        Err(EscrowError::UnknownApplicant { .. })
    ));

    api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    // The order has left `open`; late applications and re-assignments bounce.
    assert!(matches!(api.apply_to_order(order.id, CAROL).await, Err(EscrowError::OrderNotOpen(_))));
    assert!(matches!(api.assign_worker(order.id, ALICE, BOB).await, Err(EscrowError::OrderNotOpen(_))));
}

#[tokio::test]
async fn delivery_needs_the_assigned_worker_and_a_contact_address() {
    let db = prepare_test_env().await;
    let api = lifecycle_api(db, ScriptedGateway::new(), LifecycleSettings::default());

    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();

    // Not assigned yet.
    assert!(matches!(
        api.mark_delivered(order.id, BOB).await,
        Err(EscrowError::NotAssignedWorker { .. })
    ));

    api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    assert!(matches!(
        api.mark_delivered(order.id, CAROL).await,
        Err(EscrowError::NotAssignedWorker { .. })
    ));
    // No registered e-mail: the transition must not happen, or the code could never be delivered.
    assert!(matches!(api.mark_delivered(order.id, BOB).await, Err(EscrowError::NoContactEmail(_))));
    let order = api.db().fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::InProgress);
    assert!(order.confirm_code.is_none());
}

#[tokio::test]
async fn broken_outbound_mail_does_not_roll_back_the_delivery() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let api = lifecycle_api(db, gateway.clone(), LifecycleSettings::default());

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();
    api.assign_worker(order.id, ALICE, BOB).await.unwrap();

    gateway.break_outbound();
    let outcome = api.mark_delivered(order.id, BOB).await.unwrap();
    assert!(outcome.dispatch_error.is_some());
    assert_eq!(outcome.order.status, OrderStatus::WaitingConfirmation);
    assert!(outcome.order.confirm_code.is_some(), "the issued code must survive the failed dispatch");
}

#[tokio::test]
async fn lapsed_confirmation_window_refunds_the_requester() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    // A negative window puts the deadline in the past the moment the order is delivered.
    let settings = LifecycleSettings { confirm_window: Duration::hours(-1), ..Default::default() };
    let api = lifecycle_api(db, gateway.clone(), settings);

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();
    api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    api.mark_delivered(order.id, BOB).await.unwrap();

    let refunded = api.expire_overdue_orders().await.unwrap();
    assert_eq!(refunded.len(), 1);
    assert_eq!(refunded[0].id, order.id);
    assert_eq!(refunded[0].status, OrderStatus::Refunded);
    let alice = api.db().fetch_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.balance, Cents::from(500), "the full escrow must come back");

    // The sweep is idempotent.
    assert!(api.expire_overdue_orders().await.unwrap().is_empty());

    // A code arriving after the refund confirms nothing and moves no money.
    let code = gateway.last_sent().unwrap().code;
    gateway.forward_confirmation("bob@example.com", order.id, &code);
    assert!(api.check_confirmations(BOB).await.unwrap().is_none());
    let bob = api.db().fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(bob.balance, Cents::from(0));
}

#[tokio::test]
async fn first_valid_candidate_wins_the_scan() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let api = lifecycle_api(db, gateway.clone(), LifecycleSettings::default());

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(1000)).await.unwrap();
    let mut delivered = Vec::new();
    for _ in 0..2 {
        let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
        api.apply_to_order(order.id, BOB).await.unwrap();
        api.assign_worker(order.id, ALICE, BOB).await.unwrap();
        api.mark_delivered(order.id, BOB).await.unwrap();
        delivered.push(order.id);
    }
    let sent = gateway.sent_mails();
    assert_eq!(sent.len(), 2);

    // A garbage mail, a spoofed sender, a wrong code, then two genuine forwards. The second order's forward
    // arrived first, so it confirms first.
    gateway.push_raw("bob@example.com", "hello", "no markers at all");
    gateway.forward_confirmation("mallory@example.com", sent[0].order_id, &sent[0].code);
    gateway.push_raw("bob@example.com", "Fwd", &format!("ORDER-{} CODE-000000", sent[0].order_id));
    gateway.forward_confirmation("bob@example.com", sent[1].order_id, &sent[1].code);
    gateway.forward_confirmation("bob@example.com", sent[0].order_id, &sent[0].code);

    let first = api.check_confirmations(BOB).await.unwrap().unwrap();
    assert_eq!(first.id, sent[1].order_id);
    let second = api.check_confirmations(BOB).await.unwrap().unwrap();
    assert_eq!(second.id, sent[0].order_id);
    assert!(api.check_confirmations(BOB).await.unwrap().is_none());

    let bob = api.db().fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(bob.balance, Cents::from(400));
}

#[tokio::test]
async fn wrong_code_is_a_mismatch_and_settles_nothing() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let api = lifecycle_api(db.clone(), gateway.clone(), LifecycleSettings::default());

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();
    api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    api.mark_delivered(order.id, BOB).await.unwrap();

    // Issued codes never have a leading zero, so this one is always wrong.
    let err = db.confirm_delivery(order.id, "000000").await.unwrap_err();
    assert!(matches!(err, EscrowError::CodeMismatch(_)));

    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::WaitingConfirmation);
    let bob = db.fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(bob.balance, Cents::from(0));
    // The failed attempt must not consume the wrong code either.
    assert!(!db.is_code_used("000000").await.unwrap());

    // The genuine code still works afterwards.
    let code = gateway.last_sent().unwrap().code;
    gateway.forward_confirmation("bob@example.com", order.id, &code);
    assert!(api.check_confirmations(BOB).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_confirmations_credit_exactly_once() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let api = lifecycle_api(db.clone(), gateway.clone(), LifecycleSettings::default());

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();
    api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    api.mark_delivered(order.id, BOB).await.unwrap();
    let code = gateway.last_sent().unwrap().code;

    let (db1, db2) = (db.clone(), db.clone());
    let (code1, code2) = (code.clone(), code.clone());
    let id = order.id;
    let a = tokio::spawn(async move { db1.confirm_delivery(id, &code1).await });
    let b = tokio::spawn(async move { db2.confirm_delivery(id, &code2).await });
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one of two racing confirmations may commit");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser,
        Err(EscrowError::CodeAlreadyUsed) | Err(EscrowError::OrderWrongState(_))
    ));

    let bob = db.fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(bob.balance, Cents::from(200), "the escrow must be released exactly once");
    let alice = db.fetch_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.balance, Cents::from(300));
}

#[tokio::test]
async fn confirmation_and_refund_race_settles_exactly_once() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let settings = LifecycleSettings { confirm_window: Duration::hours(-1), ..Default::default() };
    let api = lifecycle_api(db.clone(), gateway.clone(), settings);

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(500)).await.unwrap();
    let order = api.create_order(order_for(ALICE, 200)).await.unwrap();
    api.apply_to_order(order.id, BOB).await.unwrap();
    api.assign_worker(order.id, ALICE, BOB).await.unwrap();
    api.mark_delivered(order.id, BOB).await.unwrap();
    let code = gateway.last_sent().unwrap().code;

    let (db1, db2) = (db.clone(), db.clone());
    let id = order.id;
    let now = Utc::now();
    let confirm = tokio::spawn(async move { db1.confirm_delivery(id, &code).await });
    let refund = tokio::spawn(async move { db2.refund_expired_order(id, now).await });
    let (confirm, refund) = (confirm.await.unwrap(), refund.await.unwrap());

    let confirmed = confirm.is_ok();
    let refunded = matches!(refund, Ok(Some(_)));
    assert!(confirmed ^ refunded, "exactly one settlement path may win");

    let alice = db.fetch_account(ALICE).await.unwrap().unwrap();
    let bob = db.fetch_account(BOB).await.unwrap().unwrap();
    assert_eq!(alice.balance + bob.balance, Cents::from(500), "money must be conserved either way");
    let order = db.fetch_order(id).await.unwrap().unwrap();
    assert!(order.status.is_terminal());
}

#[tokio::test]
async fn listings_follow_the_lifecycle() {
    let db = prepare_test_env().await;
    let gateway = ScriptedGateway::new();
    let api = lifecycle_api(db, gateway.clone(), LifecycleSettings::default());

    api.register_email(BOB, "bob@example.com").await.unwrap();
    api.top_up(ALICE, Cents::from(1000)).await.unwrap();
    api.top_up(CAROL, Cents::from(1000)).await.unwrap();
    let mine = api.create_order(order_for(ALICE, 200)).await.unwrap();
    let theirs = api.create_order(order_for(CAROL, 300)).await.unwrap();

    // A worker browsing open orders never sees their own.
    let open_for_alice = api.open_orders_for(ALICE).await.unwrap();
    assert_eq!(open_for_alice, vec![theirs.clone()]);
    let open_for_bob = api.open_orders_for(BOB).await.unwrap();
    assert_eq!(open_for_bob.len(), 2);

    api.apply_to_order(mine.id, BOB).await.unwrap();
    api.assign_worker(mine.id, ALICE, BOB).await.unwrap();
    let active = api.active_orders_for_worker(BOB).await.unwrap();
    assert_eq!(active, vec![mine.clone()]);
    assert_eq!(api.open_orders_for(BOB).await.unwrap(), vec![theirs.clone()]);

    api.mark_delivered(mine.id, BOB).await.unwrap();
    // Waiting for confirmation still counts as active work.
    assert_eq!(api.active_orders_for_worker(BOB).await.unwrap(), vec![mine.clone()]);

    let code = gateway.last_sent().unwrap().code;
    gateway.forward_confirmation("bob@example.com", mine.id, &code);
    api.check_confirmations(BOB).await.unwrap().unwrap();
    assert!(api.active_orders_for_worker(BOB).await.unwrap().is_empty());
    assert_eq!(api.orders_for_requester(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn contact_email_is_validated_and_required_for_scanning() {
    let db = prepare_test_env().await;
    let api = lifecycle_api(db, ScriptedGateway::new(), LifecycleSettings::default());

    assert!(matches!(
        api.register_email(BOB, "not-an-address").await,
        Err(EscrowError::InvalidEmail(_))
    ));
    api.register_role(BOB, Role::Worker).await.unwrap();
    assert!(matches!(api.check_confirmations(BOB).await, Err(EscrowError::NoContactEmail(_))));
    assert!(matches!(api.check_confirmations(CAROL).await, Err(EscrowError::AccountNotFound(_))));
}

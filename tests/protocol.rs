//! Сквозные сценарии протокола верификации, прав на выдачу и заказов
//! на базе в памяти и управляемых часов.

use std::sync::Arc;

use filegate::clock::{Clock, ManualClock};
use filegate::db::{ConfirmOutcome, Db, OrderStatus};
use filegate::entitlement;
use filegate::jobs;
use filegate::token::{DeepLink, TokenPayload};
use filegate::verification::{Outcome, VerificationProtocol};

const SECRET: &str = "test-operator-secret";
const USER: i64 = 10_001;

async fn setup(start: i64) -> (Arc<Db>, Arc<ManualClock>, VerificationProtocol) {
    let db = Arc::new(Db::open_in_memory().await.unwrap());
    let clock = Arc::new(ManualClock::new(start));
    let protocol = VerificationProtocol::new(
        SECRET,
        Arc::clone(&db),
        Arc::clone(&clock) as Arc<dyn Clock>,
        1,
    );
    (db, clock, protocol)
}

#[tokio::test]
async fn full_verified_flow_grants_access() {
    let (db, clock, protocol) = setup(1_000).await;

    let token = protocol
        .issue(USER, Some("FILE1".to_string()), Some(7))
        .unwrap();

    // Пользователь прошёл шортлинк: визит зафиксирован, отсчёт завершён.
    protocol.record_visit(&token).await.unwrap();
    let resolution = protocol.resolve(&token).await.unwrap();
    assert_eq!(resolution.outcome, Outcome::Verified);
    assert_eq!(resolution.user_id, USER);
    assert_eq!(resolution.post_no, Some(7));
    assert!(resolution.deep_link_arg.starts_with("verified_"));

    // Бот потребляет подписанный ответ и начисляет доступ.
    let link = DeepLink::parse(&resolution.deep_link_arg).unwrap();
    let DeepLink::Verified(signed) = link else {
        panic!("ожидался verified deep link");
    };
    let payload = protocol.consume(&signed).unwrap();
    assert!(matches!(payload, TokenPayload::Verified { user_id, .. } if user_id == USER));

    let until = protocol.grant_free_access(USER).await.unwrap();
    assert_eq!(until, clock.now() + 3600);

    let user = db.get_user(USER).await.unwrap();
    assert!(entitlement::evaluate(user.as_ref(), clock.now()).may_deliver());
}

#[tokio::test]
async fn skipping_shortlink_is_detected_as_bypass() {
    let (db, clock, protocol) = setup(1_000).await;

    let token = protocol.issue(USER, None, None).unwrap();

    // Визита не было: пользователь добыл конечный URL в обход.
    let resolution = protocol.resolve(&token).await.unwrap();
    assert_eq!(resolution.outcome, Outcome::Bypass);
    assert!(resolution.deep_link_arg.starts_with("bypass_"));

    let DeepLink::Bypass(signed) = DeepLink::parse(&resolution.deep_link_arg).unwrap() else {
        panic!("ожидался bypass deep link");
    };
    let payload = protocol.consume(&signed).unwrap();
    assert!(matches!(payload, TokenPayload::Bypass { user_id, .. } if user_id == USER));

    // Доступ не начислен.
    let user = db.get_user(USER).await.unwrap();
    assert!(!entitlement::evaluate(user.as_ref(), clock.now()).may_deliver());
}

#[tokio::test]
async fn visit_record_is_keyed_by_exact_token() {
    let (_db, _clock, protocol) = setup(1_000).await;

    // Два выпуска для одного пользователя — разные токены, визит по одному
    // не легализует второй.
    let token_a = protocol.issue(USER, None, None).unwrap();
    let token_b = protocol.issue(USER, None, None).unwrap();
    assert_ne!(token_a, token_b);

    protocol.record_visit(&token_a).await.unwrap();
    assert_eq!(
        protocol.resolve(&token_a).await.unwrap().outcome,
        Outcome::Verified
    );
    assert_eq!(
        protocol.resolve(&token_b).await.unwrap().outcome,
        Outcome::Bypass
    );
}

#[tokio::test]
async fn raw_verify_token_is_not_accepted_as_inbound() {
    let (_db, _clock, protocol) = setup(1_000).await;

    // Исходящий токен без конверта redirect-сервера не проходит там, где
    // ждут verified_/bypass_.
    let token = protocol.issue(USER, None, None).unwrap();
    assert!(protocol.consume(&token).is_err());
}

#[tokio::test]
async fn verification_resets_instead_of_stacking() {
    let (db, clock, protocol) = setup(10_000).await;

    let first = protocol.grant_free_access(USER).await.unwrap();
    assert_eq!(first, 13_600);

    // Повторная выдача через полчаса сбрасывает срок, а не прибавляет.
    clock.advance(1_800);
    let second = protocol.grant_free_access(USER).await.unwrap();
    assert_eq!(second, 15_400);

    // Премиум, наоборот, стекируется поверх неистёкшего срока.
    let expiry_one = db.activate_premium(USER, 30, "m1", clock.now()).await.unwrap();
    assert_eq!(expiry_one, clock.now() + 30 * 86_400);
    let expiry_two = db.activate_premium(USER, 30, "m1", clock.now()).await.unwrap();
    assert_eq!(expiry_two, expiry_one + 30 * 86_400);

    // Истёкший премиум начинается заново от текущего момента.
    clock.set(expiry_two + 1);
    let expiry_three = db.activate_premium(USER, 7, "w1", clock.now()).await.unwrap();
    assert_eq!(expiry_three, clock.now() + 7 * 86_400);
}

#[tokio::test]
async fn entitlements_expire_lazily_without_sweep() {
    let (db, clock, protocol) = setup(50_000).await;

    protocol.grant_free_access(USER).await.unwrap();
    assert!(
        entitlement::evaluate(db.get_user(USER).await.unwrap().as_ref(), clock.now())
            .may_deliver()
    );

    // Срок вышел, sweep ещё не ходил: флаг в записи стоит, решение — отказ.
    clock.advance(3_601);
    let user = db.get_user(USER).await.unwrap();
    assert!(user.as_ref().unwrap().is_verified);
    assert!(!entitlement::evaluate(user.as_ref(), clock.now()).may_deliver());

    // Sweep приводит флаги в согласие со сроками.
    jobs::cleanup_entitlements(&db, clock.now()).await.unwrap();
    let user = db.get_user(USER).await.unwrap().unwrap();
    assert!(!user.is_verified);
    assert!(user.verified_until.is_none());
}

#[tokio::test]
async fn order_lifecycle_is_monotonic() {
    let (db, clock, _protocol) = setup(1_000).await;

    db.upsert_plan("m1", "Месяц", 30, 99.0, clock.now())
        .await
        .unwrap();
    let order = db
        .create_order("ORD-1", USER, "m1", 99.07, 10, 10, clock.now())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.expires_at, clock.now() + 600);
    assert_eq!(order.confirm_until, clock.now() + 36_000);

    // pending → paid, повторное подтверждение — no-op.
    assert_eq!(
        db.confirm_order("ORD-1", clock.now()).await.unwrap(),
        ConfirmOutcome::Confirmed
    );
    assert_eq!(
        db.confirm_order("ORD-1", clock.now()).await.unwrap(),
        ConfirmOutcome::AlreadyPaid
    );

    // Возврат только из paid; из refunded обратного пути нет.
    assert!(db.refund_order("ORD-1").await.unwrap());
    assert!(!db.refund_order("ORD-1").await.unwrap());
    assert_eq!(
        db.confirm_order("ORD-1", clock.now()).await.unwrap(),
        ConfirmOutcome::Closed(OrderStatus::Refunded)
    );

    assert_eq!(
        db.confirm_order("ORD-нет", clock.now()).await.unwrap(),
        ConfirmOutcome::NotFound
    );
}

#[tokio::test]
async fn pending_orders_expire_by_qr_window() {
    let (db, clock, _protocol) = setup(1_000).await;

    db.create_order("ORD-QR", USER, "m1", 50.0, 10, 10, clock.now())
        .await
        .unwrap();
    db.create_order("ORD-OK", USER, "m1", 50.0, 120, 10, clock.now())
        .await
        .unwrap();

    clock.advance(601);
    let expired = jobs::expire_orders(&db, clock.now()).await.unwrap();
    assert_eq!(expired, 1);

    assert_eq!(
        db.get_order("ORD-QR").await.unwrap().unwrap().status,
        OrderStatus::Expired
    );
    assert_eq!(
        db.get_order("ORD-OK").await.unwrap().unwrap().status,
        OrderStatus::Pending
    );

    // Истёкший заказ больше не подтверждается.
    assert_eq!(
        db.confirm_order("ORD-QR", clock.now()).await.unwrap(),
        ConfirmOutcome::Closed(OrderStatus::Expired)
    );
}

#[tokio::test]
async fn visit_log_pruning_respects_retention() {
    let (db, clock, protocol) = setup(1_000).await;

    let token = protocol.issue(USER, None, None).unwrap();
    protocol.record_visit(&token).await.unwrap();
    assert!(db.visit_exists(USER, &token).await.unwrap());

    // Внутри окна хранения запись живёт.
    clock.advance(3_600);
    jobs::prune_visits(&db, 6, clock.now()).await.unwrap();
    assert!(db.visit_exists(USER, &token).await.unwrap());

    clock.advance(6 * 3_600);
    let pruned = jobs::prune_visits(&db, 6, clock.now()).await.unwrap();
    assert_eq!(pruned, 1);
    assert!(!db.visit_exists(USER, &token).await.unwrap());

    // После чистки разрешение того же токена трактуется как обход.
    assert_eq!(
        protocol.resolve(&token).await.unwrap().outcome,
        Outcome::Bypass
    );
}

#[tokio::test]
async fn tampered_inbound_link_fails_closed() {
    let (_db, _clock, protocol) = setup(1_000).await;

    let token = protocol.issue(USER, None, None).unwrap();
    protocol.record_visit(&token).await.unwrap();
    let resolution = protocol.resolve(&token).await.unwrap();

    let signed = resolution
        .deep_link_arg
        .strip_prefix("verified_")
        .unwrap()
        .to_string();
    let mut forged = signed.clone();
    forged.pop();
    forged.push(if signed.ends_with('A') { 'B' } else { 'A' });
    assert!(protocol.consume(&forged).is_err());

    // Ответ, подписанный чужим секретом, тоже не проходит.
    let (other_db, other_clock, _) = setup(1_000).await;
    let foreign = VerificationProtocol::new(
        "another-secret",
        other_db,
        other_clock as Arc<dyn Clock>,
        1,
    );
    assert!(foreign.consume(&signed).is_err());
}

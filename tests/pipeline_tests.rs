mod common;

use common::{fund, harness, press, register};
use live_shop::application::messages;
use live_shop::domain::interaction::ActionKind;
use live_shop::domain::interaction::UserId;
use live_shop::error::ErrorKind;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_concurrent_same_action_gets_cooldown() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 500).await;
    h.backends.balance.set_latency(Duration::from_secs(2));

    let first = press(1, ActionKind::Balance);
    let second = press(1, ActionKind::Balance);
    let (a, b) = tokio::join!(h.shop.handle(&first), h.shop.handle(&second));

    assert!(a.is_success());
    assert_eq!(b.error, Some(ErrorKind::Cooldown));
    assert_eq!(b.reply.title(), "⏳ Please Wait");
    assert_eq!(b.reply.description(), messages::COOLDOWN);
    assert_eq!(h.shop.pipeline().lock().held_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_different_users_run_concurrently() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 500).await;
    fund(&h.backends, 2, "PLAYER_TWO", 700).await;
    h.backends.balance.set_latency(Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    let press_a = press(1, ActionKind::Balance);
    let press_b = press(2, ActionKind::Balance);
    let (a, b) = tokio::join!(h.shop.handle(&press_a), h.shop.handle(&press_b));

    assert!(a.is_success());
    assert!(b.is_success());
    // Both ran side by side rather than one after the other.
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_same_user_different_actions_do_not_block() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 500).await;
    h.backends.balance.set_latency(Duration::from_secs(2));

    let press_balance = press(1, ActionKind::Balance);
    let press_world = press(1, ActionKind::WorldInfo);
    let (balance, world) = tokio::join!(
        h.shop.handle(&press_balance),
        h.shop.handle(&press_world)
    );
    assert!(balance.is_success());
    assert!(world.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_lock_released_after_timeout() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 500).await;
    h.backends.balance.set_latency(Duration::from_secs(11));

    let slow = h.shop.handle(&press(1, ActionKind::Balance)).await;
    assert_eq!(slow.error, Some(ErrorKind::Timeout));
    assert_eq!(h.shop.pipeline().lock().held_count(), 0);

    h.backends.balance.set_latency(Duration::ZERO);
    let retry = h.shop.handle(&press(1, ActionKind::Balance)).await;
    assert!(retry.is_success());
}

#[tokio::test]
async fn test_maintenance_short_circuits_before_backends() {
    let h = harness().await;
    h.backends.admin.set_maintenance(true);
    let before = h.backends.data_calls();

    for kind in [
        ActionKind::Register,
        ActionKind::Balance,
        ActionKind::WorldInfo,
        ActionKind::Buy,
        ActionKind::History,
    ] {
        let outcome = h.shop.handle(&press(1, kind)).await;
        assert_eq!(outcome.reply.description(), messages::MAINTENANCE, "{kind}");
    }
    let submitted = h.shop.handle(&register(1, "PLAYER_ONE")).await;
    assert_eq!(submitted.reply.description(), messages::MAINTENANCE);

    assert_eq!(h.backends.data_calls(), before);
}

#[tokio::test]
async fn test_blacklisted_user_is_refused() {
    let h = harness().await;
    fund(&h.backends, 9, "SPAMMER", 500).await;
    h.backends.admin.blacklist(UserId(9));

    let outcome = h.shop.handle(&press(9, ActionKind::Balance)).await;
    assert_eq!(outcome.error, Some(ErrorKind::Validation));
    assert_eq!(outcome.reply.description(), messages::BLACKLISTED);

    let other = h.shop.handle(&press(1, ActionKind::WorldInfo)).await;
    assert!(other.is_success());
}

#[tokio::test]
async fn test_every_action_yields_one_reply() {
    let h = harness().await;
    for kind in [
        ActionKind::Register,
        ActionKind::Balance,
        ActionKind::WorldInfo,
        ActionKind::Buy,
        ActionKind::History,
        ActionKind::SubmitRegistration,
        ActionKind::SubmitPurchase,
    ] {
        let outcome = h.shop.handle(&press(3, kind)).await;
        assert_eq!(outcome.action, kind);
        assert!(!outcome.reply.title().is_empty(), "{kind}");
    }
    assert_eq!(h.shop.pipeline().lock().held_count(), 0);
}

mod common;

use common::{fund, harness, order, press};
use live_shop::application::messages;
use live_shop::domain::balance::{Balance, GrowId};
use live_shop::domain::interaction::{ActionKind, UserId};
use live_shop::domain::message::{Modal, Reply};
use live_shop::domain::ports::ProductService;
use live_shop::domain::product::ProductCode;
use live_shop::error::ErrorKind;
use std::time::Duration;

#[tokio::test]
async fn test_quantity_boundaries() {
    let h = harness().await;
    for user in 1..=4 {
        fund(&h.backends, user, &format!("BUYER_{user}"), 1_000_000).await;
    }

    let zero = h.shop.handle(&order(1, "SEED", "0")).await;
    assert_eq!(zero.error, Some(ErrorKind::Validation));

    let too_many = h.shop.handle(&order(2, "DL", "1000")).await;
    assert_eq!(too_many.error, Some(ErrorKind::Validation));

    let one = h.shop.handle(&order(3, "DL", "1")).await;
    assert_eq!(one.reply.title(), "✅ Purchase Successful");

    // 999 is accepted and queued; the worker then fails it for lack of stock.
    let max = h.shop.handle(&order(4, "DL", "999")).await;
    assert_eq!(max.reply.title(), "⏳ Transaction Processing");
    h.backends.transactions.wait_idle().await;
    let notifications = h.backends.transactions.notifications().await;
    assert!(notifications[0].result.is_err());
}

#[tokio::test]
async fn test_threshold_routes_inline_or_queued() {
    let h = harness().await;
    fund(&h.backends, 1, "SMALL_BUYER", 10_000).await;
    fund(&h.backends, 2, "BIG_BUYER", 10_000).await;

    let inline = h.shop.handle(&order(1, "DL", "10")).await;
    assert_eq!(inline.reply.title(), "✅ Purchase Successful");
    assert!(h.backends.transactions.notifications().await.is_empty());

    let queued = h.shop.handle(&order(2, "DL", "11")).await;
    assert_eq!(queued.reply.description(), messages::PROCESSING);

    h.backends.transactions.wait_idle().await;
    let notifications = h.backends.transactions.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user, UserId(2));

    let big = GrowId::parse("BIG_BUYER").unwrap();
    assert_eq!(
        h.backends.balance.balance_of(&big).await,
        Some(Balance::from_wl(10_000 - 11 * 100))
    );
    let dl = ProductCode::parse("DL").unwrap();
    assert_eq!(h.backends.products.get_stock_count(&dl).await, Ok(40 - 21));
}

#[tokio::test(start_paused = true)]
async fn test_purchase_rate_limit_expires() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 10_000).await;

    assert!(h.shop.handle(&order(1, "DL", "1")).await.is_success());

    tokio::time::advance(Duration::from_secs(299)).await;
    let early = h.shop.handle(&order(1, "DL", "1")).await;
    assert_eq!(early.error, Some(ErrorKind::Cooldown));
    assert_eq!(early.reply.description(), messages::RATE_LIMIT);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(h.shop.handle(&order(1, "DL", "1")).await.is_success());
}

#[tokio::test]
async fn test_buy_form_hides_sold_out_products() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 100).await;

    let outcome = h.shop.handle(&press(1, ActionKind::Buy)).await;
    let Reply::Modal(Modal::Purchase { products }) = outcome.reply else {
        panic!("expected the purchase form, got {:?}", outcome.reply);
    };
    let codes: Vec<String> = products.iter().map(|p| p.code.to_string()).collect();
    assert_eq!(codes, ["BGL", "DL"]);
    assert_eq!(products[1].stock, 40);
}

#[tokio::test]
async fn test_insufficient_balance_is_shown_verbatim() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 50).await;

    let outcome = h.shop.handle(&order(1, "DL", "1")).await;
    assert_eq!(outcome.error, Some(ErrorKind::Validation));
    assert_eq!(
        outcome.reply.description(),
        "Insufficient balance. You need 100 WL, you have 50 WL"
    );
}

#[tokio::test]
async fn test_purchase_shows_up_in_balance_and_history() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 1_000).await;

    let balance = h.shop.handle(&press(1, ActionKind::Balance)).await;
    assert!(balance.reply.embed().unwrap().fields[0].value.contains("1,000 WL"));

    assert!(h.shop.handle(&order(1, "DL", "2")).await.is_success());

    let balance = h.shop.handle(&press(1, ActionKind::Balance)).await;
    assert!(balance.reply.embed().unwrap().fields[0].value.contains("800 WL"));

    let history = h.shop.handle(&press(1, ActionKind::History)).await;
    assert!(history.is_success());
    assert_eq!(history.reply.embed().unwrap().fields.len(), 2);
}

#[tokio::test]
async fn test_balance_view_reflects_queued_purchase() {
    let h = harness().await;
    fund(&h.backends, 1, "BIG_BUYER", 10_000).await;

    let before = h.shop.handle(&press(1, ActionKind::Balance)).await;
    assert!(before.reply.embed().unwrap().fields[0].value.contains("10,000 WL"));
    let history = h.shop.handle(&press(1, ActionKind::History)).await;
    assert_eq!(history.reply.embed().unwrap().fields.len(), 1);

    let queued = h.shop.handle(&order(1, "DL", "11")).await;
    assert_eq!(queued.reply.description(), messages::PROCESSING);
    h.backends.transactions.wait_idle().await;

    let after = h.shop.handle(&press(1, ActionKind::Balance)).await;
    assert!(after.reply.embed().unwrap().fields[0].value.contains("8,900 WL"));
    let history = h.shop.handle(&press(1, ActionKind::History)).await;
    assert_eq!(history.reply.embed().unwrap().fields.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_purchase_succeeds_when_cache_is_down() {
    let h = harness().await;
    fund(&h.backends, 1, "PLAYER_ONE", 1_000).await;
    h.backends.cache.fail_next(1_000);

    let outcome = h.shop.handle(&order(1, "DL", "1")).await;

    assert_eq!(outcome.error, None);
    assert_eq!(outcome.reply.title(), "✅ Purchase Successful");
    let buyer = GrowId::parse("PLAYER_ONE").unwrap();
    assert_eq!(
        h.backends.balance.balance_of(&buyer).await,
        Some(Balance::from_wl(900))
    );
}

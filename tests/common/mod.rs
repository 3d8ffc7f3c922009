#![allow(dead_code)]

use live_shop::application::lifecycle::LifecycleController;
use live_shop::application::reconciler::StorefrontReconciler;
use live_shop::application::shop::Shop;
use live_shop::config::ShopSettings;
use live_shop::domain::balance::{Balance, GrowId};
use live_shop::domain::interaction::{ActionKind, Interaction, UserId, fields};
use live_shop::domain::message::ChannelId;
use live_shop::infrastructure::in_memory::InMemoryShop;
use live_shop::infrastructure::platform::{InMemoryGateway, InMemoryStockDisplay};
use live_shop::infrastructure::seed::Seed;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const CHANNEL: ChannelId = ChannelId(1);

/// The whole storefront wired onto in-memory infrastructure.
pub struct Harness {
    pub backends: InMemoryShop,
    pub shop: Shop,
    pub gateway: Arc<InMemoryGateway>,
    pub display: Arc<InMemoryStockDisplay>,
    pub lifecycle: LifecycleController,
}

impl Harness {
    pub fn reconciler(&self) -> &Arc<StorefrontReconciler> {
        self.lifecycle.reconciler()
    }
}

/// Demo catalog, no accounts.
pub async fn harness() -> Harness {
    let backends = InMemoryShop::new();
    Seed::demo().apply(&backends).await.unwrap();

    let settings = Arc::new(ShopSettings::default());
    let gateway = Arc::new(InMemoryGateway::with_channel(CHANNEL));
    let display = Arc::new(InMemoryStockDisplay::new(
        gateway.clone(),
        backends.products.clone(),
        CHANNEL,
    ));
    let reconciler = StorefrontReconciler::new(
        CHANNEL,
        gateway.clone(),
        backends.admin.clone(),
        backends.cache.clone(),
        settings.clone(),
    )
    .with_stock_display(display.clone());
    let lifecycle = LifecycleController::new(Arc::new(reconciler), settings.clone());
    let shop = Shop::new(backends.backends(), settings);

    Harness {
        backends,
        shop,
        gateway,
        display,
        lifecycle,
    }
}

/// Registers `alias` for `user` with an opening balance.
pub async fn fund(backends: &InMemoryShop, user: u64, alias: &str, wl: i64) {
    backends
        .balance
        .seed_account(UserId(user), GrowId::parse(alias).unwrap(), Balance::from_wl(wl))
        .await;
}

pub fn press(user: u64, kind: ActionKind) -> Interaction {
    Interaction::new(UserId(user), kind)
}

pub fn register(user: u64, alias: &str) -> Interaction {
    press(user, ActionKind::SubmitRegistration).with_field(fields::GROWID, alias)
}

pub fn order(user: u64, code: &str, quantity: &str) -> Interaction {
    press(user, ActionKind::SubmitPurchase)
        .with_field(fields::PRODUCT_CODE, code)
        .with_field(fields::QUANTITY, quantity)
}

/// Writes an interactions CSV (`user,action,product,quantity,alias`).
pub fn interactions_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "user,action,product,quantity,alias").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

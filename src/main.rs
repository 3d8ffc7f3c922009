use clap::Parser;
use live_shop::application::lifecycle::LifecycleController;
use live_shop::application::reconciler::StorefrontReconciler;
use live_shop::application::shop::Shop;
use live_shop::config::{Cli, ShopSettings};
use live_shop::domain::message::ChannelId;
use live_shop::infrastructure::in_memory::InMemoryShop;
use live_shop::infrastructure::platform::{InMemoryGateway, InMemoryStockDisplay};
use live_shop::infrastructure::seed::Seed;
use live_shop::interfaces::csv::interaction_reader::InteractionReader;
use live_shop::interfaces::csv::reply_writer::ReplyWriter;
use live_shop::telemetry;
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_level, cli.log_format).map_err(|err| miette!("{err}"))?;

    let settings = Arc::new(ShopSettings::default());
    let backends = InMemoryShop::new();
    let seed = match &cli.catalog {
        Some(path) => Seed::from_path(path).into_diagnostic()?,
        None => Seed::demo(),
    };
    seed.apply(&backends).await.into_diagnostic()?;
    backends.admin.set_maintenance(cli.maintenance);

    // Storefront
    let channel = ChannelId(cli.channel_id);
    let gateway = Arc::new(InMemoryGateway::with_channel(channel));
    let stock_display = Arc::new(InMemoryStockDisplay::new(
        gateway.clone(),
        backends.products.clone(),
        channel,
    ));
    let reconciler = StorefrontReconciler::new(
        channel,
        gateway,
        backends.admin.clone(),
        backends.cache.clone(),
        settings.clone(),
    )
    .with_stock_display(stock_display);
    let lifecycle = LifecycleController::new(Arc::new(reconciler), settings.clone());
    if let Err(err) = lifecycle.start().await {
        warn!(error = %err, "Storefront unavailable, replaying interactions anyway");
    }

    // Replay
    let shop = Shop::new(backends.backends(), settings);
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = InteractionReader::new(file);
    let stdout = io::stdout();
    let mut writer = ReplyWriter::new(stdout.lock());
    for interaction in reader.interactions() {
        match interaction {
            Ok(interaction) => {
                let outcome = shop.handle(&interaction).await;
                writer.write(&outcome).into_diagnostic()?;
            }
            Err(e) => warn!(error = %e, "Error reading interaction, row skipped"),
        }
    }
    writer.flush().into_diagnostic()?;
    drop(writer);

    backends.transactions.wait_idle().await;
    for notification in backends.transactions.notifications().await {
        match &notification.result {
            Ok(receipt) => info!(
                user = %notification.user,
                transaction_id = %receipt.transaction_id,
                "Queued purchase completed"
            ),
            Err(failure) => warn!(
                user = %notification.user,
                error = %failure,
                "Queued purchase failed"
            ),
        }
    }

    if cli.health {
        let report = lifecycle.reconciler().check_health().await;
        let json = serde_json::to_string(&report).into_diagnostic()?;
        eprintln!("{json}");
    }

    lifecycle.stop().await;
    Ok(())
}

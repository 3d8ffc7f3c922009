//! Embed builders for every reply and storefront state.

use crate::application::messages;
use crate::domain::balance::{Balance, GrowId, group_thousands};
use crate::domain::message::{Embed, Modal, Tone};
use crate::domain::ports::Registration;
use crate::domain::product::{Product, WorldInfo};
use crate::domain::transaction::{PurchaseReceipt, TransactionRecord};
use chrono::Utc;

pub fn error(message: &str) -> Embed {
    Embed::new("❌ Error", Tone::Error)
        .description(message)
        .timestamp(Utc::now())
}

pub fn purchase_queued() -> Embed {
    Embed::new("⏳ Transaction Processing", Tone::Warning).description(messages::PROCESSING)
}

pub fn purchase_success(receipt: &PurchaseReceipt) -> Embed {
    let mut embed = Embed::new("✅ Purchase Successful", Tone::Success)
        .description(format!(
            "Bought {}x {}\nTotal: {}",
            receipt.quantity, receipt.product_name, receipt.total_price
        ))
        .timestamp(Utc::now());

    if !receipt.content.is_empty() {
        embed.push_field(
            "Product Details",
            format!("```\n{}\n```", receipt.content.join("\n")),
        );
    }
    if let Some(balance) = receipt.balance_after {
        embed.push_field("Remaining Balance", yml(&balance.format()));
    }
    embed
}

pub fn registration_success(
    growid: &GrowId,
    previous: Option<&GrowId>,
    registration: &Registration,
) -> Embed {
    let (title, default_description) = match previous {
        Some(_) => (
            "✅ GrowID Updated",
            format!("Your GrowID is now `{growid}`."),
        ),
        None => (
            "✅ GrowID Registered",
            format!("Your GrowID `{growid}` has been registered."),
        ),
    };
    let description = registration
        .message
        .clone()
        .unwrap_or(default_description);

    let mut embed = Embed::new(title, Tone::Success)
        .description(description)
        .footer("Use 💰 Balance to check your balance")
        .timestamp(Utc::now());
    if let Some(previous) = previous {
        embed.push_field("Previous GrowID", format!("`{previous}`"));
    }
    if let Some(balance) = registration.balance {
        embed.push_field("Opening Balance", yml(&balance.format()));
    }
    embed
}

/// Soft refusal for contention: locks, rate limits, busy backends.
pub fn please_wait(message: &str) -> Embed {
    Embed::new("⏳ Please Wait", Tone::Warning).description(message)
}

/// Daily spending limit and how much of it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyLimit {
    pub limit: Balance,
    pub usage: Balance,
}

pub fn balance_view(
    growid: &GrowId,
    balance: Balance,
    recent: &[TransactionRecord],
    daily: Option<DailyLimit>,
) -> Embed {
    let mut embed = Embed::new("💰 Balance Information", Tone::Info)
        .description(format!("Balance for `{growid}`"))
        .field("Current Balance", yml(&balance.format()))
        .timestamp(Utc::now());

    if !recent.is_empty() {
        let lines: Vec<String> = recent
            .iter()
            .map(|trx| {
                format!(
                    "{} {}: {} - {}",
                    trx.r#type.emoji(),
                    trx.r#type,
                    trx.amount,
                    trx.details
                )
            })
            .collect();
        embed.push_field("Recent Transactions", yml(&lines.join("\n")));
    }

    match daily {
        Some(DailyLimit { limit, usage }) => {
            embed.push_field(
                "Daily Limit",
                yml(&format!(
                    "Used: {}/{} WL",
                    group_thousands(usage.wl()),
                    group_thousands(limit.wl())
                )),
            );
            embed.footer(format!("Updated • Remaining limit: {}", limit - usage))
        }
        None => embed.footer("Updated"),
    }
}

pub fn history_view(growid: &GrowId, records: &[TransactionRecord]) -> Embed {
    let mut embed = Embed::new("📊 Transaction History", Tone::Info)
        .description(format!("Latest transactions for `{growid}`"))
        .timestamp(Utc::now());

    for (i, trx) in records.iter().enumerate() {
        embed.push_field(
            format!("{} Transaction #{}", trx.r#type.emoji(), i + 1),
            yml(&format!(
                "Date    : {}\nType    : {}\nAmount  : {}\nDetails : {}",
                trx.created_at.format("%Y-%m-%d %H:%M:%S"),
                trx.r#type,
                trx.amount,
                trx.details
            )),
        );
    }
    embed.footer(format!("Showing the last {} transactions", records.len()))
}

pub fn world_info_view(info: &WorldInfo) -> Embed {
    let details = [
        format!("{:<12}: {}", "World", info.world),
        format!("{:<12}: {}", "Owner", info.owner),
        format!("{:<12}: {}", "Bot", info.bot),
        format!(
            "{:<12}: {} {}",
            "Status",
            info.status.emoji(),
            info.status.label()
        ),
    ];

    let mut embed = Embed::new("🌎 World Information", Tone::Info)
        .field("World Details", format!("```\n{}\n```", details.join("\n")))
        .timestamp(Utc::now());

    if !info.features.is_empty() {
        embed.push_field("Features", yml(&info.features.join("\n")));
    }
    match info.updated_at {
        Some(at) => embed.footer(format!(
            "Last Updated: {}",
            at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => embed,
    }
}

/// Text shown at the top of a form.
pub fn modal_body(modal: &Modal) -> String {
    match modal {
        Modal::Registration {
            existing: Some(growid),
        } => format!("Current GrowID: {growid}"),
        Modal::Registration { existing: None } => "Enter your GrowID".to_string(),
        Modal::Purchase { products } => product_listing(products),
    }
}

/// Product listing shown at the top of the purchase form.
pub fn product_listing(products: &[Product]) -> String {
    products
        .iter()
        .map(|p| {
            format!(
                "{} ({}) - {} | Stock: {}",
                p.name, p.code, p.price, p.stock
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn maintenance_placeholder() -> Embed {
    Embed::new("🔧 Maintenance Mode", Tone::Warning)
        .description(messages::MAINTENANCE)
        .timestamp(Utc::now())
}

pub fn shutdown_notice() -> Embed {
    Embed::new("🛠️ Maintenance", Tone::Warning)
        .description(messages::MAINTENANCE)
        .timestamp(Utc::now())
}

pub fn initializing_placeholder() -> Embed {
    Embed::new("🏪 Live Stock", Tone::Warning)
        .description(messages::INITIALIZING)
        .timestamp(Utc::now())
}

fn yml(body: &str) -> String {
    format!("```yml\n{body}\n```")
}

//! Cache key layout.

use crate::domain::balance::GrowId;
use crate::domain::interaction::UserId;
use crate::domain::product::ProductCode;

pub const WORLD_INFO: &str = "world_info";
pub const STOREFRONT_MESSAGE: &str = "live_stock_message_id";
pub const AVAILABLE_PRODUCTS: &str = "available_products";

/// Everything the storefront owns, removed on shutdown.
pub const STOREFRONT_PATTERNS: [&str; 5] = [
    STOREFRONT_MESSAGE,
    WORLD_INFO,
    AVAILABLE_PRODUCTS,
    "button_*",
    "shop_*",
];

pub fn balance(growid: &GrowId) -> String {
    format!("balance_{growid}")
}

pub fn history(user: UserId) -> String {
    format!("history_{user}")
}

pub fn stock(code: &ProductCode) -> String {
    format!("stock_{code}")
}

pub fn register_limit(user: UserId) -> String {
    format!("register_limit_{user}")
}

pub fn buy_button(user: UserId) -> String {
    format!("buy_button_{user}")
}

pub fn purchase_limit(user: UserId) -> String {
    format!("purchase_limit_{user}")
}

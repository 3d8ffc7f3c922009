use crate::domain::balance::{Balance, GrowId};
use crate::domain::interaction::UserId;
use crate::domain::product::ProductCode;
use crate::error::ShopError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Purchase,
    Withdrawal,
    Transfer,
    TransferIn,
    TransferOut,
    AdminAdd,
    AdminRemove,
}

impl TransactionType {
    pub fn emoji(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "💰",
            TransactionType::Purchase => "🛒",
            TransactionType::Withdrawal => "💸",
            TransactionType::Transfer => "↔️",
            TransactionType::TransferIn => "↙️",
            TransactionType::TransferOut => "↗️",
            TransactionType::AdminAdd => "⚡",
            TransactionType::AdminRemove => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Purchase => "purchase",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::AdminAdd => "admin_add",
            TransactionType::AdminRemove => "admin_remove",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger entry as reported by the balance service. Display only.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TransactionRecord {
    pub r#type: TransactionType,
    pub amount: Balance,
    pub created_at: DateTime<Utc>,
    pub details: String,
}

/// Number of items in a single purchase, always within `1..=MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 999;

    pub fn new(value: u32) -> Result<Self, ShopError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(invalid_quantity())
        }
    }

    /// Parses the raw form field. Anything that is not a number in range is
    /// reported with the same message.
    pub fn parse(raw: &str) -> Result<Self, ShopError> {
        let value: u32 = raw.trim().parse().map_err(|_| invalid_quantity())?;
        Self::new(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

fn invalid_quantity() -> ShopError {
    ShopError::validation(format!(
        "Invalid quantity. Enter a number between {} and {}",
        Quantity::MIN,
        Quantity::MAX
    ))
}

/// How a purchase is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseRoute {
    /// Processed inline; the buyer gets the result in the reply.
    Immediate,
    /// Handed to the transaction queue; the result arrives later.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub buyer: UserId,
    pub product: ProductCode,
    pub quantity: Quantity,
}

impl PurchaseRequest {
    /// Purchases strictly above `queue_threshold` items go through the queue.
    pub fn route(&self, queue_threshold: u32) -> PurchaseRoute {
        if self.quantity.value() > queue_threshold {
            PurchaseRoute::Queued
        } else {
            PurchaseRoute::Immediate
        }
    }
}

/// Successful synchronous purchase as reported by the transaction manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub transaction_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub total_price: Balance,
    /// Delivered item payloads (codes, credentials, ...).
    #[serde(default)]
    pub content: Vec<String>,
    pub balance_after: Option<Balance>,
}

/// Job submitted to the transaction queue for large purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPurchase {
    pub r#type: TransactionType,
    pub user_id: UserId,
    pub growid: GrowId,
    pub product_code: ProductCode,
    pub quantity: u32,
    pub timestamp: DateTime<Utc>,
}

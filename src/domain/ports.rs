use super::balance::{Balance, GrowId};
use super::interaction::UserId;
use super::message::{ChannelId, Embed, MessageEdit, MessageId, ShopView};
use super::product::{Product, ProductCode, WorldInfo};
use super::response::ServiceResult;
use super::transaction::{PurchaseReceipt, QueuedPurchase, TransactionRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a successful registration or alias update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registration {
    /// Optional backend-provided confirmation text.
    pub message: Option<String>,
    /// Opening balance, when the backend reports one.
    pub balance: Option<Balance>,
}

#[async_trait]
pub trait BalanceService: Send + Sync {
    /// `Ok(None)` when the user never registered an alias.
    async fn get_growid(&self, user: UserId) -> ServiceResult<Option<GrowId>>;
    async fn register_user(&self, user: UserId, growid: &GrowId) -> ServiceResult<Registration>;
    async fn get_balance(&self, growid: &GrowId) -> ServiceResult<Balance>;
    async fn get_transaction_history(
        &self,
        growid: &GrowId,
        limit: usize,
    ) -> ServiceResult<Vec<TransactionRecord>>;
    async fn get_daily_limit(&self, growid: &GrowId) -> ServiceResult<Balance>;
    async fn get_daily_usage(&self, growid: &GrowId) -> ServiceResult<Balance>;
}

#[async_trait]
pub trait ProductService: Send + Sync {
    async fn get_all_products(&self) -> ServiceResult<Vec<Product>>;
    async fn get_stock_count(&self, code: &ProductCode) -> ServiceResult<u32>;
    async fn get_world_info(&self) -> ServiceResult<WorldInfo>;
}

#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn process_purchase(
        &self,
        buyer: UserId,
        code: &ProductCode,
        quantity: u32,
    ) -> ServiceResult<PurchaseReceipt>;
    /// Hands a purchase to the background queue. Completion is reported out-of-band.
    async fn enqueue(&self, job: QueuedPurchase) -> ServiceResult<()>;
    fn queue_len(&self) -> usize;
    async fn recover_failed_transaction(&self, transaction_id: &str) -> ServiceResult<()>;
}

#[async_trait]
pub trait AdminService: Send + Sync {
    async fn is_maintenance_mode(&self) -> ServiceResult<bool>;
    /// `Ok(true)` when the user is blacklisted.
    async fn check_blacklist(&self, user: UserId) -> ServiceResult<bool>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid cache pattern `{0}`")]
    InvalidPattern(String),
}

/// Shared key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    /// Overwrites unconditionally.
    async fn set(&self, key: &str, value: Value, expires_in: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Deletes every key matching a `*`/`?` glob. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StockDisplayError {
    #[error("stock data not available yet")]
    NotReady,
    #[error("stock display failed: {0}")]
    Failed(String),
}

/// The external component that owns the canonical stock view.
#[async_trait]
pub trait StockDisplay: Send + Sync {
    /// Resolves once the provider has loaded its stock data.
    async fn wait_ready(&self);
    async fn current_message(&self) -> Option<MessageId>;
    async fn set_current_message(&self, message: Option<MessageId>);
    async fn find_last_message(&self) -> Result<Option<MessageId>, StockDisplayError>;
    async fn create_stock_embed(&self) -> Result<Embed, StockDisplayError>;
    async fn update_stock_display(&self) -> Result<(), StockDisplayError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("channel {0} is not accessible")]
    ChannelUnavailable(ChannelId),
    #[error("platform rejected the request: {0}")]
    Rejected(String),
}

/// The chat platform's channel/message API.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn channel_accessible(&self, channel: ChannelId) -> bool;
    async fn send(
        &self,
        channel: ChannelId,
        embed: Embed,
        view: Option<ShopView>,
    ) -> Result<MessageId, GatewayError>;
    async fn edit(
        &self,
        channel: ChannelId,
        message: MessageId,
        edit: MessageEdit,
    ) -> Result<(), GatewayError>;
}

pub type BalanceServiceRef = Arc<dyn BalanceService>;
pub type ProductServiceRef = Arc<dyn ProductService>;
pub type TransactionManagerRef = Arc<dyn TransactionManager>;
pub type AdminServiceRef = Arc<dyn AdminService>;
pub type CacheStoreRef = Arc<dyn CacheStore>;
pub type StockDisplayRef = Arc<dyn StockDisplay>;
pub type MessageGatewayRef = Arc<dyn MessageGateway>;

/// Every backend a user action may call, injected at construction.
#[derive(Clone)]
pub struct Backends {
    pub balance: BalanceServiceRef,
    pub products: ProductServiceRef,
    pub transactions: TransactionManagerRef,
    pub admin: AdminServiceRef,
    pub cache: CacheStoreRef,
}

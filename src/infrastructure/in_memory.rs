//! In-process implementations of the backend services.
//!
//! They keep their state behind `tokio::sync::RwLock`s and expose a few knobs
//! (latency, injected failures, call counters) so the application layer can be
//! driven through slow and failing backends in tests and demos.

use crate::domain::balance::{Balance, GrowId};
use crate::domain::interaction::UserId;
use crate::domain::keys;
use crate::domain::ports::{
    AdminService, BalanceService, Backends, CacheStore, CacheStoreRef, ProductService,
    Registration, TransactionManager,
};
use crate::domain::product::{Product, ProductCode, WorldInfo};
use crate::domain::response::{FailureReason, ServiceFailure, ServiceResult};
use crate::domain::transaction::{
    PurchaseReceipt, QueuedPurchase, TransactionRecord, TransactionType,
};
use crate::infrastructure::cache::InMemoryCache;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

/// Artificial response delay, stored in milliseconds.
#[derive(Debug, Default)]
struct Latency(AtomicU64);

impl Latency {
    fn set(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.0.store(millis, Ordering::SeqCst);
    }

    async fn wait(&self) {
        let millis = self.0.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    aliases: HashMap<UserId, GrowId>,
    balances: HashMap<GrowId, Balance>,
    /// Oldest first.
    history: HashMap<GrowId, Vec<TransactionRecord>>,
    usage: HashMap<GrowId, Balance>,
    daily_limit: Option<Balance>,
}

impl Ledger {
    fn record(
        &mut self,
        growid: &GrowId,
        r#type: TransactionType,
        amount: Balance,
        details: String,
    ) {
        self.history
            .entry(growid.clone())
            .or_default()
            .push(TransactionRecord {
                r#type,
                amount,
                created_at: Utc::now(),
                details,
            });
    }
}

fn not_registered() -> ServiceFailure {
    ServiceFailure::new(FailureReason::NotRegistered, "GrowID not found")
}

/// Alias registry and wallet.
#[derive(Debug, Default)]
pub struct InMemoryBalanceService {
    ledger: RwLock<Ledger>,
    latency: Latency,
    busy: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryBalanceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    /// While set, registrations fail with `LockBusy`.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn set_daily_limit(&self, limit: Option<Balance>) {
        self.ledger.write().await.daily_limit = limit;
    }

    /// Binds `growid` to `user` and credits `opening` as a deposit.
    pub async fn seed_account(&self, user: UserId, growid: GrowId, opening: Balance) {
        let mut ledger = self.ledger.write().await;
        ledger.aliases.insert(user, growid.clone());
        *ledger.balances.entry(growid.clone()).or_default() += opening;
        if opening > Balance::ZERO {
            let details = "Opening deposit".to_string();
            ledger.record(&growid, TransactionType::Deposit, opening, details);
        }
    }

    pub async fn balance_of(&self, growid: &GrowId) -> Option<Balance> {
        self.ledger.read().await.balances.get(growid).copied()
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.latency.wait().await;
    }

    async fn alias_of(&self, user: UserId) -> Option<GrowId> {
        self.ledger.read().await.aliases.get(&user).cloned()
    }

    /// Takes `amount` from the wallet, honouring the daily limit.
    async fn debit(
        &self,
        growid: &GrowId,
        amount: Balance,
        details: String,
    ) -> ServiceResult<Balance> {
        let mut ledger = self.ledger.write().await;
        let current = *ledger.balances.get(growid).ok_or_else(not_registered)?;
        let used = ledger.usage.get(growid).copied().unwrap_or_default();

        if ledger.daily_limit.is_some_and(|limit| used + amount > limit) {
            return Err(ServiceFailure::new(
                FailureReason::DailyLimitExceeded,
                "Daily purchase limit exceeded",
            ));
        }
        if current < amount {
            return Err(ServiceFailure::new(
                FailureReason::InsufficientBalance,
                format!("Insufficient balance. You need {amount}, you have {current}"),
            ));
        }

        let after = current - amount;
        ledger.balances.insert(growid.clone(), after);
        ledger.usage.insert(growid.clone(), used + amount);
        ledger.record(growid, TransactionType::Purchase, amount, details);
        Ok(after)
    }

    async fn refund(&self, growid: &GrowId, amount: Balance, details: String) {
        let mut ledger = self.ledger.write().await;
        *ledger.balances.entry(growid.clone()).or_default() += amount;
        if let Some(used) = ledger.usage.get_mut(growid) {
            *used = if *used > amount { *used - amount } else { Balance::ZERO };
        }
        ledger.record(growid, TransactionType::AdminAdd, amount, details);
    }
}

#[async_trait]
impl BalanceService for InMemoryBalanceService {
    async fn get_growid(&self, user: UserId) -> ServiceResult<Option<GrowId>> {
        self.enter().await;
        Ok(self.alias_of(user).await)
    }

    async fn register_user(&self, user: UserId, growid: &GrowId) -> ServiceResult<Registration> {
        self.enter().await;
        if self.busy.load(Ordering::SeqCst) {
            return Err(ServiceFailure::new(
                FailureReason::LockBusy,
                "registration lock is held",
            ));
        }

        let mut ledger = self.ledger.write().await;
        let owner = ledger
            .aliases
            .iter()
            .find(|(_, alias)| *alias == growid)
            .map(|(owner, _)| *owner);
        if owner.is_some_and(|owner| owner != user) {
            return Err(ServiceFailure::new(
                FailureReason::AlreadyRegistered,
                format!("GrowID {growid} is already registered to another account"),
            ));
        }

        let previous = ledger.aliases.insert(user, growid.clone());
        if let Some(previous) = previous.filter(|previous| previous != growid) {
            // The wallet follows the alias.
            let carried = ledger.balances.remove(&previous).unwrap_or_default();
            ledger.balances.insert(growid.clone(), carried);
            if let Some(history) = ledger.history.remove(&previous) {
                ledger.history.insert(growid.clone(), history);
            }
            if let Some(used) = ledger.usage.remove(&previous) {
                ledger.usage.insert(growid.clone(), used);
            }
        }
        let balance = *ledger.balances.entry(growid.clone()).or_default();
        debug!(user = %user, growid = %growid, "GrowID bound");

        Ok(Registration {
            message: None,
            balance: Some(balance),
        })
    }

    async fn get_balance(&self, growid: &GrowId) -> ServiceResult<Balance> {
        self.enter().await;
        self.balance_of(growid).await.ok_or_else(not_registered)
    }

    async fn get_transaction_history(
        &self,
        growid: &GrowId,
        limit: usize,
    ) -> ServiceResult<Vec<TransactionRecord>> {
        self.enter().await;
        let ledger = self.ledger.read().await;
        Ok(ledger
            .history
            .get(growid)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_daily_limit(&self, _growid: &GrowId) -> ServiceResult<Balance> {
        self.enter().await;
        self.ledger.read().await.daily_limit.ok_or_else(|| {
            ServiceFailure::new(FailureReason::Unavailable, "daily limit not configured")
        })
    }

    async fn get_daily_usage(&self, growid: &GrowId) -> ServiceResult<Balance> {
        self.enter().await;
        let ledger = self.ledger.read().await;
        Ok(ledger.usage.get(growid).copied().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct Catalog {
    products: BTreeMap<ProductCode, Product>,
    items: HashMap<ProductCode, VecDeque<String>>,
    world: Option<WorldInfo>,
}

/// Product catalog with deliverable stock items.
#[derive(Debug, Default)]
pub struct InMemoryProductService {
    catalog: RwLock<Catalog>,
    latency: Latency,
    stock_latency: Latency,
    calls: AtomicUsize,
}

impl InMemoryProductService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    /// Delay applied to stock probes only.
    pub fn set_stock_latency(&self, latency: Duration) {
        self.stock_latency.set(latency);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn add_product(&self, product: Product, items: Vec<String>) {
        let mut catalog = self.catalog.write().await;
        catalog
            .items
            .entry(product.code.clone())
            .or_default()
            .extend(items);
        catalog.products.insert(product.code.clone(), product);
    }

    pub async fn restock(&self, code: &ProductCode, items: Vec<String>) {
        self.catalog
            .write()
            .await
            .items
            .entry(code.clone())
            .or_default()
            .extend(items);
    }

    pub async fn set_world_info(&self, info: WorldInfo) {
        self.catalog.write().await.world = Some(info);
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.latency.wait().await;
    }

    async fn product(&self, code: &ProductCode) -> ServiceResult<Product> {
        self.catalog
            .read()
            .await
            .products
            .get(code)
            .cloned()
            .ok_or_else(|| {
                ServiceFailure::new(
                    FailureReason::ProductNotFound,
                    format!("Product {code} not found"),
                )
            })
    }

    async fn take_items(&self, code: &ProductCode, quantity: u32) -> ServiceResult<Vec<String>> {
        let mut catalog = self.catalog.write().await;
        let items = catalog.items.entry(code.clone()).or_default();
        let wanted = quantity as usize;
        if items.len() < wanted {
            return Err(ServiceFailure::new(
                FailureReason::OutOfStock,
                format!("Not enough stock for {code}. Available: {}", items.len()),
            ));
        }
        Ok(items.drain(..wanted).collect())
    }

    async fn return_items(&self, code: &ProductCode, items: Vec<String>) {
        let mut catalog = self.catalog.write().await;
        let stock = catalog.items.entry(code.clone()).or_default();
        for item in items.into_iter().rev() {
            stock.push_front(item);
        }
    }
}

#[async_trait]
impl ProductService for InMemoryProductService {
    async fn get_all_products(&self) -> ServiceResult<Vec<Product>> {
        self.enter().await;
        let catalog = self.catalog.read().await;
        Ok(catalog.products.values().cloned().collect())
    }

    async fn get_stock_count(&self, code: &ProductCode) -> ServiceResult<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stock_latency.wait().await;
        let catalog = self.catalog.read().await;
        if !catalog.products.contains_key(code) {
            return Err(ServiceFailure::new(
                FailureReason::ProductNotFound,
                format!("Product {code} not found"),
            ));
        }
        let count = catalog.items.get(code).map_or(0, VecDeque::len);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn get_world_info(&self) -> ServiceResult<WorldInfo> {
        self.enter().await;
        self.catalog.read().await.world.clone().ok_or_else(|| {
            ServiceFailure::new(FailureReason::Unavailable, "world info not configured")
        })
    }
}

/// A committed purchase, kept so it can be compensated.
#[derive(Debug, Clone)]
struct Applied {
    growid: GrowId,
    code: ProductCode,
    amount: Balance,
    items: Vec<String>,
}

#[derive(Debug)]
enum Injected {
    /// Fail without touching any state.
    Before(ServiceFailure),
    /// Commit, then report an internal failure carrying the transaction id.
    AfterCommit,
}

/// Result of a queued purchase, delivered out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedOutcome {
    pub user: UserId,
    pub result: ServiceResult<PurchaseReceipt>,
}

#[derive(Debug)]
struct Processor {
    balance: Arc<InMemoryBalanceService>,
    products: Arc<InMemoryProductService>,
    next_id: AtomicU64,
    latency: Latency,
    injected: Mutex<VecDeque<Injected>>,
    applied: RwLock<HashMap<String, Applied>>,
    recovered: RwLock<Vec<String>>,
    calls: AtomicUsize,
}

impl Processor {
    async fn purchase(
        &self,
        buyer: UserId,
        code: &ProductCode,
        quantity: u32,
    ) -> ServiceResult<PurchaseReceipt> {
        let fail_after_commit = match self.injected.lock().await.pop_front() {
            Some(Injected::Before(failure)) => return Err(failure),
            Some(Injected::AfterCommit) => true,
            None => false,
        };

        let growid = self.balance.alias_of(buyer).await.ok_or_else(not_registered)?;
        let product = self.products.product(code).await?;
        let total = Balance::from_wl(product.price.wl() * i64::from(quantity));

        let items = self.products.take_items(code, quantity).await?;
        let details = format!("Bought {quantity}x {}", product.name);
        let balance_after = match self.balance.debit(&growid, total, details).await {
            Ok(after) => after,
            Err(failure) => {
                self.products.return_items(code, items).await;
                return Err(failure);
            }
        };

        let transaction_id = format!("TRX-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.applied.write().await.insert(
            transaction_id.clone(),
            Applied {
                growid,
                code: code.clone(),
                amount: total,
                items: items.clone(),
            },
        );
        info!(
            buyer = %buyer,
            product = %code,
            quantity,
            transaction_id = %transaction_id,
            "Purchase committed"
        );

        if fail_after_commit {
            return Err(
                ServiceFailure::new(FailureReason::Internal, "item delivery failed")
                    .with_transaction(transaction_id),
            );
        }

        Ok(PurchaseReceipt {
            transaction_id,
            product_name: product.name,
            quantity,
            total_price: total,
            content: items,
            balance_after: Some(balance_after),
        })
    }
}

/// Drops the cached reads a completed queued purchase has made stale.
async fn evict_derived(cache: &dyn CacheStore, job: &QueuedPurchase) {
    let stale = [
        keys::balance(&job.growid),
        keys::stock(&job.product_code),
        keys::history(job.user_id),
    ];
    for key in &stale {
        if let Err(err) = cache.delete(key).await {
            warn!(key = %key, error = %err, "Cache entry left stale after queued purchase");
        }
    }
}

/// Purchase processor with a background queue for large orders.
///
/// Queued purchases are executed one at a time by a worker task; their
/// outcomes are collected in [`InMemoryTransactionManager::notifications`].
/// The worker evicts the buyer's cached balance, history and the product's
/// stock count once a queued purchase commits.
#[derive(Debug)]
pub struct InMemoryTransactionManager {
    processor: Arc<Processor>,
    queue: mpsc::UnboundedSender<QueuedPurchase>,
    pending: Arc<AtomicUsize>,
    backlog: AtomicUsize,
    notifications: Arc<RwLock<Vec<QueuedOutcome>>>,
}

impl InMemoryTransactionManager {
    /// Spawns the queue worker, so it must be called within a Tokio runtime.
    pub fn new(
        balance: Arc<InMemoryBalanceService>,
        products: Arc<InMemoryProductService>,
        cache: CacheStoreRef,
    ) -> Self {
        let processor = Arc::new(Processor {
            balance,
            products,
            next_id: AtomicU64::new(0),
            latency: Latency::default(),
            injected: Mutex::new(VecDeque::new()),
            applied: RwLock::new(HashMap::new()),
            recovered: RwLock::new(Vec::new()),
            calls: AtomicUsize::new(0),
        });
        let pending = Arc::new(AtomicUsize::new(0));
        let notifications = Arc::new(RwLock::new(Vec::new()));
        let (queue, mut jobs) = mpsc::unbounded_channel::<QueuedPurchase>();

        let worker = Arc::clone(&processor);
        let worker_pending = Arc::clone(&pending);
        let worker_notifications = Arc::clone(&notifications);
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                let result = worker
                    .purchase(job.user_id, &job.product_code, job.quantity)
                    .await;
                match &result {
                    Ok(receipt) => {
                        evict_derived(cache.as_ref(), &job).await;
                        info!(
                            user = %job.user_id,
                            transaction_id = %receipt.transaction_id,
                            "Queued purchase completed"
                        );
                    }
                    Err(failure) => {
                        warn!(user = %job.user_id, error = %failure, "Queued purchase failed")
                    }
                }
                worker_notifications.write().await.push(QueuedOutcome {
                    user: job.user_id,
                    result,
                });
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
        });

        Self {
            processor,
            queue,
            pending,
            backlog: AtomicUsize::new(0),
            notifications,
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        self.processor.latency.set(latency);
    }

    /// Pretends `jobs` unrelated purchases are waiting in the queue.
    pub fn set_backlog(&self, jobs: usize) {
        self.backlog.store(jobs, Ordering::SeqCst);
    }

    /// Makes the next purchase fail with `failure` and no side effects.
    pub async fn fail_next(&self, failure: ServiceFailure) {
        self.processor
            .injected
            .lock()
            .await
            .push_back(Injected::Before(failure));
    }

    /// Makes the next purchase commit and then report an internal failure.
    pub async fn fail_next_after_commit(&self) {
        self.processor
            .injected
            .lock()
            .await
            .push_back(Injected::AfterCommit);
    }

    pub fn calls(&self) -> usize {
        self.processor.calls.load(Ordering::SeqCst)
    }

    pub async fn notifications(&self) -> Vec<QueuedOutcome> {
        self.notifications.read().await.clone()
    }

    /// Transaction ids that went through compensation.
    pub async fn recovered(&self) -> Vec<String> {
        self.processor.recovered.read().await.clone()
    }

    /// Waits until every queued purchase has been processed.
    pub async fn wait_idle(&self) {
        while self.pending.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn process_purchase(
        &self,
        buyer: UserId,
        code: &ProductCode,
        quantity: u32,
    ) -> ServiceResult<PurchaseReceipt> {
        self.processor.calls.fetch_add(1, Ordering::SeqCst);
        self.processor.latency.wait().await;
        self.processor.purchase(buyer, code, quantity).await
    }

    async fn enqueue(&self, job: QueuedPurchase) -> ServiceResult<()> {
        self.processor.calls.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.queue.send(job).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            ServiceFailure::new(FailureReason::Unavailable, "transaction queue is closed")
        })
    }

    fn queue_len(&self) -> usize {
        self.pending.load(Ordering::SeqCst) + self.backlog.load(Ordering::SeqCst)
    }

    async fn recover_failed_transaction(&self, transaction_id: &str) -> ServiceResult<()> {
        self.processor.calls.fetch_add(1, Ordering::SeqCst);
        let applied = self.processor.applied.write().await.remove(transaction_id);
        let Some(applied) = applied else {
            return Err(ServiceFailure::new(
                FailureReason::InvalidInput,
                format!("Unknown transaction {transaction_id}"),
            ));
        };

        self.processor
            .balance
            .refund(
                &applied.growid,
                applied.amount,
                format!("Refund for {transaction_id}"),
            )
            .await;
        self.processor
            .products
            .return_items(&applied.code, applied.items)
            .await;
        self.processor
            .recovered
            .write()
            .await
            .push(transaction_id.to_string());
        info!(transaction_id, "Transaction compensated");
        Ok(())
    }
}

/// Maintenance switch and blacklist.
#[derive(Debug, Default)]
pub struct InMemoryAdminService {
    maintenance: AtomicBool,
    blacklist: std::sync::RwLock<HashSet<UserId>>,
    latency: Latency,
    calls: AtomicUsize,
}

impl InMemoryAdminService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_maintenance(&self, enabled: bool) {
        self.maintenance.store(enabled, Ordering::SeqCst);
    }

    pub fn blacklist(&self, user: UserId) {
        self.blacklist
            .write()
            .unwrap_or_else(|poisoned| {
                warn!(operation = "blacklist", "Blacklist lock poisoned, recovering");
                poisoned.into_inner()
            })
            .insert(user);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency.set(latency);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminService for InMemoryAdminService {
    async fn is_maintenance_mode(&self) -> ServiceResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.latency.wait().await;
        Ok(self.maintenance.load(Ordering::SeqCst))
    }

    async fn check_blacklist(&self, user: UserId) -> ServiceResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.latency.wait().await;
        Ok(self
            .blacklist
            .read()
            .unwrap_or_else(|poisoned| {
                warn!(operation = "check_blacklist", "Blacklist lock poisoned, recovering");
                poisoned.into_inner()
            })
            .contains(&user))
    }
}

/// Every in-memory backend, wired together.
#[derive(Debug, Clone)]
pub struct InMemoryShop {
    pub balance: Arc<InMemoryBalanceService>,
    pub products: Arc<InMemoryProductService>,
    pub transactions: Arc<InMemoryTransactionManager>,
    pub admin: Arc<InMemoryAdminService>,
    pub cache: Arc<InMemoryCache>,
}

impl InMemoryShop {
    /// Must be called within a Tokio runtime.
    pub fn new() -> Self {
        let balance = Arc::new(InMemoryBalanceService::new());
        let products = Arc::new(InMemoryProductService::new());
        let cache = Arc::new(InMemoryCache::new());
        let transactions = Arc::new(InMemoryTransactionManager::new(
            Arc::clone(&balance),
            Arc::clone(&products),
            cache.clone(),
        ));
        Self {
            balance,
            products,
            transactions,
            admin: Arc::new(InMemoryAdminService::new()),
            cache,
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            balance: self.balance.clone(),
            products: self.products.clone(),
            transactions: self.transactions.clone(),
            admin: self.admin.clone(),
            cache: self.cache.clone(),
        }
    }

    /// Calls made to the balance, product and transaction services.
    pub fn data_calls(&self) -> usize {
        self.balance.calls() + self.products.calls() + self.transactions.calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(raw: &str) -> GrowId {
        GrowId::parse(raw).unwrap()
    }

    fn code(raw: &str) -> ProductCode {
        ProductCode::parse(raw).unwrap()
    }

    async fn stocked_shop() -> InMemoryShop {
        let shop = InMemoryShop::new();
        shop.products
            .add_product(
                Product {
                    code: code("DL"),
                    name: "Diamond Lock".to_string(),
                    price: Balance::from_wl(100),
                    description: String::new(),
                    stock: 0,
                },
                vec!["A".to_string(), "B".to_string(), "C".to_string()],
            )
            .await;
        shop.balance
            .seed_account(UserId(1), alias("PLAYER_ONE"), Balance::from_wl(250))
            .await;
        shop
    }

    #[tokio::test]
    async fn test_purchase_debits_and_delivers() {
        let shop = stocked_shop().await;
        let receipt = shop
            .transactions
            .process_purchase(UserId(1), &code("DL"), 2)
            .await
            .unwrap();

        assert_eq!(receipt.content, vec!["A", "B"]);
        assert_eq!(receipt.total_price, Balance::from_wl(200));
        assert_eq!(receipt.balance_after, Some(Balance::from_wl(50)));
        assert_eq!(shop.products.get_stock_count(&code("DL")).await, Ok(1));
    }

    #[tokio::test]
    async fn test_insufficient_balance_returns_stock() {
        let shop = stocked_shop().await;
        let failure = shop
            .transactions
            .process_purchase(UserId(1), &code("DL"), 3)
            .await
            .unwrap_err();

        assert_eq!(failure.reason, FailureReason::InsufficientBalance);
        assert_eq!(shop.products.get_stock_count(&code("DL")).await, Ok(3));
    }

    #[tokio::test]
    async fn test_daily_limit_enforced() {
        let shop = stocked_shop().await;
        shop.balance.set_daily_limit(Some(Balance::from_wl(150))).await;
        let failure = shop
            .transactions
            .process_purchase(UserId(1), &code("DL"), 2)
            .await
            .unwrap_err();
        assert_eq!(failure.reason, FailureReason::DailyLimitExceeded);
    }

    #[tokio::test]
    async fn test_recover_reverts_committed_purchase() {
        let shop = stocked_shop().await;
        shop.transactions.fail_next_after_commit().await;
        let failure = shop
            .transactions
            .process_purchase(UserId(1), &code("DL"), 1)
            .await
            .unwrap_err();
        let transaction_id = failure.transaction_id.unwrap();
        assert_eq!(
            shop.balance.balance_of(&alias("PLAYER_ONE")).await,
            Some(Balance::from_wl(150))
        );

        shop.transactions
            .recover_failed_transaction(&transaction_id)
            .await
            .unwrap();

        assert_eq!(
            shop.balance.balance_of(&alias("PLAYER_ONE")).await,
            Some(Balance::from_wl(250))
        );
        assert_eq!(shop.products.get_stock_count(&code("DL")).await, Ok(3));
        assert_eq!(shop.transactions.recovered().await, vec![transaction_id]);
    }

    #[tokio::test]
    async fn test_alias_update_carries_wallet() {
        let shop = stocked_shop().await;
        let registration = shop
            .balance
            .register_user(UserId(1), &alias("NEW_NAME"))
            .await
            .unwrap();

        assert_eq!(registration.balance, Some(Balance::from_wl(250)));
        assert_eq!(shop.balance.balance_of(&alias("PLAYER_ONE")).await, None);
        assert_eq!(
            shop.balance.get_growid(UserId(1)).await,
            Ok(Some(alias("NEW_NAME")))
        );
    }

    #[tokio::test]
    async fn test_alias_owned_by_someone_else() {
        let shop = stocked_shop().await;
        let failure = shop
            .balance
            .register_user(UserId(2), &alias("PLAYER_ONE"))
            .await
            .unwrap_err();
        assert_eq!(failure.reason, FailureReason::AlreadyRegistered);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let shop = stocked_shop().await;
        for _ in 0..2 {
            shop.transactions
                .process_purchase(UserId(1), &code("DL"), 1)
                .await
                .unwrap();
        }
        let history = shop
            .balance
            .get_transaction_history(&alias("PLAYER_ONE"), 2)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.r#type == TransactionType::Purchase));
    }

    #[tokio::test]
    async fn test_queued_purchase_reports_out_of_band() {
        let shop = stocked_shop().await;
        shop.transactions
            .enqueue(QueuedPurchase {
                r#type: TransactionType::Purchase,
                user_id: UserId(1),
                growid: alias("PLAYER_ONE"),
                product_code: code("DL"),
                quantity: 1,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        shop.transactions.wait_idle().await;

        let notifications = shop.transactions.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].result.is_ok());
        assert_eq!(shop.transactions.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_queued_purchase_evicts_cached_reads() {
        let shop = stocked_shop().await;
        let ttl = Duration::from_secs(30);
        for key in ["balance_PLAYER_ONE", "history_1", "stock_DL", "world_info"] {
            shop.cache.set(key, serde_json::Value::Bool(true), ttl).await.unwrap();
        }

        shop.transactions
            .enqueue(QueuedPurchase {
                r#type: TransactionType::Purchase,
                user_id: UserId(1),
                growid: alias("PLAYER_ONE"),
                product_code: code("DL"),
                quantity: 2,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        shop.transactions.wait_idle().await;

        assert_eq!(shop.cache.get("balance_PLAYER_ONE").await.unwrap(), None);
        assert_eq!(shop.cache.get("history_1").await.unwrap(), None);
        assert_eq!(shop.cache.get("stock_DL").await.unwrap(), None);
        assert!(shop.cache.get("world_info").await.unwrap().is_some());
    }
}

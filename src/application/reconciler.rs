//! Keeps the single storefront message alive and in sync.
//!
//! ```text
//!  Uninitialized --initialize--> Initializing --ok--> Ready
//!        ^                                              |
//!        +------------------- cleanup ------------------+
//!                         Ready --refresh--> Initializing
//! ```
//!
//! `get_or_create_message` and `force_update` share one async mutex, so at
//! most one of them touches the message handle at a time.

use crate::application::render;
use crate::config::ShopSettings;
use crate::domain::keys;
use crate::domain::message::{ChannelId, Embed, MessageEdit, MessageId, ShopView};
use crate::domain::ports::{
    AdminServiceRef, CacheStoreRef, GatewayError, MessageGatewayRef, StockDisplayError,
    StockDisplayRef,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("initialization failed after {attempts} attempts: {last}")]
    InitializationFailed { attempts: usize, last: String },
    #[error("no stock display attached")]
    NoStockDisplay,
    #[error("stock display not ready within {0:?}")]
    StockDisplayNotReady(Duration),
    #[error("channel {0} is not accessible")]
    ChannelUnavailable(ChannelId),
    #[error("storefront message {0} no longer exists")]
    MessageNotFound(MessageId),
    #[error("{operation} timed out")]
    TimedOut { operation: &'static str },
    #[error("maintenance flag unavailable: {0}")]
    MaintenanceUnknown(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    StockDisplay(#[from] StockDisplayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ready: bool,
    pub has_message: bool,
    pub has_stock_display: bool,
    pub channel_accessible: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Default)]
struct ReconcilerState {
    phase: Phase,
    message: Option<MessageId>,
    stock_display: Option<StockDisplayRef>,
}

pub struct StorefrontReconciler {
    channel: ChannelId,
    gateway: MessageGatewayRef,
    admin: AdminServiceRef,
    cache: CacheStoreRef,
    settings: Arc<ShopSettings>,
    state: Mutex<ReconcilerState>,
}

impl StorefrontReconciler {
    pub fn new(
        channel: ChannelId,
        gateway: MessageGatewayRef,
        admin: AdminServiceRef,
        cache: CacheStoreRef,
        settings: Arc<ShopSettings>,
    ) -> Self {
        Self {
            channel,
            gateway,
            admin,
            cache,
            settings,
            state: Mutex::new(ReconcilerState::default()),
        }
    }

    /// Attaches a stock display without touching the message.
    pub fn with_stock_display(self, stock_display: StockDisplayRef) -> Self {
        let state = ReconcilerState {
            stock_display: Some(stock_display),
            ..ReconcilerState::default()
        };
        Self {
            state: Mutex::new(state),
            ..self
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    pub async fn current_message(&self) -> Option<MessageId> {
        self.state.lock().await.message
    }

    /// Waits for the stock display and the channel, retrying on failure.
    pub async fn initialize(&self) -> Result<(), ReconcileError> {
        {
            let mut state = self.state.lock().await;
            if state.phase == Phase::Ready {
                return Ok(());
            }
            state.phase = Phase::Initializing;
        }

        let settings = &self.settings.reconciler;
        let attempts = settings.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match timeout(settings.attempt_timeout, self.setup_dependencies()).await {
                Ok(Ok(())) => {
                    self.state.lock().await.phase = Phase::Ready;
                    info!(attempt, channel = %self.channel, "Storefront initialized");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    warn!(attempt, error = %err, "Storefront initialization attempt failed");
                    last = err.to_string();
                }
                Err(_) => {
                    warn!(attempt, "Storefront initialization attempt timed out");
                    last = "attempt timed out".to_string();
                }
            }
            if attempt < attempts {
                sleep(settings.retry_delay).await;
            }
        }

        self.state.lock().await.phase = Phase::Uninitialized;
        error!(attempts, last = %last, "Storefront initialization failed");
        Err(ReconcileError::InitializationFailed { attempts, last })
    }

    async fn setup_dependencies(&self) -> Result<(), ReconcileError> {
        let stock_display = self
            .state
            .lock()
            .await
            .stock_display
            .clone()
            .ok_or(ReconcileError::NoStockDisplay)?;

        let ready_budget = self.settings.reconciler.provider_ready_timeout;
        timeout(ready_budget, stock_display.wait_ready())
            .await
            .map_err(|_| ReconcileError::StockDisplayNotReady(ready_budget))?;

        if !self.gateway.channel_accessible(self.channel).await {
            return Err(ReconcileError::ChannelUnavailable(self.channel));
        }
        Ok(())
    }

    /// Returns the storefront message, reusing or recovering an existing one
    /// before creating a new one.
    pub async fn get_or_create_message(&self) -> Result<MessageId, ReconcileError> {
        let mut state = self.state.lock().await;
        self.get_or_create_locked(&mut state).await
    }

    async fn get_or_create_locked(
        &self,
        state: &mut ReconcilerState,
    ) -> Result<MessageId, ReconcileError> {
        let stock_display = state.stock_display.clone();

        let known = match &stock_display {
            Some(display) => display.current_message().await.or(state.message),
            None => state.message,
        };
        if let Some(message) = known {
            match self
                .gateway
                .edit(self.channel, message, MessageEdit::view(ShopView::new()))
                .await
            {
                Ok(()) => {
                    self.remember(state, Some(message)).await;
                    return Ok(message);
                }
                Err(GatewayError::NotFound(_)) => {
                    debug!(message = %message, "Known storefront message is gone");
                    self.remember(state, None).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(display) = &stock_display
            && let Some(message) = self.recover_last_message(display).await
        {
            self.remember(state, Some(message)).await;
            return Ok(message);
        }

        let embed = self.storefront_embed(stock_display.as_ref()).await;
        let message = self
            .gateway
            .send(self.channel, embed, Some(ShopView::new()))
            .await?;
        self.remember(state, Some(message)).await;
        info!(message = %message, channel = %self.channel, "Storefront message created");
        Ok(message)
    }

    /// Finds the display's last message and re-attaches content and view.
    async fn recover_last_message(&self, display: &StockDisplayRef) -> Option<MessageId> {
        let budget = self.settings.reconciler.find_message_timeout;
        let message = match timeout(budget, display.find_last_message()).await {
            Ok(Ok(Some(message))) => message,
            Ok(Ok(None)) => return None,
            Ok(Err(err)) => {
                warn!(error = %err, "Looking up the last storefront message failed");
                return None;
            }
            Err(_) => {
                warn!("Looking up the last storefront message timed out");
                return None;
            }
        };

        let embed = self.storefront_embed(Some(display)).await;
        let edit = MessageEdit::content_and_view(embed, ShopView::new());
        match self.gateway.edit(self.channel, message, edit).await {
            Ok(()) => {
                info!(message = %message, "Storefront message recovered");
                Some(message)
            }
            Err(err) => {
                debug!(message = %message, error = %err, "Recovered message unusable");
                None
            }
        }
    }

    async fn storefront_embed(&self, display: Option<&StockDisplayRef>) -> Embed {
        let Some(display) = display else {
            return render::initializing_placeholder();
        };
        match display.create_stock_embed().await {
            Ok(embed) => embed,
            Err(err) => {
                debug!(error = %err, "Stock data unavailable, using placeholder");
                render::initializing_placeholder()
            }
        }
    }

    /// Keeps the reconciler's and the stock display's handle in step.
    async fn remember(&self, state: &mut ReconcilerState, message: Option<MessageId>) {
        state.message = message;
        if let Some(display) = &state.stock_display {
            display.set_current_message(message).await;
        }
        match message {
            Some(message) => {
                let ttl = self.settings.reconciler.message_cache_ttl;
                let value = Value::from(message.0);
                if let Err(err) = self.cache.set(keys::STOREFRONT_MESSAGE, value, ttl).await {
                    debug!(error = %err, "Storefront message id not cached");
                }
            }
            None => {
                if let Err(err) = self.cache.delete(keys::STOREFRONT_MESSAGE).await {
                    debug!(error = %err, "Storefront message id not evicted");
                }
            }
        }
    }

    /// Brings the storefront message in line with the current shop state.
    pub async fn force_update(&self) -> Result<(), ReconcileError> {
        let budget = self.settings.reconciler.force_update_timeout;
        timeout(budget, self.force_update_inner())
            .await
            .map_err(|_| ReconcileError::TimedOut {
                operation: "force_update",
            })?
    }

    async fn force_update_inner(&self) -> Result<(), ReconcileError> {
        let mut state = self.state.lock().await;
        let message = self.get_or_create_locked(&mut state).await?;

        if self.in_maintenance().await? {
            let edit = MessageEdit::placeholder(render::maintenance_placeholder());
            self.apply(&mut state, message, edit).await?;
            info!(message = %message, "Storefront switched to maintenance");
            return Ok(());
        }

        if let Some(display) = &state.stock_display
            && let Err(err) = display.update_stock_display().await
        {
            warn!(error = %err, "Stock display refresh failed");
        }
        self.apply(&mut state, message, MessageEdit::view(ShopView::new()))
            .await?;
        debug!(message = %message, "Storefront updated");
        Ok(())
    }

    /// Edits the message; "not found" forgets the handle.
    async fn apply(
        &self,
        state: &mut ReconcilerState,
        message: MessageId,
        edit: MessageEdit,
    ) -> Result<(), ReconcileError> {
        match self.gateway.edit(self.channel, message, edit).await {
            Ok(()) => Ok(()),
            Err(GatewayError::NotFound(_)) => {
                self.remember(state, None).await;
                Err(ReconcileError::MessageNotFound(message))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// An unknown flag fails the update; the message is left as it was.
    async fn in_maintenance(&self) -> Result<bool, ReconcileError> {
        let budget = self.settings.timeouts.read;
        match timeout(budget, self.admin.is_maintenance_mode()).await {
            Ok(Ok(enabled)) => Ok(enabled),
            Ok(Err(failure)) => {
                warn!(error = %failure, "Maintenance flag unavailable");
                Err(ReconcileError::MaintenanceUnknown(failure.to_string()))
            }
            Err(_) => {
                warn!("Maintenance flag lookup timed out");
                Err(ReconcileError::TimedOut {
                    operation: "maintenance check",
                })
            }
        }
    }

    /// Re-checks the dependencies, then re-renders the message with a fresh view.
    pub async fn refresh_components(&self) -> Result<(), ReconcileError> {
        self.state.lock().await.phase = Phase::Initializing;
        self.initialize().await?;
        let result = self.force_update().await;
        self.state.lock().await.phase = match result {
            Ok(()) => Phase::Ready,
            Err(_) => Phase::Uninitialized,
        };
        result
    }

    /// Swaps in a new stock display and republishes through it.
    pub async fn set_stock_display(
        &self,
        stock_display: StockDisplayRef,
    ) -> Result<(), ReconcileError> {
        {
            let mut state = self.state.lock().await;
            stock_display.set_current_message(state.message).await;
            state.stock_display = Some(stock_display);
        }
        self.force_update().await?;
        self.state.lock().await.phase = Phase::Ready;
        info!("Stock display attached");
        Ok(())
    }

    /// Best-effort teardown. Every step runs even if an earlier one failed.
    pub async fn cleanup(&self) {
        let mut state = self.state.lock().await;

        if let Some(message) = state.message {
            let edit = MessageEdit::placeholder(render::shutdown_notice());
            if let Err(err) = self.gateway.edit(self.channel, message, edit).await {
                warn!(message = %message, error = %err, "Shutdown notice not posted");
            }
        }

        for pattern in keys::STOREFRONT_PATTERNS {
            if let Err(err) = self.cache.delete_pattern(pattern).await {
                warn!(pattern, error = %err, "Cache cleanup failed");
            }
        }

        if let Some(display) = &state.stock_display {
            display.set_current_message(None).await;
        }
        *state = ReconcilerState::default();
        info!("Storefront cleaned up");
    }

    pub async fn check_health(&self) -> HealthReport {
        let (ready, has_message, has_stock_display) = {
            let state = self.state.lock().await;
            (
                state.phase == Phase::Ready,
                state.message.is_some(),
                state.stock_display.is_some(),
            )
        };
        let channel_accessible = self.gateway.channel_accessible(self.channel).await;

        let status = if ready && has_message && has_stock_display && channel_accessible {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            ready,
            has_message,
            has_stock_display,
            channel_accessible,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::messages;
    use crate::domain::ports::{CacheStore, MessageGateway, StockDisplay};
    use crate::infrastructure::in_memory::InMemoryShop;
    use crate::infrastructure::platform::{InMemoryGateway, InMemoryStockDisplay, STOCK_TITLE};

    const CHANNEL: ChannelId = ChannelId(42);

    struct Harness {
        backends: InMemoryShop,
        gateway: Arc<InMemoryGateway>,
        display: Arc<InMemoryStockDisplay>,
        reconciler: StorefrontReconciler,
    }

    fn harness_with(
        display: InMemoryStockDisplay,
        gateway: Arc<InMemoryGateway>,
        backends: InMemoryShop,
    ) -> Harness {
        let display = Arc::new(display);
        let reconciler = StorefrontReconciler::new(
            CHANNEL,
            gateway.clone(),
            backends.admin.clone(),
            backends.cache.clone(),
            Arc::new(ShopSettings::default()),
        )
        .with_stock_display(display.clone());
        Harness {
            backends,
            gateway,
            display,
            reconciler,
        }
    }

    fn harness() -> Harness {
        let backends = InMemoryShop::new();
        let gateway = Arc::new(InMemoryGateway::with_channel(CHANNEL));
        let display =
            InMemoryStockDisplay::new(gateway.clone(), backends.products.clone(), CHANNEL);
        harness_with(display, gateway, backends)
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let h = harness();
        h.reconciler.initialize().await.unwrap();
        assert_eq!(h.reconciler.phase().await, Phase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_gives_up_after_three_attempts() {
        let backends = InMemoryShop::new();
        let gateway = Arc::new(InMemoryGateway::with_channel(CHANNEL));
        let display =
            InMemoryStockDisplay::pending(gateway.clone(), backends.products.clone(), CHANNEL);
        let h = harness_with(display, gateway, backends);

        let started = tokio::time::Instant::now();
        let err = h.reconciler.initialize().await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::InitializationFailed { attempts: 3, .. }
        ));
        // Three 10s readiness waits and two 5s pauses.
        assert_eq!(started.elapsed(), Duration::from_secs(40));
        assert_eq!(h.reconciler.phase().await, Phase::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialize_fails_on_missing_channel() {
        let backends = InMemoryShop::new();
        let gateway = Arc::new(InMemoryGateway::with_channel(ChannelId(1)));
        let display =
            InMemoryStockDisplay::new(gateway.clone(), backends.products.clone(), CHANNEL);
        let mut settings = ShopSettings::default();
        settings.reconciler.retry_delay = Duration::ZERO;
        let reconciler = StorefrontReconciler::new(
            CHANNEL,
            gateway,
            backends.admin.clone(),
            backends.cache.clone(),
            Arc::new(settings),
        )
        .with_stock_display(Arc::new(display));

        let err = reconciler.initialize().await.unwrap_err();
        assert!(err.to_string().contains("channel 42 is not accessible"));
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let h = harness();
        let first = h.reconciler.get_or_create_message().await.unwrap();
        let second = h.reconciler.get_or_create_message().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.gateway.sends(), 1);
        assert_eq!(h.display.current_message().await, Some(first));
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_sends_once() {
        let h = harness();
        let (a, b) = tokio::join!(
            h.reconciler.get_or_create_message(),
            h.reconciler.get_or_create_message()
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(h.gateway.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_recovers_last_message_after_restart() {
        let h = harness();
        let existing = h
            .gateway
            .send(CHANNEL, render::shutdown_notice(), None)
            .await
            .unwrap();

        let message = h.reconciler.get_or_create_message().await.unwrap();

        assert_eq!(message, existing);
        let stored = h.gateway.message(existing).await.unwrap();
        assert_eq!(stored.embed.title, STOCK_TITLE);
        assert!(stored.view.is_some());
    }

    #[tokio::test]
    async fn test_deleted_message_is_replaced() {
        let h = harness();
        let first = h.reconciler.get_or_create_message().await.unwrap();
        h.gateway.remove_message(first).await;

        let second = h.reconciler.get_or_create_message().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(h.display.current_message().await, Some(second));
    }

    #[tokio::test]
    async fn test_placeholder_when_stock_unavailable() {
        let h = harness();
        h.display.set_failing(true);
        let message = h.reconciler.get_or_create_message().await.unwrap();
        let stored = h.gateway.message(message).await.unwrap();
        assert_eq!(stored.embed.description.as_deref(), Some(messages::INITIALIZING));
    }

    #[tokio::test]
    async fn test_maintenance_detaches_view() {
        let h = harness();
        h.reconciler.force_update().await.unwrap();
        let message = h.reconciler.current_message().await.unwrap();
        assert!(h.gateway.message(message).await.unwrap().view.is_some());

        h.backends.admin.set_maintenance(true);
        h.reconciler.force_update().await.unwrap();

        let stored = h.gateway.message(message).await.unwrap();
        assert!(stored.view.is_none());
        assert_eq!(stored.embed.title, "🔧 Maintenance Mode");
    }

    #[tokio::test]
    async fn test_force_update_refreshes_stock_display() {
        let h = harness();
        h.reconciler.force_update().await.unwrap();
        assert_eq!(h.display.updates(), 1);
    }

    #[tokio::test]
    async fn test_message_not_found_clears_handle() {
        let h = harness();
        h.reconciler.force_update().await.unwrap();
        let message = h.reconciler.current_message().await.unwrap();

        // Deleted between the handle check and the final edit.
        let mut state = h.reconciler.state.lock().await;
        h.gateway.remove_message(message).await;
        let err = h
            .reconciler
            .apply(&mut state, message, MessageEdit::view(ShopView::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MessageNotFound(id) if id == message));
        assert_eq!(state.message, None);
    }

    #[tokio::test]
    async fn test_cleanup_resets_everything() {
        let h = harness();
        h.reconciler.initialize().await.unwrap();
        h.reconciler.force_update().await.unwrap();
        let message = h.reconciler.current_message().await.unwrap();
        h.backends
            .cache
            .set("button_register_1", Value::Bool(true), Duration::from_secs(60))
            .await
            .unwrap();

        h.reconciler.cleanup().await;

        assert_eq!(h.reconciler.phase().await, Phase::Uninitialized);
        assert_eq!(h.reconciler.current_message().await, None);
        assert_eq!(h.display.current_message().await, None);
        assert!(h.backends.cache.is_empty().await);
        let stored = h.gateway.message(message).await.unwrap();
        assert!(stored.view.is_none());
        assert_eq!(stored.embed.title, "🛠️ Maintenance");
    }

    #[tokio::test]
    async fn test_cleanup_survives_failing_steps() {
        let h = harness();
        h.reconciler.force_update().await.unwrap();
        h.gateway.set_reject_edits(true);
        h.backends.cache.fail_next(10);

        h.reconciler.cleanup().await;
        assert_eq!(h.reconciler.current_message().await, None);
    }

    #[tokio::test]
    async fn test_health_reports() {
        let h = harness();
        let before = h.reconciler.check_health().await;
        assert_eq!(before.status, HealthStatus::Degraded);
        assert!(before.channel_accessible);
        assert!(before.has_stock_display);

        h.reconciler.initialize().await.unwrap();
        h.reconciler.force_update().await.unwrap();
        let after = h.reconciler.check_health().await;
        assert_eq!(after.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_set_stock_display_marks_ready() {
        let backends = InMemoryShop::new();
        let gateway = Arc::new(InMemoryGateway::with_channel(CHANNEL));
        let reconciler = StorefrontReconciler::new(
            CHANNEL,
            gateway.clone(),
            backends.admin.clone(),
            backends.cache.clone(),
            Arc::new(ShopSettings::default()),
        );
        assert!(!reconciler.check_health().await.has_stock_display);

        let display = Arc::new(InMemoryStockDisplay::new(
            gateway.clone(),
            backends.products.clone(),
            CHANNEL,
        ));
        reconciler.set_stock_display(display.clone()).await.unwrap();

        assert_eq!(reconciler.phase().await, Phase::Ready);
        assert_eq!(display.current_message().await, reconciler.current_message().await);
        assert_eq!(display.updates(), 1);
    }

    #[tokio::test]
    async fn test_refresh_components_returns_to_ready() {
        let h = harness();
        h.reconciler.initialize().await.unwrap();
        h.reconciler.refresh_components().await.unwrap();
        assert_eq!(h.reconciler.phase().await, Phase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_components_waits_for_stock_display() {
        let h = harness();
        h.reconciler.initialize().await.unwrap();
        h.reconciler.force_update().await.unwrap();
        let pending = Arc::new(InMemoryStockDisplay::pending(
            h.gateway.clone(),
            h.backends.products.clone(),
            CHANNEL,
        ));
        h.reconciler.set_stock_display(pending).await.unwrap();
        assert_eq!(h.reconciler.phase().await, Phase::Ready);

        let err = h.reconciler.refresh_components().await.unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::InitializationFailed { attempts: 3, .. }
        ));
        assert_eq!(h.reconciler.phase().await, Phase::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_update_fails_when_maintenance_flag_is_unknown() {
        let h = harness();
        h.reconciler.force_update().await.unwrap();
        let message = h.reconciler.current_message().await.unwrap();
        h.backends.admin.set_maintenance(true);
        h.backends.admin.set_latency(Duration::from_secs(15));

        let err = h.reconciler.force_update().await.unwrap_err();

        assert!(matches!(err, ReconcileError::TimedOut { operation: "maintenance check" }));
        let stored = h.gateway.message(message).await.unwrap();
        assert!(stored.view.is_some());
        assert_eq!(stored.embed.title, STOCK_TITLE);
    }
}

//! The skeleton every user action runs through.
//!
//! ```text
//! acquire lock -> maintenance -> blacklist -> rate limit -> handler -> reply
//!      |                                                        |
//!      +------------------ release lock (always) <--------------+
//! ```
//!
//! Handlers only describe their happy path and return a [`ShopError`] for
//! everything else; [`ActionPipeline::run`] turns that into exactly one reply.

use crate::application::lock::{LockKey, ResponseLock};
use crate::application::retry::retry_with_backoff;
use crate::application::{messages, render};
use crate::config::ShopSettings;
use crate::domain::balance::GrowId;
use crate::domain::interaction::{ActionKind, Interaction, UserId};
use crate::domain::message::Reply;
use crate::domain::ports::Backends;
use crate::domain::response::{FailureReason, ServiceFailure, ServiceResult};
use crate::error::{ErrorKind, Result, ShopError};
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Checks run, in this order, before a handler body.
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub maintenance: bool,
    pub blacklist: bool,
    /// Cache key whose presence means the user is still cooling down.
    pub rate_limit: Option<String>,
}

impl Preconditions {
    /// Maintenance only.
    pub fn maintenance() -> Self {
        Self {
            maintenance: true,
            ..Self::default()
        }
    }

    /// Maintenance, blacklist and the given rate-limit key.
    pub fn guarded(rate_limit: impl Into<String>) -> Self {
        Self {
            maintenance: true,
            blacklist: true,
            rate_limit: Some(rate_limit.into()),
        }
    }

    pub fn with_blacklist(mut self) -> Self {
        self.blacklist = true;
        self
    }
}

/// The terminal result of one interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub user: UserId,
    pub action: ActionKind,
    pub reply: Reply,
    /// `None` when the action completed.
    pub error: Option<ErrorKind>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> &'static str {
        self.error.map_or("ok", |kind| kind.as_str())
    }
}

pub struct ActionPipeline {
    backends: Backends,
    lock: ResponseLock,
    settings: Arc<ShopSettings>,
}

impl ActionPipeline {
    pub fn new(backends: Backends, lock: ResponseLock, settings: Arc<ShopSettings>) -> Self {
        Self {
            backends,
            lock,
            settings,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn settings(&self) -> &ShopSettings {
        &self.settings
    }

    pub fn lock(&self) -> &ResponseLock {
        &self.lock
    }

    /// Runs `handler` for `interaction` and always produces one reply.
    ///
    /// `failure_message` is what the user sees for unclassified errors.
    pub async fn run<F, Fut>(
        &self,
        interaction: &Interaction,
        checks: Preconditions,
        failure_message: &'static str,
        handler: F,
    ) -> ActionOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Reply>>,
    {
        let key = LockKey::new(interaction.user, interaction.kind);
        let Some(guard) = self.lock.try_acquire(key) else {
            return self.outcome(
                interaction,
                Err(ShopError::Cooldown(messages::COOLDOWN.to_string())),
                failure_message,
            );
        };

        let body = async {
            self.check(interaction, &checks).await?;
            handler().await
        };
        let result = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(ShopError::unclassified("handler panicked")),
        };

        let outcome = self.outcome(interaction, result, failure_message);
        drop(guard);
        outcome
    }

    async fn check(&self, interaction: &Interaction, checks: &Preconditions) -> Result<()> {
        let admin = &self.backends.admin;
        let read = self.settings.timeouts.read;

        if checks.maintenance
            && call("is_maintenance_mode", read, admin.is_maintenance_mode()).await?
        {
            return Err(ShopError::validation(messages::MAINTENANCE));
        }

        if checks.blacklist
            && call("check_blacklist", read, admin.check_blacklist(interaction.user)).await?
        {
            warn!(
                user = %interaction.user,
                action = %interaction.kind,
                "Blacklisted user attempted an action"
            );
            return Err(ShopError::validation(messages::BLACKLISTED));
        }

        if let Some(key) = &checks.rate_limit {
            match self.backends.cache.get(key).await {
                Ok(Some(_)) => return Err(ShopError::Cooldown(messages::RATE_LIMIT.to_string())),
                Ok(None) => {}
                Err(err) => warn!(key = %key, error = %err, "Rate-limit lookup failed, allowing"),
            }
        }
        Ok(())
    }

    fn outcome(
        &self,
        interaction: &Interaction,
        result: Result<Reply>,
        failure_message: &'static str,
    ) -> ActionOutcome {
        let (reply, error) = match result {
            Ok(reply) => (reply, None),
            Err(err) => {
                let embed = match &err {
                    ShopError::Validation(message) => {
                        debug!(
                            user = %interaction.user,
                            action = %interaction.kind,
                            reason = %message,
                            "Action rejected"
                        );
                        render::error(message)
                    }
                    ShopError::Cooldown(message) => render::please_wait(message),
                    ShopError::Timeout { operation } => {
                        warn!(
                            user = %interaction.user,
                            action = %interaction.kind,
                            operation,
                            "Remote call timed out"
                        );
                        render::error(timeout_message(operation))
                    }
                    other => {
                        error!(
                            user = %interaction.user,
                            action = %interaction.kind,
                            error = %other,
                            "Action failed"
                        );
                        render::error(failure_message)
                    }
                };
                (Reply::Embed(embed), Some(err.kind()))
            }
        };
        ActionOutcome {
            user: interaction.user,
            action: interaction.kind,
            reply,
            error,
        }
    }

    /// Looks up the user's alias.
    pub async fn lookup_growid(&self, user: UserId) -> Result<Option<GrowId>> {
        let budget = self.settings.timeouts.identity_lookup;
        call("get_growid", budget, self.backends.balance.get_growid(user)).await
    }

    /// The user's alias, or a validation error asking them to register.
    pub async fn require_growid(&self, user: UserId) -> Result<GrowId> {
        self.lookup_growid(user)
            .await?
            .ok_or_else(|| ShopError::validation(messages::NOT_REGISTERED))
    }

    /// Sets a rate-limit flag. Failures are logged and never block the action.
    pub async fn set_rate_limit(&self, key: &str, ttl: Duration) {
        let cache = &self.backends.cache;
        let result = retry_with_backoff(&self.settings.retry, "set_rate_limit", move || {
            cache.set(key, Value::Bool(true), ttl)
        })
        .await;
        if let Err(err) = result {
            error!(key, error = %err, "Failed to set rate limit");
        }
    }

    /// Deletes derived cache entries that may now be stale. Each key is retried
    /// on its own and abandoned after the retry budget.
    pub async fn invalidate(&self, keys: &[String]) {
        let cache = &self.backends.cache;
        for key in keys {
            let result = retry_with_backoff(&self.settings.retry, "invalidate_cache", move || {
                cache.delete(key)
            })
            .await;
            match result {
                Ok(()) => debug!(key = %key, "Cache entry invalidated"),
                Err(err) => error!(key = %key, error = %err, "Failed to invalidate cache"),
            }
        }
    }

    /// Reads a cached JSON value, treating cache errors and undecodable
    /// entries as misses.
    pub async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backends.cache.get(key).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "Cache read failed");
                None
            }
        }
    }

    /// Stores a derived value; failures only cost a future cache miss.
    pub async fn store<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        if let Err(err) = self.backends.cache.set(key, value, ttl).await {
            info!(key, error = %err, "Cache write skipped");
        }
    }
}

/// Awaits `fut` for at most `budget`. Expiry cancels only the awaited call.
pub async fn bounded<T>(
    operation: &'static str,
    budget: Duration,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| ShopError::Timeout { operation })
}

/// [`bounded`] for backend calls, folding the service failure into the
/// error taxonomy.
pub async fn call<T>(
    operation: &'static str,
    budget: Duration,
    fut: impl Future<Output = ServiceResult<T>>,
) -> Result<T> {
    bounded(operation, budget, fut).await?.map_err(classify)
}

/// Whitelisted business failures are shown verbatim; everything else is
/// unclassified.
pub fn classify(failure: ServiceFailure) -> ShopError {
    match failure.reason {
        FailureReason::NotRegistered => ShopError::validation(messages::NOT_REGISTERED),
        FailureReason::Blacklisted => ShopError::validation(messages::BLACKLISTED),
        reason if reason.is_user_facing() => ShopError::Validation(failure.message),
        _ => ShopError::unclassified(failure),
    }
}

fn timeout_message(operation: &str) -> &'static str {
    match operation {
        "process_purchase" => messages::TRANSACTION_TIMEOUT,
        "register_user" => messages::REGISTRATION_TIMEOUT,
        _ => messages::TIMEOUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{Embed, Tone};
    use crate::infrastructure::in_memory::InMemoryShop;

    fn pipeline(shop: &InMemoryShop) -> ActionPipeline {
        ActionPipeline::new(
            shop.backends(),
            ResponseLock::new(),
            Arc::new(ShopSettings::default()),
        )
    }

    fn ok_reply() -> Reply {
        Reply::Embed(Embed::new("done", Tone::Success))
    }

    fn must_not_run(reason: &str) -> Result<Reply> {
        panic!("{reason}")
    }

    #[tokio::test]
    async fn test_success_releases_lock() {
        let shop = InMemoryShop::new();
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(1), ActionKind::Balance);

        let outcome = pipeline
            .run(&interaction, Preconditions::default(), messages::GENERIC_FAILURE, || async {
                Ok(ok_reply())
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.reply.title(), "done");
        assert_eq!(pipeline.lock().held_count(), 0);
    }

    #[tokio::test]
    async fn test_held_lock_yields_cooldown() {
        let shop = InMemoryShop::new();
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(1), ActionKind::Balance);
        let _held = pipeline
            .lock()
            .try_acquire(LockKey::new(UserId(1), ActionKind::Balance))
            .unwrap();

        let outcome = pipeline
            .run(&interaction, Preconditions::default(), messages::GENERIC_FAILURE, || async {
                must_not_run("handler ran while the lock was held")
            })
            .await;

        assert_eq!(outcome.error, Some(ErrorKind::Cooldown));
        assert_eq!(outcome.reply.description(), messages::COOLDOWN);
    }

    #[tokio::test]
    async fn test_unclassified_error_shows_generic_message() {
        let shop = InMemoryShop::new();
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(1), ActionKind::History);

        let outcome = pipeline
            .run(&interaction, Preconditions::default(), messages::HISTORY_FAILED, || async {
                Err(ShopError::unclassified("database exploded"))
            })
            .await;

        assert_eq!(outcome.error, Some(ErrorKind::Unclassified));
        assert_eq!(outcome.reply.description(), messages::HISTORY_FAILED);
        assert!(!outcome.reply.description().contains("database"));
        assert_eq!(pipeline.lock().held_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_releases_lock() {
        let shop = InMemoryShop::new();
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(9), ActionKind::Buy);

        let outcome = pipeline
            .run(
                &interaction,
                Preconditions::default(),
                messages::GENERIC_FAILURE,
                || async { must_not_run("boom") },
            )
            .await;

        assert_eq!(outcome.error, Some(ErrorKind::Unclassified));
        assert!(!pipeline
            .lock()
            .is_held(LockKey::new(UserId(9), ActionKind::Buy)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_and_releases_lock() {
        let shop = InMemoryShop::new();
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(1), ActionKind::WorldInfo);

        let outcome = pipeline
            .run(&interaction, Preconditions::default(), messages::GENERIC_FAILURE, || async {
                let slow = tokio::time::sleep(Duration::from_secs(60));
                bounded("get_world_info", Duration::from_secs(10), slow).await?;
                Ok(ok_reply())
            })
            .await;

        assert_eq!(outcome.error, Some(ErrorKind::Timeout));
        assert_eq!(outcome.reply.description(), messages::TIMEOUT);
        assert_eq!(pipeline.lock().held_count(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_short_circuits_before_handler() {
        let shop = InMemoryShop::new();
        shop.admin.set_maintenance(true);
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(1), ActionKind::Balance);

        let outcome = pipeline
            .run(&interaction, Preconditions::maintenance(), messages::GENERIC_FAILURE, || async {
                must_not_run("handler ran in maintenance")
            })
            .await;

        assert_eq!(outcome.error, Some(ErrorKind::Validation));
        assert_eq!(outcome.reply.description(), messages::MAINTENANCE);
    }

    #[tokio::test]
    async fn test_blacklisted_user_rejected() {
        let shop = InMemoryShop::new();
        shop.admin.blacklist(UserId(13));
        let pipeline = pipeline(&shop);
        let interaction = Interaction::new(UserId(13), ActionKind::Register);

        let outcome = pipeline
            .run(
                &interaction,
                Preconditions::maintenance().with_blacklist(),
                messages::GENERIC_FAILURE,
                || async { Ok(ok_reply()) },
            )
            .await;

        assert_eq!(outcome.reply.description(), messages::BLACKLISTED);
    }

    #[tokio::test]
    async fn test_rate_limit_flag_yields_cooldown() {
        let shop = InMemoryShop::new();
        let pipeline = pipeline(&shop);
        pipeline
            .set_rate_limit("register_limit_5", Duration::from_secs(300))
            .await;
        let interaction = Interaction::new(UserId(5), ActionKind::Register);

        let outcome = pipeline
            .run(
                &interaction,
                Preconditions::guarded("register_limit_5"),
                messages::GENERIC_FAILURE,
                || async { Ok(ok_reply()) },
            )
            .await;

        assert_eq!(outcome.error, Some(ErrorKind::Cooldown));
        assert_eq!(outcome.reply.description(), messages::RATE_LIMIT);
    }

    #[test]
    fn test_classify_whitelist() {
        let shown = classify(ServiceFailure::new(
            FailureReason::InsufficientBalance,
            "Insufficient balance",
        ));
        assert!(matches!(shown, ShopError::Validation(m) if m == "Insufficient balance"));

        let hidden = classify(ServiceFailure::new(FailureReason::Internal, "stack trace"));
        assert_eq!(hidden.kind(), ErrorKind::Unclassified);
    }
}

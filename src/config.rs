//! Runtime settings: CLI arguments plus the timing and policy knobs the
//! storefront runs with.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Budgets for every class of remote call.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub identity_lookup: Duration,
    pub read: Duration,
    pub stock_probe: Duration,
    pub registration: Duration,
    pub purchase: Duration,
    pub recovery: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            identity_lookup: Duration::from_secs(10),
            read: Duration::from_secs(10),
            stock_probe: Duration::from_secs(5),
            registration: Duration::from_secs(20),
            purchase: Duration::from_secs(30),
            recovery: Duration::from_secs(10),
        }
    }
}

/// Cooldown applied after each throttled action.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub registration: Duration,
    pub purchase_modal: Duration,
    pub purchase_submit: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            registration: Duration::from_secs(300),
            purchase_modal: Duration::from_secs(60),
            purchase_submit: Duration::from_secs(300),
        }
    }
}

/// How long derived read data stays cached.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub balance: Duration,
    pub history: Duration,
    pub world_info: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            balance: Duration::from_secs(30),
            history: Duration::from_secs(30),
            world_info: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchasePolicy {
    /// Purchases above this many items are queued.
    pub queue_threshold: u32,
    /// The buy button refuses new purchases while the queue is longer than this.
    pub max_queue_size: usize,
    pub history_preview: usize,
    pub history_page: usize,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            queue_threshold: 10,
            max_queue_size: 50,
            history_preview: 3,
            history_page: 5,
        }
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub max_attempts: usize,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
    pub provider_ready_timeout: Duration,
    pub find_message_timeout: Duration,
    pub force_update_timeout: Duration,
    /// Overall bound on `LifecycleController::start`.
    pub startup_timeout: Duration,
    /// How long the storefront message id stays in the cache.
    pub message_cache_ttl: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_secs(5),
            provider_ready_timeout: Duration::from_secs(10),
            find_message_timeout: Duration::from_secs(10),
            force_update_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(60),
            message_cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Everything the storefront core is parameterized by.
#[derive(Debug, Clone, Default)]
pub struct ShopSettings {
    pub timeouts: Timeouts,
    pub rate_limits: RateLimits,
    pub cache_ttls: CacheTtls,
    pub purchase: PurchasePolicy,
    pub retry: RetryPolicy,
    pub reconciler: ReconcilerSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Replays storefront interactions against in-memory backends",
    long_about = None
)]
pub struct Cli {
    /// Interactions CSV file (`user,action,product,quantity,alias`)
    pub input: PathBuf,

    /// Channel hosting the storefront message.
    #[arg(long, env = "LIVE_SHOP_CHANNEL_ID", default_value_t = 1)]
    pub channel_id: u64,

    /// JSON catalog with products, stock and world info. Uses a built-in demo catalog if omitted.
    #[arg(long, env = "LIVE_SHOP_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Start with maintenance mode enabled.
    #[arg(long)]
    pub maintenance: bool,

    /// Print the storefront health report as JSON before shutting down.
    #[arg(long)]
    pub health: bool,

    #[arg(long, value_enum, env = "LIVE_SHOP_LOG_LEVEL", default_value = "warn")]
    pub log_level: LogLevel,

    #[arg(long, value_enum, env = "LIVE_SHOP_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,
}

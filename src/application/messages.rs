//! User-facing texts.

pub const COOLDOWN: &str = "⏳ Please wait, your previous request is still being processed.";
pub const MAINTENANCE: &str = "🔧 The shop is under maintenance. Please try again later.";
pub const INITIALIZING: &str = "⏳ The shop is starting up, stock will appear shortly.";
pub const RATE_LIMIT: &str = "⏳ You are doing that too often. Please wait a moment.";
pub const BLACKLISTED: &str = "⛔ Your account is not allowed to use the shop.";
pub const NOT_REGISTERED: &str = "❌ You have not set a GrowID yet. Use 📝 Set GrowID first.";
pub const TIMEOUT: &str = "⌛ The service took too long to respond. Please try again.";
pub const TRANSACTION_TIMEOUT: &str =
    "⌛ The transaction took too long. Check your balance before trying again.";
pub const REGISTRATION_TIMEOUT: &str = "⌛ Registration took too long. Please try again.";
pub const SYSTEM_BUSY: &str = "⏳ The shop is busy processing other orders. Please try again soon.";
pub const NO_PRODUCTS: &str = "❌ No products are available right now.";
pub const OUT_OF_STOCK: &str = "❌ Every product is out of stock.";
pub const NO_HISTORY: &str = "❌ You have no transactions yet.";
pub const PROCESSING: &str =
    "Your transaction is being processed. You will be notified once it completes.";
pub const REGISTRATION_BUSY: &str =
    "The system is processing another registration. Please try again shortly.";
pub const GENERIC_FAILURE: &str = "❌ Something went wrong. Please try again later.";
pub const TRANSACTION_FAILED: &str = "❌ The transaction failed. Please try again later.";
pub const REGISTRATION_FAILED: &str = "❌ Registration failed. Please try again later.";
pub const BALANCE_FAILED: &str = "❌ Could not load your balance. Please try again later.";
pub const HISTORY_FAILED: &str = "❌ Could not load your history. Please try again later.";
pub const WORLD_INFO_FAILED: &str = "❌ Could not load world info. Please try again later.";

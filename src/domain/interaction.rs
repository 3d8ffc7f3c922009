use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Chat-platform user snowflake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every user-triggered action the storefront handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// "Set GrowID" button; opens the registration form.
    Register,
    Balance,
    WorldInfo,
    /// "Buy" button; opens the purchase form.
    Buy,
    History,
    /// Registration form submitted.
    SubmitRegistration,
    /// Purchase form submitted.
    SubmitPurchase,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Register => "register",
            ActionKind::Balance => "balance",
            ActionKind::WorldInfo => "world_info",
            ActionKind::Buy => "buy",
            ActionKind::History => "history",
            ActionKind::SubmitRegistration => "submit_registration",
            ActionKind::SubmitPurchase => "submit_purchase",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "register" => Ok(ActionKind::Register),
            "balance" => Ok(ActionKind::Balance),
            "world_info" => Ok(ActionKind::WorldInfo),
            "buy" => Ok(ActionKind::Buy),
            "history" => Ok(ActionKind::History),
            "submit_registration" => Ok(ActionKind::SubmitRegistration),
            "submit_purchase" => Ok(ActionKind::SubmitPurchase),
            other => Err(format!("unknown action `{other}`")),
        }
    }
}

/// Form field names used by the two modal forms.
pub mod fields {
    pub const GROWID: &str = "growid";
    pub const PRODUCT_CODE: &str = "product_code";
    pub const QUANTITY: &str = "quantity";
}

/// One user-initiated action, discarded once its reply is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub user: UserId,
    pub kind: ActionKind,
    pub fields: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user: UserId, kind: ActionKind) -> Self {
        Self {
            user,
            kind,
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Raw field value, empty when the field was not submitted.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }
}

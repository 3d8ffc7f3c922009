use crate::domain::balance::Balance;
use crate::error::ShopError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog code of a product, always trimmed and upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductCode(String);

impl ProductCode {
    pub const MAX_LEN: usize = 10;

    pub fn parse(raw: &str) -> Result<Self, ShopError> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() || code.chars().count() > Self::MAX_LEN {
            return Err(ShopError::validation("Invalid product code"));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: ProductCode,
    pub name: String,
    pub price: Balance,
    #[serde(default)]
    pub description: String,
    /// Stock count as last probed; filled in by the buy flow.
    #[serde(default)]
    pub stock: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldStatus {
    Online,
    Offline,
    Maintenance,
    Busy,
    Full,
    #[serde(other)]
    Unknown,
}

impl WorldStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            WorldStatus::Online => "🟢",
            WorldStatus::Offline => "🔴",
            WorldStatus::Maintenance => "🔧",
            WorldStatus::Busy => "🟡",
            WorldStatus::Full => "🔵",
            WorldStatus::Unknown => "❓",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorldStatus::Online => "ONLINE",
            WorldStatus::Offline => "OFFLINE",
            WorldStatus::Maintenance => "MAINTENANCE",
            WorldStatus::Busy => "BUSY",
            WorldStatus::Full => "FULL",
            WorldStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Where buyers pick up their items in game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub world: String,
    pub owner: String,
    pub bot: String,
    pub status: WorldStatus,
    #[serde(default)]
    pub features: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_code_normalized() {
        let code = ProductCode::parse("  dl01 ").unwrap();
        assert_eq!(code.as_str(), "DL01");
    }

    #[test]
    fn test_product_code_bounds() {
        assert!(ProductCode::parse("   ").is_err());
        assert!(ProductCode::parse("ABCDEFGHIJK").is_err());
        assert!(ProductCode::parse("ABCDEFGHIJ").is_ok());
    }

    #[test]
    fn test_world_status_deserializes_unknown() {
        let status: WorldStatus = serde_json::from_str("\"exploding\"").unwrap();
        assert_eq!(status, WorldStatus::Unknown);
        let status: WorldStatus = serde_json::from_str("\"busy\"").unwrap();
        assert_eq!(status.emoji(), "🟡");
    }
}

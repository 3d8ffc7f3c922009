use crate::error::ShopError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

pub const WL_PER_DL: i64 = 100;
pub const WL_PER_BGL: i64 = 10_000;

/// An amount of in-game currency, counted in World Locks.
///
/// Higher denominations (Diamond Locks, Blue Gem Locks) only exist for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub i64);

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn from_wl(wl: i64) -> Self {
        Self(wl)
    }

    pub fn wl(&self) -> i64 {
        self.0
    }

    /// Multi-line breakdown used inside `yml` code blocks.
    pub fn format(&self) -> String {
        let total = self.0;
        let bgl = total / WL_PER_BGL;
        let dl = (total % WL_PER_BGL) / WL_PER_DL;
        let wl = total % WL_PER_DL;
        format!(
            "Total : {} WL\nBGL   : {}\nDL    : {}\nWL    : {}",
            group_thousands(total),
            bgl,
            dl,
            wl
        )
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} WL", group_thousands(self.0))
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Formats an integer with `,` thousands separators.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// A player's in-game alias, bound 1:1 to a balance account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrowId(String);

impl GrowId {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 30;

    /// Validates a raw alias: 3-30 characters, ASCII letters, digits and `_`.
    pub fn parse(raw: &str) -> Result<Self, ShopError> {
        let alias = raw.trim();
        let len = alias.chars().count();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&len) {
            return Err(ShopError::validation(format!(
                "GrowID must be between {} and {} characters",
                Self::MIN_LEN,
                Self::MAX_LEN
            )));
        }
        let stripped: String = alias.chars().filter(|c| *c != '_').collect();
        if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ShopError::validation(
                "GrowID may only contain letters, numbers and underscores",
            ));
        }
        Ok(Self(alias.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

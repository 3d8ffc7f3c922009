use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a backend service refused or failed a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotRegistered,
    AlreadyRegistered,
    InvalidInput,
    ProductNotFound,
    OutOfStock,
    InsufficientBalance,
    DailyLimitExceeded,
    Blacklisted,
    /// The backend could not take its own lock; the caller may retry shortly.
    LockBusy,
    Unavailable,
    Internal,
}

impl FailureReason {
    /// Whether the backend message for this reason may be shown to the user.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            FailureReason::LockBusy | FailureReason::Unavailable | FailureReason::Internal
        )
    }
}

/// Failure half of a backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub reason: FailureReason,
    pub message: String,
    /// Identifier of a transaction the backend may have partially applied.
    pub transaction_id: Option<String>,
}

impl ServiceFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            transaction_id: None,
        }
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.reason, self.message)
    }
}

impl std::error::Error for ServiceFailure {}

/// Tagged result every backend call returns.
pub type ServiceResult<T> = Result<T, ServiceFailure>;

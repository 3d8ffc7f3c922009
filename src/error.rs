use thiserror::Error;

/// Outcome classes a user action can end in.
///
/// Every [`ShopError`] maps to exactly one kind; the pipeline uses the kind to
/// decide how loudly to log and what the user gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Cooldown,
    Timeout,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Cooldown => "cooldown",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unclassified => "unclassified",
        }
    }
}

#[derive(Error, Debug)]
pub enum ShopError {
    /// Bad input or a business-rule rejection. The message is shown verbatim.
    #[error("{0}")]
    Validation(String),
    /// Lock or rate-limit contention.
    #[error("{0}")]
    Cooldown(String),
    /// A bounded remote call exceeded its budget.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    /// Anything else. The detail is logged, never shown.
    #[error("unclassified failure: {0}")]
    Unclassified(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ShopError {
    pub fn validation(message: impl Into<String>) -> Self {
        ShopError::Validation(message.into())
    }

    pub fn unclassified(detail: impl std::fmt::Display) -> Self {
        ShopError::Unclassified(detail.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ShopError::Validation(_) => ErrorKind::Validation,
            ShopError::Cooldown(_) => ErrorKind::Cooldown,
            ShopError::Timeout { .. } => ErrorKind::Timeout,
            ShopError::Unclassified(_)
            | ShopError::CsvError(_)
            | ShopError::IoError(_)
            | ShopError::JsonError(_) => ErrorKind::Unclassified,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;

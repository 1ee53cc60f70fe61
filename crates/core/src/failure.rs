//! Why a fail-open component could not consult the shared store
//!
//! The semantic cache, rate limiter and circuit breaker expose `try_*`
//! operations returning `Result<T, FailureReason>`. Their infallible
//! wrappers map every reason to a fixed fallback:
//!
//! | Reason | Cache lookup | Cache store | Rate limiter | Breaker |
//! |---|---|---|---|---|
//! | `StoreDisabled` | miss | no-op | allow, full quota | allow, phase unknown |
//! | `Store` | miss | no-op | allow, full quota | allow, phase unknown |
//! | `MalformedEntry` | miss | n/a | allow, full quota | reset to closed |

use thiserror::Error;

use crate::traits::StoreError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// No store was configured or it was unreachable at startup
    #[error("shared store disabled")]
    StoreDisabled,

    /// The store rejected or failed a command
    #[error("shared store failure: {0}")]
    Store(#[from] StoreError),

    /// A value was present but could not be decoded
    #[error("malformed entry at {key}: {message}")]
    MalformedEntry { key: String, message: String },
}

impl FailureReason {
    pub fn malformed(key: impl Into<String>, message: impl ToString) -> Self {
        FailureReason::MalformedEntry {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::StoreDisabled => "store_disabled",
            FailureReason::Store(_) => "store_error",
            FailureReason::MalformedEntry { .. } => "malformed_entry",
        }
    }
}

//! Unified error handling with Sentry integration.
//!
//! Every engine operation returns `Result<T, SyncError>`. None of these errors
//! is fatal to the engine: the local mirror is left exactly as it was and the
//! caller decides whether to retry. [`MutationOutcome`] flattens a result into
//! the `{success, message}` shape a UI displays.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the Collection Store client and the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No response was obtained (connection refused, reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered but refused the operation.
    #[error("Rejected by collection store ({status}): {message}")]
    Rejected {
        /// HTTP status of the response.
        status: u16,
        /// Message from the store, or a generic description.
        message: String,
    },

    /// No identity could be resolved for the operation.
    #[error("No identity available for this session")]
    NoIdentity,

    /// A buyer ID matched the shared guest identity.
    ///
    /// The store scopes collections by the bare ID, so using it would share
    /// the guest's collections with the buyer.
    #[error("Buyer ID collides with the guest identity: {0}")]
    IdentityConflict(String),

    /// The store's response did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A quantity argument was out of range.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

impl SyncError {
    /// Whether the failure happened before any response was obtained.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Message suitable for showing to a shopper.
    ///
    /// Store rejection messages are passed through; transport details are not.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Could not reach the store, please try again".to_string(),
            Self::Rejected { message, .. } => message.clone(),
            Self::NoIdentity => "Please sign in to continue".to_string(),
            Self::IdentityConflict(_) => "This account cannot be used here".to_string(),
            Self::Decode(_) => "Unexpected response from the store".to_string(),
            Self::InvalidQuantity(msg) => msg.clone(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Uniform `{success, message}` result handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MutationOutcome {
    /// A successful outcome with no message.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

impl<T> From<Result<T>> for MutationOutcome {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self {
                success: false,
                message: Some(err.user_message()),
            },
        }
    }
}

/// Report a failed store call.
///
/// Transport and decode failures are captured to Sentry; rejections are
/// expected business outcomes and only logged.
pub(crate) fn report(err: &SyncError, operation: &str) {
    match err {
        SyncError::Transport(_) | SyncError::Decode(_) => {
            let event_id = sentry::capture_error(err);
            tracing::warn!(
                error = %err,
                operation,
                sentry_event_id = %event_id,
                "Collection store call failed"
            );
        }
        _ => tracing::warn!(error = %err, operation, "Collection store call rejected"),
    }
}

/// Add a breadcrumb for a successful mutation.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart and
/// wishlist actions leading up to an error.
pub(crate) fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

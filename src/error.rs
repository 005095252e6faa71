use thiserror::Error;

/// Result alias used throughout the crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Error taxonomy for the authorization layer.
///
/// Every variant carries string-backed causes so the coordinator can clone a
/// single exchange outcome out to arbitrarily many queued waiters.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// A protected call was rejected by the service (HTTP 401-class).
    /// Recoverable through renewal at most once per logical call.
    #[error("authorization failed with status {status}: {context}")]
    AuthorizationFailure {
        /// HTTP status code that triggered the classification
        status: u16,
        /// What was being requested when the rejection happened
        context: String,
    },

    /// The renewal exchange itself was rejected or errored. Terminal for all
    /// callers queued on that exchange; the session is cleared.
    #[error("credential renewal failed: {reason}")]
    RenewalFailure {
        /// Why the exchange failed
        reason: String,
    },

    /// A sign-out landed while the renewal exchange was in flight, so its
    /// result was discarded rather than resurrecting the cleared session.
    #[error("credential renewal superseded by sign-out")]
    RenewalSuperseded,

    /// A protected call failed with a non-authorization error status.
    /// Passed through as-is; never triggers a refresh.
    #[error("request failed with status {status}: {context}")]
    RequestFailed {
        /// HTTP status code
        status: u16,
        /// What was being requested, plus a body excerpt when available
        context: String,
    },

    /// Network-level failure on a protected call or the renewal exchange.
    /// Never alters authentication state and is never retried here.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying transport error rendered to text
        message: String,
    },

    /// An endpoint returned a body we could not interpret.
    #[error("invalid response from {context}")]
    InvalidResponse {
        /// Which exchange produced the body
        context: String,
    },

    /// Coordinator plumbing fault, e.g. a waiter channel dropped.
    #[error("internal auth layer error: {message}")]
    Internal {
        /// Description of the fault
        message: String,
    },
}

impl AuthError {
    /// Create an authorization failure for the given status and request context
    pub fn authorization_failure(status: u16, context: impl Into<String>) -> Self {
        AuthError::AuthorizationFailure {
            status,
            context: context.into(),
        }
    }

    /// Create a terminal renewal failure
    pub fn renewal_failure(reason: impl Into<String>) -> Self {
        AuthError::RenewalFailure {
            reason: reason.into(),
        }
    }

    /// Create a non-auth request failure for the given status and context
    pub fn request_failed(status: u16, context: impl Into<String>) -> Self {
        AuthError::RequestFailed {
            status,
            context: context.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        AuthError::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid-response error
    pub fn invalid_response(context: impl Into<String>) -> Self {
        AuthError::InvalidResponse {
            context: context.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        AuthError::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error means the session is gone for good and the
    /// application should treat the user as signed out
    pub fn is_terminal_for_session(&self) -> bool {
        matches!(
            self,
            AuthError::RenewalFailure { .. } | AuthError::RenewalSuperseded
        )
    }

    /// Returns true for authorization rejections of protected calls
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, AuthError::AuthorizationFailure { .. })
    }

    /// Returns true for network-level failures
    pub fn is_transport(&self) -> bool {
        matches!(self, AuthError::Transport { .. })
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Transport {
            message: err.to_string(),
        }
    }
}

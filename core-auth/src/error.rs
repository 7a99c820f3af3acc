use bridge_traits::BridgeError;
use core_async::TimeoutError;
use core_runtime::logging::redact_tokens;
use thiserror::Error;

/// Coarse classification surfaced to callers and the CLI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    Authentication,
    Timeout,
    Network,
    Validation,
    Storage,
    Configuration,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("OAuth state mismatch in authorization callback")]
    StateMismatch,

    #[error("Authorization grant rejected: {0}")]
    InvalidGrant(String),

    #[error("Token endpoint returned {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid credential: {0}")]
    Validation(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored credential for account {account} is corrupted: {reason}")]
    TokenCorrupted { account: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Callback port {port} is already in use")]
    CallbackPortInUse { port: u16 },

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::Authentication(_)
            | AuthError::StateMismatch
            | AuthError::InvalidGrant(_)
            | AuthError::TokenEndpoint { .. }
            | AuthError::NoRefreshToken
            | AuthError::NotAuthenticated => AuthErrorKind::Authentication,
            AuthError::Timeout { .. } => AuthErrorKind::Timeout,
            AuthError::Network(_) => AuthErrorKind::Network,
            AuthError::Validation(_) => AuthErrorKind::Validation,
            AuthError::SecureStorageUnavailable(_) | AuthError::TokenCorrupted { .. } => {
                AuthErrorKind::Storage
            }
            AuthError::Configuration(_) | AuthError::CallbackPortInUse { .. } => {
                AuthErrorKind::Configuration
            }
        }
    }

    /// Whether repeating the same exchange may succeed.
    ///
    /// Rejected grants, state mismatches and validation failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Network(_) | AuthError::Timeout { .. } => true,
            AuthError::TokenEndpoint { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Suggested next step for the user.
    pub fn remediation(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "Check your API key and try again.",
            AuthError::Network(_) | AuthError::Timeout { .. } => {
                "Check your network connection and try again."
            }
            AuthError::TokenEndpoint { status, .. } if *status >= 500 => {
                "The authorization server is having trouble. Try again shortly."
            }
            AuthError::SecureStorageUnavailable(_) | AuthError::TokenCorrupted { .. } => {
                "Make sure the system keychain is unlocked, then log in again."
            }
            AuthError::Configuration(_) => "Fix the authentication settings and restart.",
            AuthError::CallbackPortInUse { .. } => {
                "Close the program using the callback port or configure another redirect URI."
            }
            _ => "Try logging in again.",
        }
    }

    /// Names the operation on a timeout raised by the generic wrapper.
    pub(crate) fn during(self, operation: &str) -> Self {
        match self {
            AuthError::Timeout { seconds, .. } => AuthError::Timeout {
                operation: operation.to_string(),
                seconds,
            },
            other => other,
        }
    }

    /// Message safe to print: cause plus remediation, with anything shaped
    /// like a token replaced.
    pub fn user_message(&self) -> String {
        redact_tokens(&format!("{}. {}", self, self.remediation()))
    }
}

impl From<TimeoutError> for AuthError {
    fn from(err: TimeoutError) -> Self {
        AuthError::Timeout {
            operation: "Operation".to_string(),
            seconds: err.limit.as_secs(),
        }
    }
}

impl From<BridgeError> for AuthError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(message) => {
                AuthError::Network(format!("request timed out: {message}"))
            }
            BridgeError::Network(message) => AuthError::Network(message),
            other => AuthError::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_classification() {
        assert!(AuthError::Network("reset".into()).is_retryable());
        assert!(AuthError::TokenEndpoint {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(AuthError::TokenEndpoint {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!AuthError::InvalidGrant("invalid_grant".into()).is_retryable());
        assert!(!AuthError::StateMismatch.is_retryable());
        assert!(!AuthError::Validation("short".into()).is_retryable());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(AuthError::StateMismatch.kind(), AuthErrorKind::Authentication);
        assert_eq!(
            AuthError::Validation("x".into()).kind(),
            AuthErrorKind::Validation
        );
        let timeout: AuthError = TimeoutError {
            limit: Duration::from_secs(5),
        }
        .into();
        assert_eq!(timeout.kind(), AuthErrorKind::Timeout);
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_bridge_errors_map_to_network() {
        let err: AuthError = BridgeError::Network("connection refused".into()).into();
        assert!(matches!(err, AuthError::Network(_)));
        let err: AuthError = BridgeError::Timeout("30s".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_message_redacts_tokens() {
        let err = AuthError::TokenEndpoint {
            status: 400,
            message: "bad token sk-ant-REDACTED".into(),
        };
        let message = err.user_message();
        assert!(!message.contains("abcdefghijklmnopqrstuvwxyz"));
        assert!(message.contains("Try logging in again."));
    }
}

use bridge_traits::BridgeError;
use core_async::TimeoutError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Not authenticated; log in first")]
    NotAuthenticated,

    /// The service still answered 401 after the session was refreshed, or
    /// the session could not be refreshed.
    #[error("Request unauthorized (HTTP 401)")]
    Unauthorized,

    /// Retryable status that persisted through every attempt.
    #[error("Upstream service returned HTTP {status}")]
    Upstream { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl CoreError {
    /// Transport failures and 408/429/5xx answers.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Network(_) | CoreError::Timeout { .. } => true,
            CoreError::Upstream { status } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

impl From<BridgeError> for CoreError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Network(message) | BridgeError::Timeout(message) => {
                CoreError::Network(message)
            }
            other => CoreError::Network(other.to_string()),
        }
    }
}

impl From<TimeoutError> for CoreError {
    fn from(err: TimeoutError) -> Self {
        CoreError::Timeout {
            seconds: err.limit.as_secs(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

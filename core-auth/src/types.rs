use chrono::{DateTime, TimeZone, Utc};
use core_runtime::events::Event;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_runtime::config::AuthMethod;

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// The authenticated session's proof of identity.
///
/// A credential with a refresh token and a real expiry is *refreshable*.
/// One without a refresh token (API keys) is *static* and is never
/// scheduled for renewal.
///
/// # Security
///
/// The `Debug` implementation never prints token material.
///
/// # Examples
///
/// ```
/// use core_auth::Credential;
///
/// let key = Credential::api_key("sk-ant-REDACTED");
/// assert!(!key.is_refreshable());
/// assert_eq!(key.expires_at, 0);
/// assert!(!key.is_expired(i64::MAX));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds. `0` means the credential never expires.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Space-delimited scopes, possibly empty.
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl Credential {
    /// A static, never-expiring credential wrapping an API key.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            id: None,
            access_token: key.into(),
            refresh_token: None,
            expires_at: 0,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            scope: String::new(),
        }
    }

    /// Builds an OAuth credential expiring `expires_in` seconds after `now`.
    pub fn from_token_response(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        token_type: Option<String>,
        scope: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            access_token,
            refresh_token: refresh_token.filter(|token| !token.is_empty()),
            expires_at: now.saturating_add(expires_in.max(0)),
            token_type: token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
            scope: scope.unwrap_or_default(),
        }
    }

    pub fn is_refreshable(&self) -> bool {
        self.expires_at > 0
            && self
                .refresh_token
                .as_deref()
                .is_some_and(|token| !token.is_empty())
    }

    pub fn never_expires(&self) -> bool {
        self.expires_at <= 0
    }

    pub fn is_expired(&self, now: i64) -> bool {
        !self.never_expires() && now >= self.expires_at
    }

    /// True when the remaining lifetime is at or below `threshold_secs`.
    pub fn is_near_expiry(&self, threshold_secs: i64, now: i64) -> bool {
        !self.never_expires() && self.expires_at - now <= threshold_secs
    }

    /// Seconds until expiry, clamped at zero. `None` for non-expiring credentials.
    pub fn expires_in(&self, now: i64) -> Option<i64> {
        (!self.never_expires()).then(|| (self.expires_at - now).max(0))
    }

    /// Value for the `Authorization` header: `"{token_type} {access_token}"`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        if self.never_expires() {
            return None;
        }
        Utc.timestamp_opt(self.expires_at, 0).single()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Masks all but the first and last four characters.
///
/// Tokens of eight characters or fewer are masked entirely.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Authentication state of a session manager.
///
/// # State Transitions
///
/// ```text
/// Initial -> Authenticating -> Authenticated <-> Refreshing
///                 |                  |               |
///                 v                  v               v
///              Failed             Initial          Failed
/// ```
///
/// `Failed` is not sticky: authenticating again leaves it.
/// `Unauthenticated` is only reported by `SessionManager::status` while no
/// credential has ever been established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AuthState {
    #[default]
    Initial,
    Authenticating,
    Authenticated,
    Refreshing,
    Failed,
    Unauthenticated,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Initial => "initial",
            AuthState::Authenticating => "authenticating",
            AuthState::Authenticated => "authenticated",
            AuthState::Refreshing => "refreshing",
            AuthState::Failed => "failed",
            AuthState::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether an operation is currently in flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, AuthState::Authenticating | AuthState::Refreshing)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What collaborators may see about a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
    pub method: AuthMethod,
    pub token_type: String,
    /// Unix seconds, `0` for never.
    pub expires_at: i64,
    pub scope: String,
    pub refreshable: bool,
    pub masked_access_token: String,
}

impl CredentialSummary {
    pub fn new(credential: &Credential, method: AuthMethod) -> Self {
        Self {
            method,
            token_type: credential.token_type.clone(),
            expires_at: credential.expires_at,
            scope: credential.scope.clone(),
            refreshable: credential.is_refreshable(),
            masked_access_token: mask_token(&credential.access_token),
        }
    }
}

/// Token information for CLI display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenDetails {
    pub token_type: String,
    pub method: AuthMethod,
    /// `None` when the credential never expires.
    pub expires: Option<DateTime<Utc>>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub masked_access_token: String,
}

impl TokenDetails {
    pub fn new(credential: &Credential, method: AuthMethod, now: i64) -> Self {
        Self {
            token_type: credential.token_type.clone(),
            method,
            expires: credential.expires_at_utc(),
            expires_in: credential.expires_in(now),
            scope: (!credential.scope.is_empty()).then(|| credential.scope.clone()),
            masked_access_token: mask_token(&credential.access_token),
        }
    }
}

/// Result of `SessionManager::authenticate`.
///
/// Failures are ordinary values here; callers branch on `success`.
#[derive(Debug)]
pub struct AuthOutcome {
    pub success: bool,
    pub method: AuthMethod,
    pub credential_summary: Option<CredentialSummary>,
    pub error: Option<crate::error::AuthError>,
    pub state: AuthState,
}

impl AuthOutcome {
    pub(crate) fn succeeded(method: AuthMethod, credential: &Credential) -> Self {
        Self {
            success: true,
            method,
            credential_summary: Some(CredentialSummary::new(credential, method)),
            error: None,
            state: AuthState::Authenticated,
        }
    }

    pub(crate) fn failed(method: AuthMethod, error: crate::error::AuthError) -> Self {
        Self {
            success: false,
            method,
            credential_summary: None,
            error: Some(error),
            state: AuthState::Failed,
        }
    }

    /// Redacted message plus remediation, if this outcome failed.
    pub fn user_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.user_message())
    }
}

/// Lifecycle notifications published by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    StateChanged { from: AuthState, to: AuthState },
    LoggedIn { method: AuthMethod },
    LoggedOut,
    TokenRefreshed { expires_at: i64 },
    /// `message` is already redacted.
    Error { message: String, recoverable: bool },
}

impl AuthEvent {
    pub const STATE_CHANGED: &'static str = "state-changed";
    pub const LOGGED_IN: &'static str = "logged-in";
    pub const LOGGED_OUT: &'static str = "logged-out";
    pub const TOKEN_REFRESHED: &'static str = "token-refreshed";
    pub const ERROR: &'static str = "error";
}

impl Event for AuthEvent {
    fn name(&self) -> &'static str {
        match self {
            AuthEvent::StateChanged { .. } => Self::STATE_CHANGED,
            AuthEvent::LoggedIn { .. } => Self::LOGGED_IN,
            AuthEvent::LoggedOut => Self::LOGGED_OUT,
            AuthEvent::TokenRefreshed { .. } => Self::TOKEN_REFRESHED,
            AuthEvent::Error { .. } => Self::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth_credential(expires_at: i64) -> Credential {
        Credential {
            id: Some("cred-1".to_string()),
            access_token: "access-token-value".to_string(),
            refresh_token: Some("refresh-token-value".to_string()),
            expires_at,
            token_type: "Bearer".to_string(),
            scope: "user:inference".to_string(),
        }
    }

    #[test]
    fn test_refreshable_requires_refresh_token_and_expiry() {
        assert!(oauth_credential(1_000).is_refreshable());
        assert!(!oauth_credential(0).is_refreshable());

        let mut no_refresh = oauth_credential(1_000);
        no_refresh.refresh_token = None;
        assert!(!no_refresh.is_refreshable());

        no_refresh.refresh_token = Some(String::new());
        assert!(!no_refresh.is_refreshable());
    }

    #[test]
    fn test_expiry_checks() {
        let credential = oauth_credential(1_000);
        assert!(!credential.is_expired(999));
        assert!(credential.is_expired(1_000));
        assert!(credential.is_near_expiry(300, 800));
        assert!(!credential.is_near_expiry(300, 600));
        assert_eq!(credential.expires_in(400), Some(600));
        assert_eq!(credential.expires_in(2_000), Some(0));

        let forever = Credential::api_key("sk-ant-REDACTED");
        assert!(!forever.is_near_expiry(300, i64::MAX - 1));
        assert_eq!(forever.expires_in(0), None);
        assert_eq!(forever.expires_at_utc(), None);
    }

    #[test]
    fn test_from_token_response_defaults() {
        let credential = Credential::from_token_response(
            "at".to_string(),
            Some(String::new()),
            3600,
            None,
            None,
            10,
        );
        assert_eq!(credential.expires_at, 3610);
        assert_eq!(credential.token_type, "Bearer");
        assert_eq!(credential.refresh_token, None);
        assert!(credential.id.is_some());
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(
            oauth_credential(1).authorization_header(),
            "Bearer access-token-value"
        );
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("abcdefghijklmnop"), "abcd...mnop");
        assert_eq!(mask_token("abcdefgh"), "********");
        assert_eq!(mask_token("ab"), "****");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", oauth_credential(1));
        assert!(!debug.contains("access-token-value"));
        assert!(!debug.contains("refresh-token-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_serde_defaults() {
        let credential: Credential =
            serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(credential.token_type, "Bearer");
        assert_eq!(credential.expires_at, 0);
        assert!(credential.refresh_token.is_none());
    }

    #[test]
    fn test_token_details() {
        let details = TokenDetails::new(&oauth_credential(1_000), AuthMethod::OAuth, 400);
        assert_eq!(details.expires_in, Some(600));
        assert_eq!(details.masked_access_token, "acce...alue");
        assert_eq!(details.scope.as_deref(), Some("user:inference"));
        assert!(details.expires.is_some());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(AuthEvent::LoggedOut.name(), "logged-out");
        assert_eq!(
            AuthEvent::StateChanged {
                from: AuthState::Initial,
                to: AuthState::Authenticating
            }
            .name(),
            "state-changed"
        );
    }
}

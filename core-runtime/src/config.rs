//! # Core Configuration Module
//!
//! Strongly-typed configuration for the assistant core.
//!
//! ## Overview
//!
//! The (external) configuration loader merges files, flags and environment
//! into a single [`AuthConfig`] value and hands it over. Nothing in the core
//! re-reads configuration sources afterwards; the one documented exception is
//! the static API key environment variable named by
//! [`AuthConfig::api_key_env_var`], which the session manager reads at
//! authentication time.
//!
//! [`CoreConfig`] bundles the auth settings with the host bridges the core
//! needs. When the `desktop-shims` feature is enabled, desktop defaults for
//! `HttpClient`, `SecureStore` and `UrlLauncher` are injected automatically
//! if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AuthConfig, AuthMethod, CoreConfig, OAuthSettings};
//!
//! let auth = AuthConfig::builder()
//!     .preferred_method(AuthMethod::OAuth)
//!     .oauth(OAuthSettings {
//!         client_id: "cli-client".into(),
//!         authorization_endpoint: "https://auth.example.com/oauth/authorize".into(),
//!         token_endpoint: "https://auth.example.com/oauth/token".into(),
//!         ..OAuthSettings::default()
//!     })
//!     .build()?;
//!
//! let config = CoreConfig::builder().auth(auth).build()?;
//! ```
//!
//! ## Error Handling
//!
//! Every validation failure is an [`Error::Config`] whose message names the
//! offending field, so the CLI can print it verbatim.

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SecureStore, SystemClock, UrlLauncher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_ACCOUNT: &str = "default";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:54545/callback";

const MAX_REFRESH_THRESHOLD_SECS: u64 = 24 * 60 * 60;
const MAX_AUTH_TIMEOUT_SECS: u64 = 60 * 60;
const MAX_RETRY_ATTEMPTS: u32 = 10;

/// How the session proves its identity to the AI service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Static API key, never refreshed.
    ApiKey,
    /// OAuth2 authorization code grant, optionally with PKCE.
    #[serde(rename = "oauth")]
    OAuth,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::ApiKey => "api_key",
            AuthMethod::OAuth => "oauth",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization server settings for the OAuth path.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: String,
    /// Only confidential clients carry a secret; public CLI clients rely on PKCE.
    pub client_secret: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    /// Loopback URI the local callback listener binds to. Must carry an
    /// explicit port.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub response_type: String,
    pub use_pkce: bool,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: Vec::new(),
            response_type: "code".to_string(),
            use_pkce: true,
        }
    }
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("response_type", &self.response_type)
            .field("use_pkce", &self.use_pkce)
            .finish()
    }
}

impl OAuthSettings {
    /// Checks that the settings are complete enough to run an authorization.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config(
                "oauth.client_id is required for OAuth authentication".to_string(),
            ));
        }

        require_web_url("oauth.authorization_endpoint", &self.authorization_endpoint)?;
        require_web_url("oauth.token_endpoint", &self.token_endpoint)?;

        let redirect = require_web_url("oauth.redirect_uri", &self.redirect_uri)?;
        if redirect.host_str().is_none() || redirect.port().is_none() {
            return Err(Error::Config(format!(
                "oauth.redirect_uri must name a host and an explicit port \
                 (e.g. {}), got '{}'",
                DEFAULT_REDIRECT_URI, self.redirect_uri
            )));
        }

        if self.response_type.trim().is_empty() {
            return Err(Error::Config(
                "oauth.response_type cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Scopes joined the way the authorization endpoint expects them.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

fn require_web_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL ('{}'): {}", field, value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!(
            "{} must use http or https, got scheme '{}'",
            field, other
        ))),
    }
}

/// Authentication settings handed to the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Method used when `authenticate` is called without one.
    pub preferred_method: Option<AuthMethod>,
    pub oauth: OAuthSettings,
    /// Arm a background refresh timer for refreshable credentials.
    pub auto_refresh: bool,
    /// Refresh this many seconds before expiry.
    pub token_refresh_threshold_secs: u64,
    /// Retries (not attempts) for transient token endpoint failures.
    pub max_retry_attempts: u32,
    /// Environment variable holding a static API key.
    pub api_key_env_var: String,
    /// Logical account the credential is stored under.
    pub account: String,
    /// Upper bound on waiting for the browser redirect.
    pub auth_timeout_secs: u64,
    /// Upper bound on each token endpoint or validation request.
    pub request_timeout_secs: u64,
    /// When set, API keys are checked against this endpoint before use.
    pub api_key_validation_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            preferred_method: None,
            oauth: OAuthSettings::default(),
            auto_refresh: true,
            token_refresh_threshold_secs: 300,
            max_retry_attempts: 3,
            api_key_env_var: DEFAULT_API_KEY_ENV_VAR.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            auth_timeout_secs: 120,
            request_timeout_secs: 30,
            api_key_validation_url: None,
        }
    }
}

impl AuthConfig {
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// OAuth settings are checked when OAuth is the preferred method or a
    /// client id has been supplied; an API-key-only setup may leave them
    /// empty.
    pub fn validate(&self) -> Result<()> {
        if self.token_refresh_threshold_secs > MAX_REFRESH_THRESHOLD_SECS {
            return Err(Error::Config(format!(
                "token_refresh_threshold_secs exceeds maximum of {} seconds",
                MAX_REFRESH_THRESHOLD_SECS
            )));
        }

        if self.auth_timeout_secs == 0 || self.auth_timeout_secs > MAX_AUTH_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "auth_timeout_secs must be between 1 and {} seconds",
                MAX_AUTH_TIMEOUT_SECS
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(Error::Config(format!(
                "max_retry_attempts exceeds maximum of {}",
                MAX_RETRY_ATTEMPTS
            )));
        }

        if self.api_key_env_var.trim().is_empty() {
            return Err(Error::Config(
                "api_key_env_var cannot be empty".to_string(),
            ));
        }

        if self.account.trim().is_empty() {
            return Err(Error::Config("account cannot be empty".to_string()));
        }

        if let Some(url) = &self.api_key_validation_url {
            require_web_url("api_key_validation_url", url)?;
        }

        if self.preferred_method == Some(AuthMethod::OAuth) || !self.oauth.client_id.is_empty() {
            self.oauth.validate()?;
        }

        Ok(())
    }

    pub fn token_refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.token_refresh_threshold_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`AuthConfig`]. `build()` validates.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    pub fn preferred_method(mut self, method: AuthMethod) -> Self {
        self.config.preferred_method = Some(method);
        self
    }

    pub fn oauth(mut self, settings: OAuthSettings) -> Self {
        self.config.oauth = settings;
        self
    }

    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.config.auto_refresh = enabled;
        self
    }

    pub fn token_refresh_threshold_secs(mut self, secs: u64) -> Self {
        self.config.token_refresh_threshold_secs = secs;
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.max_retry_attempts = attempts;
        self
    }

    pub fn api_key_env_var(mut self, name: impl Into<String>) -> Self {
        self.config.api_key_env_var = name.into();
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.config.account = account.into();
        self
    }

    pub fn auth_timeout_secs(mut self, secs: u64) -> Self {
        self.config.auth_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn api_key_validation_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_key_validation_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<AuthConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Auth settings plus the host bridges the core runs on.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub auth: AuthConfig,

    /// HTTP client for token endpoints and AI service calls (optional with desktop default)
    pub http_client: Arc<dyn HttpClient>,

    /// Secure credential storage (optional with desktop default)
    pub secure_store: Arc<dyn SecureStore>,

    /// Browser launcher. Without one the authorization URL is only logged.
    pub url_launcher: Option<Arc<dyn UrlLauncher>>,

    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("auth", &self.auth)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field(
                "url_launcher",
                &self.url_launcher.as_ref().map(|_| "UrlLauncher { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for token exchange and API calls. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform HTTP adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
                 Tests: inject bridge_desktop::MemorySecureStore or a stub."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Config(format!("Failed to create default HTTP client: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_url_launcher() -> Option<Arc<dyn UrlLauncher>> {
    Some(Arc::new(bridge_desktop::SystemBrowserLauncher))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_url_launcher() -> Option<Arc<dyn UrlLauncher>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    auth: Option<AuthConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    url_launcher: Option<Arc<dyn UrlLauncher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn url_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.url_launcher = Some(launcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the auth settings are invalid
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and no
    ///   desktop default is compiled in
    pub fn build(self) -> Result<CoreConfig> {
        let auth = self.auth.unwrap_or_default();
        auth.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let url_launcher = self.url_launcher.or_else(provide_default_url_launcher);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(CoreConfig {
            auth,
            http_client,
            secure_store,
            url_launcher,
            clock,
        })
    }
}

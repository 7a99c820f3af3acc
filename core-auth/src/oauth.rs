//! # OAuth 2.0 Flow Engine
//!
//! Authorization Code grant with PKCE (S256) and the refresh-token grant.
//!
//! ## Authorization
//!
//! [`OAuthFlowManager::perform_oauth_flow`] runs one complete attempt:
//!
//! 1. generate a fresh state nonce and PKCE verifier
//! 2. start listening on the redirect URI
//! 3. send the browser to the authorization endpoint
//! 4. wait (bounded) for the redirect
//! 5. compare the returned state with the nonce, aborting on mismatch
//! 6. exchange the code at the token endpoint, retrying transient failures
//!
//! The state is checked before any request reaches the token endpoint.
//!
//! ## Refresh
//!
//! [`OAuthFlowManager::refresh_access_token`] is a single exchange. The
//! session manager owns the retry policy for refreshes. When the server
//! omits `refresh_token` the original one is kept.

use crate::callback::AuthorizationCallback;
use crate::error::{AuthError, Result};
use crate::pkce::{self, PkceVerifier, CHALLENGE_METHOD};
use crate::types::Credential;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::launcher::UrlLauncher;
use bridge_traits::time::Clock;
use core_async::resilience::{retry, with_timeout, RetryPolicy};
use core_runtime::config::OAuthSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grant errors that no amount of retrying will fix.
const TERMINAL_GRANT_ERRORS: &[&str] = &[
    "invalid_grant",
    "invalid_client",
    "unauthorized_client",
    "unsupported_grant_type",
];

/// Ephemeral parameters for one authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub verifier: Option<PkceVerifier>,
}

/// Runs authorization and refresh exchanges against one authorization server.
pub struct OAuthFlowManager {
    settings: OAuthSettings,
    http_client: Arc<dyn HttpClient>,
    callback: Arc<dyn AuthorizationCallback>,
    launcher: Option<Arc<dyn UrlLauncher>>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy<AuthError>,
    auth_timeout: Duration,
    request_timeout: Duration,
}

impl OAuthFlowManager {
    pub fn new(
        settings: OAuthSettings,
        http_client: Arc<dyn HttpClient>,
        callback: Arc<dyn AuthorizationCallback>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            http_client,
            callback,
            launcher: None,
            clock,
            retry_policy: default_retry_policy(3),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Policy used for the authorization code exchange.
    pub fn with_retry_policy(mut self, policy: RetryPolicy<AuthError>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// `auth_timeout` bounds the browser wait, `request_timeout` each exchange.
    pub fn with_timeouts(mut self, auth_timeout: Duration, request_timeout: Duration) -> Self {
        self.auth_timeout = auth_timeout;
        self.request_timeout = request_timeout;
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Builds the authorization URL with a fresh state nonce and, when
    /// enabled, a fresh PKCE verifier.
    #[instrument(skip(self), fields(client_id = %self.settings.client_id))]
    pub fn build_authorization_request(&self) -> Result<AuthorizationRequest> {
        let state = pkce::generate_state();
        let verifier = self.settings.use_pkce.then(PkceVerifier::new);

        let mut url = Url::parse(&self.settings.authorization_endpoint).map_err(|e| {
            AuthError::Configuration(format!("invalid authorization endpoint: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.settings.client_id);
            query.append_pair("redirect_uri", &self.settings.redirect_uri);
            query.append_pair("response_type", &self.settings.response_type);
            query.append_pair("state", &state);
            query.append_pair("scope", &self.settings.scope_string());
            if let Some(verifier) = &verifier {
                query.append_pair("code_challenge", &verifier.challenge());
                query.append_pair("code_challenge_method", CHALLENGE_METHOD);
            }
        }

        debug!(pkce = verifier.is_some(), "Built authorization URL");

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
            verifier,
        })
    }

    /// Runs one complete authorization attempt and returns the new credential.
    #[instrument(skip(self), fields(client_id = %self.settings.client_id))]
    pub async fn perform_oauth_flow(&self) -> Result<Credential> {
        let request = self.build_authorization_request()?;

        let pending = self.callback.listen(&self.settings.redirect_uri).await?;
        self.open_browser(&request.url).await;

        let params = pending.wait(self.auth_timeout).await?;

        if params.state != request.state {
            warn!("OAuth state mismatch in callback; aborting before token exchange");
            return Err(AuthError::StateMismatch);
        }

        self.exchange_code(&params.code, request.verifier.as_ref())
            .await
    }

    /// Exchanges an authorization code for a credential.
    ///
    /// Transient failures are retried with the configured policy; each
    /// attempt is bounded by the request timeout.
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<&PkceVerifier>,
    ) -> Result<Credential> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("client_id", self.settings.client_id.as_str()),
        ];
        if let Some(verifier) = verifier {
            params.push(("code_verifier", verifier.verifier()));
        }
        if let Some(secret) = &self.settings.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        let body = encode_form(&params)?;

        debug!("Exchanging authorization code for tokens");

        let token = retry(&self.retry_policy, || self.post_token(body.clone()))
            .await
            .map_err(|e| e.during("Token exchange"))?;

        info!(
            expires_in = token.expires_in,
            has_refresh_token = token.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );

        Ok(token.into_credential(None, self.clock.unix_timestamp()))
    }

    /// Exchanges a refresh token for a new credential. Single attempt.
    ///
    /// The returned credential keeps `refresh_token` when the server does not
    /// rotate it.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<Credential> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
        ];
        if let Some(secret) = &self.settings.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        let body = encode_form(&params)?;

        debug!("Refreshing access token");

        let token = self
            .post_token(body)
            .await
            .map_err(|e| e.during("Token refresh"))?;

        info!(
            expires_in = token.expires_in,
            rotated = token.refresh_token.is_some(),
            "Refreshed access token"
        );

        Ok(token.into_credential(Some(refresh_token), self.clock.unix_timestamp()))
    }

    async fn post_token(&self, body: String) -> Result<TokenResponse> {
        let request = HttpRequest::new(HttpMethod::Post, self.settings.token_endpoint.clone())
            .header("Accept", "application/json")
            .form_encoded(body)
            .timeout(self.request_timeout);

        let response = with_timeout(self.request_timeout, async {
            self.http_client
                .execute(request)
                .await
                .map_err(AuthError::from)
        })
        .await?;

        parse_token_response(&response)
    }

    async fn open_browser(&self, url: &str) {
        match &self.launcher {
            Some(launcher) => {
                if let Err(e) = launcher.open_url(url).await {
                    warn!(error = %e, %url, "Could not open a browser; open the URL manually");
                } else {
                    info!("Opened browser for authorization");
                }
            }
            None => warn!(%url, "Open this URL in a browser to authorize"),
        }
    }
}

/// Default policy for token endpoint exchanges: transient failures only.
pub fn default_retry_policy(max_retries: u32) -> RetryPolicy<AuthError> {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
        .retry_if(AuthError::is_retryable)
        .on_retry(|error, attempt| {
            warn!(attempt, error = %error, "Token endpoint call failed, retrying");
        })
}

fn encode_form(params: &[(&str, &str)]) -> Result<String> {
    serde_urlencoded::to_string(params)
        .map_err(|e| AuthError::Configuration(format!("cannot encode token request: {e}")))
}

/// JSON body returned by the token endpoint.
#[derive(Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

impl TokenResponse {
    fn into_credential(self, previous_refresh_token: Option<&str>, now: i64) -> Credential {
        let refresh_token = self
            .refresh_token
            .filter(|token| !token.is_empty())
            .or_else(|| previous_refresh_token.map(str::to_string));
        Credential::from_token_response(
            self.access_token,
            refresh_token,
            self.expires_in,
            self.token_type,
            self.scope,
            now,
        )
    }
}

/// Standard OAuth error body (RFC 6749 §5.2).
#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Maps a token endpoint response to a token or a classified error.
///
/// Raw bodies are never copied into errors; only the standard `error` code
/// and description are kept.
fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
    if response.is_success() {
        return response.json::<TokenResponse>().map_err(|e| {
            warn!(error = %e, "Token endpoint returned an unreadable body");
            AuthError::Authentication("token endpoint returned a malformed response".to_string())
        });
    }

    let status = response.status;
    let body = response.json::<TokenErrorBody>().unwrap_or_default();
    let message = match (&body.error, &body.error_description) {
        (code, Some(description)) if !code.is_empty() => format!("{code}: {description}"),
        (code, _) if !code.is_empty() => code.clone(),
        _ => format!("HTTP {status}"),
    };

    warn!(status, error = %body.error, "Token endpoint rejected request");

    if response.is_client_error() && TERMINAL_GRANT_ERRORS.contains(&body.error.as_str()) {
        return Err(AuthError::InvalidGrant(message));
    }

    Err(AuthError::TokenEndpoint { status, message })
}

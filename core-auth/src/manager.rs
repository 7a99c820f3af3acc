//! # Session Lifecycle Manager
//!
//! The public face of authentication. A [`SessionManager`] owns the
//! authentication state machine, picks between API-key and OAuth
//! authentication, persists the credential, keeps OAuth credentials fresh
//! with a background refresh timer, and hands authorization headers to
//! outbound callers.
//!
//! ## Concurrency
//!
//! Every operation that reads and then writes the credential/state pair
//! runs under one async mutex, so `authenticate`, `refresh_token`,
//! `initialize` and `logout` never interleave. The state and the credential
//! live behind a single lock and always change together: no reader sees
//! `Authenticated` without a credential.
//!
//! ## Events
//!
//! Listeners registered with [`SessionManager::on`] receive
//! [`AuthEvent`]s synchronously after each change. A panicking listener is
//! isolated by the event bus and cannot disturb the manager.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthEvent, SessionManager};
//! use core_runtime::config::AuthConfig;
//! use std::sync::Arc;
//! # use bridge_traits::{HttpClient, SecureStore};
//! # async fn example(
//! #     store: Arc<dyn SecureStore>,
//! #     http: Arc<dyn HttpClient>,
//! # ) -> core_auth::Result<()> {
//! let manager = SessionManager::builder(AuthConfig::default())
//!     .secure_store(store)
//!     .http_client(http)
//!     .build()?;
//!
//! manager.on(AuthEvent::ERROR, |event| eprintln!("{:?}", event));
//! manager.initialize().await?;
//!
//! if !manager.is_authenticated() {
//!     let outcome = manager.authenticate(None).await;
//!     if let Some(message) = outcome.user_message() {
//!         eprintln!("{message}");
//!     }
//! }
//!
//! let header = manager.fresh_authorization_header().await?;
//! # Ok(())
//! # }
//! ```

use crate::api_key;
use crate::callback::{AuthorizationCallback, LocalCallbackServer};
use crate::error::{AuthError, Result};
use crate::oauth::{default_retry_policy, OAuthFlowManager};
use crate::scheduler::RefreshScheduler;
use crate::token_store::{StoredCredential, TokenStore};
use crate::types::{AuthEvent, AuthMethod, AuthOutcome, AuthState, Credential, TokenDetails};
use bridge_traits::http::HttpClient;
use bridge_traits::launcher::UrlLauncher;
use bridge_traits::storage::SecureStore;
use bridge_traits::time::{Clock, SystemClock};
use core_async::resilience::{retry, with_timeout, RetryPolicy};
use core_runtime::config::AuthConfig;
use core_runtime::events::{EventBus, SubscriptionId};
use std::sync::{Arc, RwLock, RwLockReadGuard, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default)]
struct Session {
    state: AuthState,
    credential: Option<Credential>,
    method: Option<AuthMethod>,
    ever_established: bool,
}

enum CredentialUpdate {
    Keep,
    Set(Credential, AuthMethod),
    /// Holds a credential that has not been confirmed usable yet.
    Stage(Credential, AuthMethod),
    Clear,
}

struct Inner {
    config: AuthConfig,
    token_store: TokenStore,
    oauth: Option<OAuthFlowManager>,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    events: EventBus<AuthEvent>,
    refresh_policy: RetryPolicy<AuthError>,
    validation_policy: RetryPolicy<AuthError>,
    session: RwLock<Session>,
    op_lock: Mutex<()>,
    scheduler: RefreshScheduler,
}

/// Handle to one authentication session. Cloning shares the session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn builder(config: AuthConfig) -> SessionManagerBuilder {
        SessionManagerBuilder::new(config)
    }

    /// Loads a persisted credential, if any, and resumes the session.
    ///
    /// A credential inside the refresh threshold is refreshed inline; if
    /// that fails the credential is discarded and the manager stays in
    /// `Initial`. An expired credential that cannot be refreshed is
    /// discarded.
    #[instrument(skip(self), fields(account = %self.inner.config.account))]
    pub async fn initialize(&self) -> Result<AuthState> {
        let _guard = self.inner.op_lock.lock().await;
        self.inner.scheduler.cancel();

        let record = match self.inner.token_store.get(&self.inner.config.account).await {
            Ok(record) => record,
            Err(err @ AuthError::TokenCorrupted { .. }) => {
                self.emit_error(&err, true);
                None
            }
            Err(err) => return Err(err),
        };

        let Some(StoredCredential { credential, method }) = record else {
            debug!("No persisted credential");
            return Ok(self.state());
        };

        let now = self.now();
        let threshold = self.threshold_secs();

        if !credential.is_near_expiry(threshold, now) {
            info!(method = %method, "Restored persisted credential");
            self.apply(AuthState::Authenticated, CredentialUpdate::Set(credential.clone(), method));
            self.schedule_refresh(&credential);
            return Ok(AuthState::Authenticated);
        }

        if credential.is_refreshable() {
            info!("Persisted credential is near expiry; refreshing");
            self.apply(AuthState::Refreshing, CredentialUpdate::Stage(credential.clone(), method));

            match self.refresh_with_retry(&credential).await {
                Ok(fresh) => {
                    self.persist_refreshed(&fresh, method).await;
                    self.apply(AuthState::Authenticated, CredentialUpdate::Set(fresh.clone(), method));
                    self.emit(AuthEvent::TokenRefreshed {
                        expires_at: fresh.expires_at,
                    });
                    self.schedule_refresh(&fresh);
                    Ok(AuthState::Authenticated)
                }
                Err(err) => {
                    warn!(error = %err, "Inline refresh failed; discarding persisted credential");
                    self.discard_persisted().await;
                    self.apply(AuthState::Initial, CredentialUpdate::Clear);
                    self.emit_error(&err, true);
                    Ok(AuthState::Initial)
                }
            }
        } else if credential.is_expired(now) {
            info!("Persisted credential expired and cannot be refreshed; discarding");
            self.discard_persisted().await;
            Ok(self.state())
        } else {
            self.apply(AuthState::Authenticated, CredentialUpdate::Set(credential, method));
            Ok(AuthState::Authenticated)
        }
    }

    /// Authenticates with `method`, or the configured/preferred method.
    ///
    /// Never returns an error: failures are reported in the outcome, and the
    /// manager is left in `Failed` once the attempt has started. Local
    /// validation failures (missing or malformed API key, OAuth not
    /// configured) leave the state untouched.
    #[instrument(skip(self))]
    pub async fn authenticate(&self, method: Option<AuthMethod>) -> AuthOutcome {
        let _guard = self.inner.op_lock.lock().await;
        // The environment is read once per attempt; the same value decides
        // the method and becomes the credential.
        let env_key = self.read_api_key();
        let method = self.resolve_method(method, env_key.as_deref().ok());
        info!(method = %method, "Authenticating");

        match method {
            AuthMethod::ApiKey => {
                let key = match env_key {
                    Ok(key) => key,
                    Err(err) => return self.rejected(method, err),
                };
                self.authenticate_api_key_locked(&key).await
            }
            AuthMethod::OAuth => self.authenticate_oauth_locked().await,
        }
    }

    /// Authenticates with an explicitly supplied API key.
    #[instrument(skip(self, key))]
    pub async fn authenticate_with_api_key(&self, key: &str) -> AuthOutcome {
        let _guard = self.inner.op_lock.lock().await;
        self.authenticate_api_key_locked(key).await
    }

    /// Ends the session: cancels the refresh timer, forgets the credential
    /// and deletes the persisted record. Calling it again is harmless and
    /// emits nothing.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.inner.op_lock.lock().await;
        self.inner.scheduler.cancel();

        let had_session = {
            let session = self.read_session();
            session.credential.is_some() || session.state != AuthState::Initial
        };

        self.apply(AuthState::Initial, CredentialUpdate::Clear);
        if had_session {
            info!("Logged out");
            self.emit(AuthEvent::LoggedOut);
        }

        self.inner
            .token_store
            .delete(&self.inner.config.account)
            .await
    }

    /// Refreshes the OAuth credential.
    ///
    /// Returns `Ok(false)` when there is nothing to refresh. Transient
    /// failures are retried; once the refresh finally fails the credential
    /// is deleted, the manager moves to `Failed` and an `error` event is
    /// emitted.
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> Result<bool> {
        let _guard = self.inner.op_lock.lock().await;
        self.refresh_locked().await
    }

    /// Authorization header for the current credential, refreshing first
    /// when it is inside the refresh threshold.
    pub async fn fresh_authorization_header(&self) -> Result<Option<String>> {
        if self.needs_refresh() {
            let _guard = self.inner.op_lock.lock().await;
            if self.needs_refresh() {
                self.refresh_locked().await?;
            }
        }
        Ok(self.authorization_header())
    }

    /// True iff the state is `Authenticated` and a credential is held.
    pub fn is_authenticated(&self) -> bool {
        let session = self.read_session();
        session.state == AuthState::Authenticated && session.credential.is_some()
    }

    /// `"{token_type} {access_token}"`, or `None` without a usable credential.
    pub fn authorization_header(&self) -> Option<String> {
        let session = self.read_session();
        match session.state {
            AuthState::Authenticated | AuthState::Refreshing => session
                .credential
                .as_ref()
                .map(Credential::authorization_header),
            _ => None,
        }
    }

    /// Masked token information for display.
    pub fn token_details(&self) -> Option<TokenDetails> {
        let session = self.read_session();
        let credential = session.credential.as_ref()?;
        let method = session.method?;
        Some(TokenDetails::new(credential, method, self.now()))
    }

    /// The method of the held credential.
    pub fn method(&self) -> Option<AuthMethod> {
        self.read_session().method
    }

    /// Internal state.
    pub fn state(&self) -> AuthState {
        self.read_session().state
    }

    /// State as reported to collaborators: `Unauthenticated` until a
    /// credential has been established at least once.
    pub fn status(&self) -> AuthState {
        let session = self.read_session();
        if session.state == AuthState::Initial && !session.ever_established {
            AuthState::Unauthenticated
        } else {
            session.state
        }
    }

    /// Whether a background refresh is armed.
    pub fn refresh_pending(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    pub fn on<F>(&self, event: &'static str, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(event, listener)
    }

    pub fn on_any<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.events.on_any(listener)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.off(id)
    }

    /// Stops background work. The session itself is left as is.
    pub fn shutdown(&self) {
        if self.inner.scheduler.cancel() {
            debug!("Refresh timer cancelled on shutdown");
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    async fn authenticate_api_key_locked(&self, raw_key: &str) -> AuthOutcome {
        let method = AuthMethod::ApiKey;
        let key = match api_key::validate_format(raw_key) {
            Ok(key) => key.to_string(),
            Err(err) => return self.rejected(method, err),
        };

        self.apply(AuthState::Authenticating, CredentialUpdate::Keep);

        if let Some(url) = self.inner.config.api_key_validation_url.as_deref() {
            let timeout = self.inner.config.request_timeout();
            let checked = retry(&self.inner.validation_policy, || {
                with_timeout(
                    timeout,
                    api_key::validate_remote(self.inner.http_client.as_ref(), url, &key, timeout),
                )
            })
            .await;
            if let Err(err) = checked {
                return self.failed(method, err.during("API key validation"));
            }
        }

        self.establish(Credential::api_key(key), method).await
    }

    async fn authenticate_oauth_locked(&self) -> AuthOutcome {
        let method = AuthMethod::OAuth;
        let Some(oauth) = self.inner.oauth.as_ref() else {
            return self.rejected(
                method,
                AuthError::Configuration("OAuth is not configured (missing client_id)".to_string()),
            );
        };

        self.apply(AuthState::Authenticating, CredentialUpdate::Keep);

        match oauth.perform_oauth_flow().await {
            Ok(credential) => self.establish(credential, method).await,
            Err(err) => self.failed(method, err),
        }
    }

    /// Persists a new credential and moves to `Authenticated`.
    async fn establish(&self, credential: Credential, method: AuthMethod) -> AuthOutcome {
        if let Err(err) = self
            .inner
            .token_store
            .save(&self.inner.config.account, &credential, method)
            .await
        {
            return self.failed(method, err);
        }

        self.apply(
            AuthState::Authenticated,
            CredentialUpdate::Set(credential.clone(), method),
        );
        self.schedule_refresh(&credential);
        self.emit(AuthEvent::LoggedIn { method });
        info!(method = %method, refreshable = credential.is_refreshable(), "Authenticated");

        AuthOutcome::succeeded(method, &credential)
    }

    /// Attempt failed after it started: move to `Failed`.
    fn failed(&self, method: AuthMethod, err: AuthError) -> AuthOutcome {
        error!(method = %method, error = %err, "Authentication failed");
        self.inner.scheduler.cancel();
        self.apply(AuthState::Failed, CredentialUpdate::Clear);
        self.emit_error(&err, true);
        AuthOutcome::failed(method, err)
    }

    /// Attempt refused before it started: state is untouched.
    fn rejected(&self, method: AuthMethod, err: AuthError) -> AuthOutcome {
        warn!(method = %method, error = %err, "Authentication rejected");
        self.emit_error(&err, true);
        let mut outcome = AuthOutcome::failed(method, err);
        outcome.state = self.state();
        outcome
    }

    async fn refresh_locked(&self) -> Result<bool> {
        let (credential, method) = {
            let session = self.read_session();
            match (&session.credential, session.method) {
                (Some(credential), Some(method)) if has_refresh_token(credential) => {
                    (credential.clone(), method)
                }
                _ => {
                    debug!("No refresh token; nothing to refresh");
                    return Ok(false);
                }
            }
        };

        self.apply(AuthState::Refreshing, CredentialUpdate::Keep);

        match self.refresh_with_retry(&credential).await {
            Ok(fresh) => {
                self.persist_refreshed(&fresh, method).await;
                self.apply(
                    AuthState::Authenticated,
                    CredentialUpdate::Set(fresh.clone(), method),
                );
                self.emit(AuthEvent::TokenRefreshed {
                    expires_at: fresh.expires_at,
                });
                self.schedule_refresh(&fresh);
                Ok(true)
            }
            Err(err) => {
                error!(error = %err, "Token refresh failed; session ended");
                self.inner.scheduler.cancel();
                self.discard_persisted().await;
                self.apply(AuthState::Failed, CredentialUpdate::Clear);
                self.emit_error(&err, err.is_retryable());
                Err(err)
            }
        }
    }

    async fn refresh_with_retry(&self, credential: &Credential) -> Result<Credential> {
        let oauth = self.inner.oauth.as_ref().ok_or_else(|| {
            AuthError::Configuration("OAuth is not configured (missing client_id)".to_string())
        })?;
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::NoRefreshToken)?;

        retry(&self.inner.refresh_policy, || {
            oauth.refresh_access_token(refresh_token)
        })
        .await
    }

    /// A refreshed credential that cannot be persisted still serves this
    /// process; the failure is reported but not fatal.
    async fn persist_refreshed(&self, credential: &Credential, method: AuthMethod) {
        if let Err(err) = self
            .inner
            .token_store
            .save(&self.inner.config.account, credential, method)
            .await
        {
            warn!(error = %err, "Could not persist refreshed credential");
            self.emit_error(&err, true);
        }
    }

    async fn discard_persisted(&self) {
        if let Err(err) = self
            .inner
            .token_store
            .delete(&self.inner.config.account)
            .await
        {
            warn!(error = %err, "Could not delete persisted credential");
        }
    }

    fn schedule_refresh(&self, credential: &Credential) {
        if !self.inner.config.auto_refresh || !credential.is_refreshable() {
            self.inner.scheduler.cancel();
            return;
        }

        let lead = credential.expires_at - self.now() - self.threshold_secs();
        let delay = Duration::from_secs(lead.max(0) as u64);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        self.inner.scheduler.schedule(delay, move || async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = SessionManager { inner };
            if let Err(err) = manager.refresh_token().await {
                warn!(error = %err, "Scheduled token refresh failed");
            }
        });
        info!(refresh_in_secs = delay.as_secs(), "Scheduled token refresh");
    }

    fn needs_refresh(&self) -> bool {
        let session = self.read_session();
        session.state == AuthState::Authenticated
            && session.credential.as_ref().is_some_and(|credential| {
                credential.is_refreshable()
                    && credential.is_near_expiry(self.threshold_secs(), self.now())
            })
    }

    /// Explicit argument, then configuration, then a present API key, then OAuth.
    fn resolve_method(&self, explicit: Option<AuthMethod>, env_key: Option<&str>) -> AuthMethod {
        explicit
            .or(self.inner.config.preferred_method)
            .unwrap_or(if env_key.is_some() {
                AuthMethod::ApiKey
            } else {
                AuthMethod::OAuth
            })
    }

    fn read_api_key(&self) -> Result<String> {
        let var = &self.inner.config.api_key_env_var;
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(AuthError::Validation(format!(
                "no API key found in environment variable {var}"
            ))),
        }
    }

    /// Updates state and credential together, then announces the change.
    fn apply(&self, to: AuthState, update: CredentialUpdate) {
        let from = {
            let mut session = self
                .inner
                .session
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let from = session.state;
            match update {
                CredentialUpdate::Keep => {}
                CredentialUpdate::Set(credential, method) => {
                    session.credential = Some(credential);
                    session.method = Some(method);
                    session.ever_established = true;
                }
                CredentialUpdate::Stage(credential, method) => {
                    session.credential = Some(credential);
                    session.method = Some(method);
                }
                CredentialUpdate::Clear => {
                    session.credential = None;
                    session.method = None;
                }
            }
            session.state = to;
            from
        };

        if from != to {
            debug!(%from, %to, "Auth state changed");
            self.emit(AuthEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: AuthEvent) {
        self.inner.events.emit(&event);
    }

    fn emit_error(&self, err: &AuthError, recoverable: bool) {
        self.emit(AuthEvent::Error {
            message: err.user_message(),
            recoverable,
        });
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn now(&self) -> i64 {
        self.inner.clock.unix_timestamp()
    }

    fn threshold_secs(&self) -> i64 {
        self.inner.config.token_refresh_threshold_secs as i64
    }
}

fn has_refresh_token(credential: &Credential) -> bool {
    credential
        .refresh_token
        .as_deref()
        .is_some_and(|token| !token.is_empty())
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("account", &self.inner.config.account)
            .field("state", &self.state())
            .field("refresh_pending", &self.refresh_pending())
            .finish()
    }
}

/// Assembles a [`SessionManager`] from configuration and bridges.
pub struct SessionManagerBuilder {
    config: AuthConfig,
    secure_store: Option<Arc<dyn SecureStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    url_launcher: Option<Arc<dyn UrlLauncher>>,
    callback: Option<Arc<dyn AuthorizationCallback>>,
    clock: Option<Arc<dyn Clock>>,
    retry_policy: Option<RetryPolicy<AuthError>>,
}

impl SessionManagerBuilder {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            secure_store: None,
            http_client: None,
            url_launcher: None,
            callback: None,
            clock: None,
            retry_policy: None,
        }
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn url_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.url_launcher = Some(launcher);
        self
    }

    /// Replaces the loopback listener used to receive the OAuth redirect.
    pub fn authorization_callback(mut self, callback: Arc<dyn AuthorizationCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the retry policy used for token exchanges, refreshes and
    /// API key validation. Only transient errors are ever retried.
    pub fn retry_policy(mut self, policy: RetryPolicy<AuthError>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<SessionManager> {
        self.config
            .validate()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        let secure_store = self.secure_store.ok_or_else(|| {
            AuthError::Configuration("a secure store is required".to_string())
        })?;
        let http_client = self.http_client.ok_or_else(|| {
            AuthError::Configuration("an HTTP client is required".to_string())
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let callback = self
            .callback
            .unwrap_or_else(|| Arc::new(LocalCallbackServer::new()));

        let policy = self
            .retry_policy
            .unwrap_or_else(|| default_retry_policy(self.config.max_retry_attempts))
            .retry_if(AuthError::is_retryable);

        let oauth = if self.config.oauth.client_id.trim().is_empty() {
            None
        } else {
            let mut flow = OAuthFlowManager::new(
                self.config.oauth.clone(),
                Arc::clone(&http_client),
                callback,
                Arc::clone(&clock),
            )
            .with_timeouts(self.config.auth_timeout(), self.config.request_timeout())
            .with_retry_policy(policy.clone());
            if let Some(launcher) = self.url_launcher {
                flow = flow.with_launcher(launcher);
            }
            Some(flow)
        };

        debug!(
            account = %self.config.account,
            oauth = oauth.is_some(),
            "Session manager built"
        );

        Ok(SessionManager {
            inner: Arc::new(Inner {
                token_store: TokenStore::new(secure_store),
                oauth,
                http_client,
                clock,
                events: EventBus::new(),
                refresh_policy: policy.clone(),
                validation_policy: policy,
                session: RwLock::new(Session::default()),
                op_lock: Mutex::new(()),
                scheduler: RefreshScheduler::new(),
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::MemorySecureStore;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use std::sync::Mutex as StdMutex;

    struct OfflineHttpClient;

    #[async_trait]
    impl HttpClient for OfflineHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    fn manager(config: AuthConfig) -> SessionManager {
        SessionManager::builder(config)
            .secure_store(Arc::new(MemorySecureStore::new()))
            .http_client(Arc::new(OfflineHttpClient))
            .build()
            .unwrap()
    }

    fn api_key_config(env_var: &str) -> AuthConfig {
        AuthConfig {
            api_key_env_var: env_var.to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_builder_requires_bridges() {
        let err = SessionManager::builder(AuthConfig::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = AuthConfig {
            preferred_method: Some(AuthMethod::OAuth),
            ..AuthConfig::default()
        };
        let err = SessionManager::builder(config)
            .secure_store(Arc::new(MemorySecureStore::new()))
            .http_client(Arc::new(OfflineHttpClient))
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_starts_unauthenticated() {
        let manager = manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        assert_eq!(manager.state(), AuthState::Initial);
        assert_eq!(manager.status(), AuthState::Unauthenticated);
        assert!(!manager.is_authenticated());
        assert!(manager.authorization_header().is_none());
        assert!(manager.token_details().is_none());
        assert_eq!(manager.initialize().await.unwrap(), AuthState::Initial);
    }

    #[tokio::test]
    async fn test_explicit_api_key_login() {
        let manager = manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        let states = Arc::new(StdMutex::new(Vec::new()));
        let recorder = Arc::clone(&states);
        manager.on(AuthEvent::STATE_CHANGED, move |event| {
            if let AuthEvent::StateChanged { to, .. } = event {
                recorder.lock().unwrap().push(*to);
            }
        });

        let outcome = manager
            .authenticate_with_api_key("sk-ant-REDACTED")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, AuthState::Authenticated);
        assert!(manager.is_authenticated());
        assert_eq!(
            manager.authorization_header().as_deref(),
            Some("Bearer sk-ant-REDACTED")
        );
        assert!(!manager.refresh_pending());
        assert_eq!(
            *states.lock().unwrap(),
            vec![AuthState::Authenticating, AuthState::Authenticated]
        );
        assert_eq!(manager.status(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_missing_env_key_leaves_state_alone() {
        let manager = manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        let outcome = manager.authenticate(Some(AuthMethod::ApiKey)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state, AuthState::Initial);
        assert!(matches!(outcome.error, Some(AuthError::Validation(_))));
        assert_eq!(manager.state(), AuthState::Initial);
    }

    #[tokio::test]
    async fn test_oauth_without_client_id_is_rejected() {
        let manager = manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        let outcome = manager.authenticate(Some(AuthMethod::OAuth)).await;

        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(AuthError::Configuration(_))));
        assert_eq!(manager.state(), AuthState::Initial);
    }

    #[tokio::test]
    async fn test_refresh_without_credential_is_noop() {
        let manager = manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        assert!(!manager.refresh_token().await.unwrap());

        manager
            .authenticate_with_api_key("sk-ant-REDACTED")
            .await;
        assert!(!manager.refresh_token().await.unwrap());
        assert!(manager.is_authenticated());
    }

    #[test]
    fn test_method_resolution_prefers_explicit_then_config() {
        let mut config = api_key_config("CORE_AUTH_UNIT_UNSET_KEY");
        config.preferred_method = Some(AuthMethod::ApiKey);
        let manager = manager(config);

        assert_eq!(
            manager.resolve_method(Some(AuthMethod::OAuth), None),
            AuthMethod::OAuth
        );
        assert_eq!(manager.resolve_method(None, None), AuthMethod::ApiKey);

        let fallback = self::manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        assert_eq!(fallback.resolve_method(None, None), AuthMethod::OAuth);
    }

    #[test]
    fn test_method_resolution_uses_the_key_already_read() {
        // The variable is unset; only the value handed in can pick ApiKey.
        let manager = manager(api_key_config("CORE_AUTH_UNIT_UNSET_KEY"));
        assert_eq!(
            manager.resolve_method(None, Some("sk-ant-REDACTED")),
            AuthMethod::ApiKey
        );
        assert_eq!(
            manager.resolve_method(Some(AuthMethod::OAuth), Some("sk-ant-REDACTED")),
            AuthMethod::OAuth
        );
    }
}

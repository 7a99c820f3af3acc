//! Test doubles shared by the session lifecycle tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::MemorySecureStore;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::launcher::UrlLauncher;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_async::resilience::RetryPolicy;
use core_auth::{
    AuthError, AuthEvent, AuthMethod, AuthorizationCallback, CallbackParams, Credential,
    PendingCallback, SessionManager, TokenStore,
};
use core_runtime::config::{AuthConfig, OAuthSettings};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const NOW: i64 = 1_750_000_000;
pub const TOKEN_ENDPOINT: &str = "https://auth.example.test/oauth/token";
pub const VALID_KEY: &str = "sk-ant-REDACTED";

mockall::mock! {
    pub Time {}

    impl Clock for Time {
        fn now(&self) -> DateTime<Utc>;
    }
}

/// Clock pinned to a settable Unix timestamp.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(now: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
        })
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.now.load(Ordering::SeqCst), 0).unwrap()
    }
}

/// HTTP client replaying scripted responses and recording every request.
#[derive(Default)]
pub struct StubHttpClient {
    responses: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: BridgeResult<HttpResponse>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn push_token(&self, json: &str) -> &Self {
        self.push(Ok(HttpResponse::new(200, json.to_string())))
    }

    pub fn push_status(&self, status: u16, body: &str) -> &Self {
        self.push(Ok(HttpResponse::new(status, body.to_string())))
    }

    /// Requests sent to the token endpoint.
    pub fn token_calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url == TOKEN_ENDPOINT)
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn form(&self, index: usize) -> Vec<(String, String)> {
        let request = self.requests.lock().unwrap()[index].clone();
        serde_urlencoded::from_bytes(&request.body.unwrap()).unwrap()
    }
}

#[async_trait]
impl HttpClient for StubHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BridgeError::OperationFailed("unscripted request".into())))
    }
}

#[derive(Default)]
struct BrowserState {
    opened: Mutex<Vec<String>>,
    forged_state: Mutex<Option<String>>,
}

/// Browser plus redirect in one: remembers the launched authorization URL
/// and answers the callback wait with a code and that URL's state (or a
/// forged one).
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<BrowserState>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forge_state(&self, state: &str) {
        *self.state.forged_state.lock().unwrap() = Some(state.to_string());
    }

    pub fn honest(&self) {
        *self.state.forged_state.lock().unwrap() = None;
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlLauncher for FakeBrowser {
    async fn open_url(&self, url: &str) -> BridgeResult<()> {
        self.state.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

struct FakePending {
    state: Arc<BrowserState>,
}

#[async_trait]
impl AuthorizationCallback for FakeBrowser {
    async fn listen(&self, _redirect_uri: &str) -> core_auth::Result<Box<dyn PendingCallback>> {
        Ok(Box::new(FakePending {
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl PendingCallback for FakePending {
    async fn wait(self: Box<Self>, limit: Duration) -> core_auth::Result<CallbackParams> {
        let Some(url) = self.state.opened.lock().unwrap().last().cloned() else {
            return Err(AuthError::Timeout {
                operation: "Waiting for browser authorization".to_string(),
                seconds: limit.as_secs(),
            });
        };
        let sent_state = Url::parse(&url)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        let state = self
            .state
            .forged_state
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(sent_state);
        Ok(CallbackParams {
            code: "test-auth-code".to_string(),
            state,
        })
    }
}

/// Event log fed by an `on_any` listener.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<AuthEvent>>>,
}

impl EventLog {
    pub fn attach(manager: &SessionManager) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        manager.on_any(move |event| sink.lock().unwrap().push(event.clone()));
        log
    }

    pub fn all(&self) -> Vec<AuthEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        use core_runtime::events::Event;
        self.all().iter().map(|event| event.name()).collect()
    }

    pub fn errors(&self) -> Vec<(String, bool)> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                AuthEvent::Error {
                    message,
                    recoverable,
                } => Some((message, recoverable)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

pub fn oauth_settings() -> OAuthSettings {
    OAuthSettings {
        client_id: "test-client".to_string(),
        authorization_endpoint: "https://auth.example.test/oauth/authorize".to_string(),
        token_endpoint: TOKEN_ENDPOINT.to_string(),
        scopes: vec!["user:inference".to_string()],
        ..OAuthSettings::default()
    }
}

/// Config whose API key variable is unique to the calling test.
pub fn config(api_key_env_var: &str) -> AuthConfig {
    AuthConfig {
        oauth: oauth_settings(),
        api_key_env_var: api_key_env_var.to_string(),
        token_refresh_threshold_secs: 300,
        ..AuthConfig::default()
    }
}

pub fn fast_retries(max_retries: u32) -> RetryPolicy<AuthError> {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

pub struct Harness {
    pub manager: SessionManager,
    pub store: Arc<MemorySecureStore>,
    pub http: Arc<StubHttpClient>,
    pub browser: FakeBrowser,
    pub clock: Arc<ManualClock>,
    pub events: EventLog,
}

impl Harness {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_store(config, Arc::new(MemorySecureStore::new()))
    }

    pub fn with_store(config: AuthConfig, store: Arc<MemorySecureStore>) -> Self {
        let http = StubHttpClient::new();
        let browser = FakeBrowser::new();
        let clock = ManualClock::at(NOW);

        let manager = SessionManager::builder(config)
            .secure_store(store.clone())
            .http_client(http.clone())
            .url_launcher(Arc::new(browser.clone()))
            .authorization_callback(Arc::new(browser.clone()))
            .clock(clock.clone())
            .retry_policy(fast_retries(2))
            .build()
            .expect("valid test configuration");
        let events = EventLog::attach(&manager);

        Self {
            manager,
            store,
            http,
            browser,
            clock,
            events,
        }
    }

    pub fn token_store(&self) -> TokenStore {
        TokenStore::new(self.store.clone())
    }

    pub async fn persist(&self, credential: &Credential, method: AuthMethod) {
        self.token_store()
            .save(&self.manager.config().account, credential, method)
            .await
            .unwrap();
    }

    pub async fn persisted(&self) -> Option<Credential> {
        self.token_store()
            .get(&self.manager.config().account)
            .await
            .unwrap()
            .map(|record| record.credential)
    }
}

pub fn oauth_credential(access: &str, refresh: &str, expires_at: i64) -> Credential {
    Credential {
        id: Some("stored".to_string()),
        access_token: access.to_string(),
        refresh_token: Some(refresh.to_string()),
        expires_at,
        token_type: "Bearer".to_string(),
        scope: "user:inference".to_string(),
    }
}

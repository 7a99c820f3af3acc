//! # Authorized Transport
//!
//! Outbound requests to the AI service go through [`AuthorizedTransport`]:
//!
//! 1. The session's authorization header is attached (refreshing first when
//!    the credential is inside the refresh threshold).
//! 2. Each attempt runs under the request timeout, and transport failures
//!    plus 408/429/5xx answers are retried with the shared backoff policy.
//! 3. A 401 on a refreshable session forces one refresh and replays the
//!    request once.
//!
//! Other non-success answers are returned to the caller untouched.

use crate::error::{CoreError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_async::resilience::{map_bounded, retry, with_timeout, RetryPolicy};
use core_auth::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const UNAUTHORIZED: u16 = 401;

#[derive(Clone)]
pub struct AuthorizedTransport {
    session: SessionManager,
    http_client: Arc<dyn HttpClient>,
    retry_policy: RetryPolicy<CoreError>,
    request_timeout: Duration,
}

impl AuthorizedTransport {
    pub fn new(session: SessionManager, http_client: Arc<dyn HttpClient>) -> Self {
        let config = session.config();
        let retry_policy = default_transport_policy(config.max_retry_attempts);
        let request_timeout = config.request_timeout();
        Self {
            session,
            http_client,
            retry_policy,
            request_timeout,
        }
    }

    /// Replaces the retry policy. Only retryable errors are ever repeated.
    pub fn with_retry_policy(mut self, policy: RetryPolicy<CoreError>) -> Self {
        self.retry_policy = policy.retry_if(CoreError::is_retryable);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sends `request` with the session's credential.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotAuthenticated`] when the session holds no credential
    /// - [`CoreError::Unauthorized`] when a 401 persists or cannot be cured
    ///   by a refresh
    /// - [`CoreError::Upstream`], [`CoreError::Network`] or
    ///   [`CoreError::Timeout`] once retries are exhausted
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let header = self
            .session
            .fresh_authorization_header()
            .await?
            .ok_or(CoreError::NotAuthenticated)?;

        let response = self.send_with_retry(&request, &header).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }

        warn!("Request rejected with 401; refreshing session");
        if !self.session.refresh_token().await? {
            return Err(CoreError::Unauthorized);
        }

        let header = self
            .session
            .authorization_header()
            .ok_or(CoreError::NotAuthenticated)?;
        let replayed = self.send_with_retry(&request, &header).await?;
        if replayed.status == UNAUTHORIZED {
            return Err(CoreError::Unauthorized);
        }
        Ok(replayed)
    }

    /// Sends every request with at most `limit` in flight. Responses keep
    /// the order of `requests`; the first failure aborts the batch.
    pub async fn execute_all(
        &self,
        requests: Vec<HttpRequest>,
        limit: usize,
    ) -> Result<Vec<HttpResponse>> {
        debug!(count = requests.len(), limit, "Executing request batch");
        map_bounded(requests, limit, |request| self.execute(request)).await
    }

    async fn send_with_retry(&self, request: &HttpRequest, header: &str) -> Result<HttpResponse> {
        retry(&self.retry_policy, || self.send_once(request.clone(), header)).await
    }

    async fn send_once(&self, request: HttpRequest, header: &str) -> Result<HttpResponse> {
        let request = request
            .authorization(header)
            .timeout(self.request_timeout);

        let response = with_timeout(self.request_timeout, async {
            self.http_client
                .execute(request)
                .await
                .map_err(CoreError::from)
        })
        .await?;

        if response.is_retryable_status() {
            return Err(CoreError::Upstream {
                status: response.status,
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for AuthorizedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedTransport")
            .field("retry_policy", &self.retry_policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn default_transport_policy(max_retries: u32) -> RetryPolicy<CoreError> {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(30))
        .retry_if(CoreError::is_retryable)
        .on_retry(|error, attempt| {
            warn!(attempt, error = %error, "AI service request failed, retrying");
        })
}

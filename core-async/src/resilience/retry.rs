use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Fraction of the computed backoff used as the jitter half-width.
pub const DEFAULT_JITTER: f64 = 0.1;

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Observes each retry before its backoff sleep: `(last_error, attempt)`.
pub type RetryObserver<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Retry configuration shared by every outbound call site.
///
/// `max_retries` counts re-invocations, so an operation runs at most
/// `max_retries + 1` times.
pub struct RetryPolicy<E> {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub use_backoff: bool,
    is_retryable: Option<RetryPredicate<E>>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E> RetryPolicy<E> {
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            use_backoff: true,
            is_retryable: None,
            on_retry: None,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new().with_max_retries(0)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff(mut self, use_backoff: bool) -> Self {
        self.use_backoff = use_backoff;
        self
    }

    /// Restricts retries to errors accepted by `predicate`.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Some(Arc::new(predicate));
        self
    }

    pub fn on_retry<O>(mut self, observer: O) -> Self
    where
        O: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Whether `error` is eligible for another attempt. Errors are retryable
    /// when no predicate is installed.
    pub fn is_retryable(&self, error: &E) -> bool {
        self.is_retryable
            .as_ref()
            .map_or(true, |predicate| predicate(error))
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Without backoff this is `initial_delay`. With backoff it is
    /// `initial_delay * 2^(attempt-1)` jittered by up to 10% either way and
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.use_backoff {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * 2f64.powi(exponent);
        let spread = base_ms * DEFAULT_JITTER;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        let jittered = (base_ms + jitter).max(0.0);
        let capped = jittered.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            use_backoff: self.use_backoff,
            is_retryable: self.is_retryable.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("use_backoff", &self.use_backoff)
            .field("has_predicate", &self.is_retryable.is_some())
            .field("has_observer", &self.on_retry.is_some())
            .finish()
    }
}

/// Invokes `operation` until it succeeds, the policy rejects the error, or
/// retries are exhausted. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt > policy.max_retries || !policy.is_retryable(&error) {
            return Err(error);
        }

        let delay = policy.delay_for(attempt);
        if let Some(observer) = &policy.on_retry {
            observer(&error, attempt);
        }

        debug!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying failed operation"
        );

        crate::time::sleep(delay).await;
    }
}

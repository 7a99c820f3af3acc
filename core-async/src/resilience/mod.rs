//! Network resilience primitives.
//!
//! Three composable wrappers around an arbitrary async operation:
//!
//! - [`with_timeout`] bounds wall-clock duration
//! - [`retry`] re-invokes a failing operation according to a [`RetryPolicy`]
//! - [`map_bounded`] runs a batch with a fixed concurrency ceiling
//!
//! They carry no knowledge of HTTP or authentication. Call sites decide what
//! is retryable through the policy predicate.

mod concurrency;
mod retry;
mod timeout;

pub use concurrency::map_bounded;
pub use retry::{retry, RetryObserver, RetryPolicy, RetryPredicate, DEFAULT_JITTER};
pub use timeout::{with_timeout, TimeoutError};

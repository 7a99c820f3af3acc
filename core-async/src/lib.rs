//! Async abstraction layer for the assistant core.
//!
//! Every `core-*` crate depends on this crate instead of reaching for Tokio
//! directly, so the executor choice lives in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning
//! - `time`: Sleep, deadlines and wall-clock helpers
//! - `sync`: Async-aware locks and channels
//! - `runtime`: Executor handle access
//! - `resilience`: Timeout, retry and bounded-concurrency wrappers shared by
//!   every outbound network call
//!
//! # Examples
//!
//! ```rust
//! use core_async::resilience::{retry, RetryPolicy};
//! use core_async::time::Duration;
//!
//! # async fn example() -> Result<u32, std::io::Error> {
//! let policy = RetryPolicy::<std::io::Error>::new()
//!     .with_max_retries(2)
//!     .with_initial_delay(Duration::from_millis(50));
//!
//! retry(&policy, || async { Ok(42) }).await
//! # }
//! ```

pub mod resilience;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use resilience::{map_bounded, retry, with_timeout, RetryPolicy, TimeoutError};
pub use task::spawn;
pub use time::{sleep, Duration, Instant};

//! Time-related abstractions.
//!
//! Sleeping and deadlines are backed by `tokio::time`, so paused test clocks
//! (`tokio::time::pause`) drive every timer created through this module.

pub use tokio::time::{sleep, sleep_until, timeout, Sleep, Timeout};

pub use std::time::{Duration, Instant};

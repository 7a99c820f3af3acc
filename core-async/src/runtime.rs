//! Executor access for code that may run outside an async context.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Drives `future` to completion on the current thread.
///
/// Intended for short, non-blocking futures (forwarding a log line, a unit
/// test helper). Do not call from inside a Tokio worker; use
/// [`Handle::try_current`] and spawn instead.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    futures::executor::block_on(future)
}

//! One-shot refresh timer.
//!
//! A [`RefreshScheduler`] owns at most one pending delayed task. Arming it
//! always cancels the previous task first. Tasks run on the async runtime
//! as detached background work and never keep the process alive.

use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

struct Armed {
    generation: u64,
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
    _handle: JoinHandle<()>,
}

/// Cancellable delayed callback with at most one outstanding task.
#[derive(Default)]
pub struct RefreshScheduler {
    armed: Mutex<Option<Armed>>,
    generation: AtomicU64,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`, replacing any pending task.
    ///
    /// Cancelling only prevents a task that is still sleeping. Once the
    /// delay has elapsed the task runs to completion, so a task may safely
    /// re-arm the scheduler that started it.
    pub fn schedule<F, Fut>(&self, delay: Duration, task: F) -> u64
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut armed = self.lock();
        if let Some(previous) = armed.take() {
            previous.cancel.cancel();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        let token = cancel.clone();
        let fired_flag = Arc::clone(&fired);
        let handle = core_async::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!(generation, "Refresh timer cancelled");
                }
                _ = core_async::sleep(delay) => {
                    fired_flag.store(true, Ordering::Release);
                    debug!(generation, "Refresh timer fired");
                    task().await;
                }
            }
        });

        debug!(generation, delay_secs = delay.as_secs(), "Refresh timer armed");
        *armed = Some(Armed {
            generation,
            cancel,
            fired,
            _handle: handle,
        });
        generation
    }

    /// Cancels the pending task. Returns `true` if one was still waiting.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(previous) => {
                previous.cancel.cancel();
                let was_pending = !previous.fired.load(Ordering::Acquire);
                if was_pending {
                    debug!(generation = previous.generation, "Refresh timer disarmed");
                }
                was_pending
            }
            None => false,
        }
    }

    /// Whether a task is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|armed| !armed.cancel.is_cancelled() && !armed.fired.load(Ordering::Acquire))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Armed>> {
        self.armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = RefreshScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        scheduler.schedule(Duration::from_secs(60), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_pending());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_cancels_previous() {
        let scheduler = RefreshScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&runs);
            scheduler.schedule(Duration::from_secs(10), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let scheduler = RefreshScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        scheduler.schedule(Duration::from_secs(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = RefreshScheduler::new();
            let counter = Arc::clone(&runs);
            scheduler.schedule(Duration::from_secs(5), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_runs_immediately() {
        let scheduler = RefreshScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        scheduler.schedule(Duration::ZERO, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}

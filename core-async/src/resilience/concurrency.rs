use std::future::Future;

use futures::future::try_join_all;
use tokio::sync::Mutex;

/// Applies `f` to every input with at most `limit` invocations in flight.
///
/// `min(limit, inputs.len())` workers each claim the next unclaimed index and
/// store the result in that index's slot, so the output order always matches
/// the input order. The first failure aborts the batch: in-flight invocations
/// are dropped and the error is returned. A `limit` of zero is treated as one.
///
/// Workers are polled concurrently on the calling task; no `'static` bounds
/// are placed on `f` or its futures.
pub async fn map_bounded<I, T, E, F, Fut>(inputs: Vec<I>, limit: usize, f: F) -> Result<Vec<T>, E>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total = inputs.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let worker_count = limit.max(1).min(total);
    let pending = Mutex::new(inputs.into_iter().enumerate());
    let slots: Mutex<Vec<Option<T>>> = Mutex::new((0..total).map(|_| None).collect());

    let pending = &pending;
    let slots = &slots;
    let f = &f;

    let workers = (0..worker_count).map(move |_| async move {
        loop {
            let claimed = pending.lock().await.next();
            let Some((index, input)) = claimed else {
                return Ok::<(), E>(());
            };
            let value = f(input).await?;
            slots.lock().await[index] = Some(value);
        }
    });

    try_join_all(workers).await?;

    let results: Vec<T> = slots.lock().await.drain(..).flatten().collect();
    Ok(results)
}

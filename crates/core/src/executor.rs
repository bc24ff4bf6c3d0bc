//! Bounded parallel execution
//!
//! Runs one async job per work item with at most `concurrency` in flight and
//! reports each outcome as it completes. Failures are values: a failing item
//! never cancels its siblings, and the batch keeps running in the background
//! even after the consumer stops listening.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Run `job` over `items`, yielding results in completion order
///
/// With `timeout` set, each item is independently bounded and reports
/// [`Error::Timeout`] instead of hanging. An empty `items` yields an empty
/// stream without spawning anything.
pub fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    job: F,
    concurrency: usize,
    timeout: Option<Duration>,
) -> BoxStream<'static, Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    if items.is_empty() {
        return stream::empty().boxed();
    }

    let concurrency = concurrency.max(1);
    let (tx, rx) = mpsc::channel::<Result<R>>(concurrency);

    tokio::spawn(async move {
        let mut results = stream::iter(items)
            .map(move |item| with_deadline(job(item), timeout))
            .buffer_unordered(concurrency);

        while let Some(result) = results.next().await {
            // The consumer may already have bailed on an earlier error;
            // the rest of the batch still runs to completion.
            let _ = tx.send(result).await;
        }
    });

    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|result| (result, rx))
    })
    .boxed()
}

async fn with_deadline<R, Fut>(fut: Fut, timeout: Option<Duration>) -> Result<R>
where
    Fut: Future<Output = Result<R>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(limit))),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn test_empty_items() {
        let results: Vec<Result<u32>> =
            run_bounded(Vec::<u32>::new(), |x: u32| async move { Ok(x) }, 3, None)
                .collect()
                .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_all_items_complete() {
        let items: Vec<u32> = (1..=10).collect();
        let mut out: Vec<u32> = run_bounded(items, |x: u32| async move { Ok(x * 2) }, 3, None)
            .try_collect()
            .await
            .unwrap();
        out.sort_unstable();
        assert_eq!(out, (1..=10).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_completion_order() {
        let out: Vec<u64> = run_bounded(
            vec![60u64, 5],
            |ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            },
            2,
            None,
        )
        .try_collect()
        .await
        .unwrap();
        assert_eq!(out, vec![5, 60]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let job = {
            let running = running.clone();
            let peak = peak.clone();
            move |_: usize| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        };

        let results: Vec<()> = run_bounded((0..8).collect(), job, 2, None)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));

        let job = {
            let finished = finished.clone();
            move |i: usize| {
                let finished = finished.clone();
                async move {
                    if i == 0 {
                        return Err(Error::Network("boom".into()));
                    }
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                }
            }
        };

        let mut results = run_bounded(vec![0, 1, 2], job, 2, None);
        let first = results.next().await.unwrap();
        assert!(matches!(first, Err(Error::Network(_))));
        drop(results);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_item_timeout() {
        let results: Vec<Result<u64>> = run_bounded(
            vec![1u64, 500],
            |ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            },
            2,
            Some(Duration::from_millis(50)),
        )
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| matches!(r, Ok(1))));
        assert!(results.iter().any(|r| matches!(r, Err(Error::Timeout(_)))));
    }
}

//! Per-item execution shared by every strategy: retries and failure capture.

use crate::batch::config::BatchConfig;
use crate::batch::result::ItemError;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, warn};

/// How many times an item is re-attempted before it counts as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self::new(cfg.max_retries, cfg.retry_delay)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Run `f` on one item, retrying per `retry`. Errors and panics are both
/// reported as an [`ItemError`]; nothing escapes.
pub(crate) fn run_item<T, R, E, F>(
    index: usize,
    item: &T,
    f: &F,
    retry: &RetryPolicy,
) -> Result<R, ItemError>
where
    F: Fn(&T) -> Result<R, E> + ?Sized,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let message = match panic::catch_unwind(AssertUnwindSafe(|| f(item))) {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        if attempts > retry.max_retries {
            warn!(item_index = index, attempts, error = %message, "item processing failed");
            return Err(ItemError {
                index,
                message,
                attempts,
            });
        }
        debug!(item_index = index, attempts, error = %message, "retrying item");
        if !retry.delay.is_zero() {
            std::thread::sleep(retry.delay);
        }
    }
}

/// Async counterpart of [`run_item`]; each attempt gets a fresh clone of the item.
pub(crate) async fn run_item_async<T, R, E, F, Fut>(
    index: usize,
    item: T,
    f: &F,
    retry: &RetryPolicy,
) -> Result<R, ItemError>
where
    T: Clone,
    F: Fn(T) -> Fut + ?Sized,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let attempt = AssertUnwindSafe(f(item.clone())).catch_unwind();
        let message = match attempt.await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        if attempts > retry.max_retries {
            warn!(item_index = index, attempts, error = %message, "item processing failed");
            return Err(ItemError {
                index,
                message,
                attempts,
            });
        }
        debug!(item_index = index, attempts, error = %message, "retrying item");
        if !retry.delay.is_zero() {
            tokio::time::sleep(retry.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_success_first_try() {
        let out = run_item(0, &3, &|x: &i32| Ok::<_, String>(x * 2), &RetryPolicy::none());
        assert_eq!(out, Ok(6));
    }

    #[test]
    fn test_error_is_captured() {
        let out = run_item(
            7,
            &3,
            &|_: &i32| Err::<i32, _>("nope"),
            &RetryPolicy::none(),
        );
        let err = out.unwrap_err();
        assert_eq!(err.index, 7);
        assert_eq!(err.message, "nope");
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn test_panic_is_captured() {
        let out = run_item(
            1,
            &0,
            &|_: &i32| -> Result<i32, String> { panic!("kaboom") },
            &RetryPolicy::none(),
        );
        assert_eq!(out.unwrap_err().message, "panicked: kaboom");
    }

    #[test]
    fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let f = |x: &i32| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("transient")
            } else {
                Ok(*x)
            }
        };
        let out = run_item(0, &5, &f, &RetryPolicy::new(2, Duration::ZERO));
        assert_eq!(out, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retries_exhausted() {
        let out = run_item(
            2,
            &5,
            &|_: &i32| Err::<i32, _>("down"),
            &RetryPolicy::new(3, Duration::from_millis(1)),
        );
        assert_eq!(out.unwrap_err().attempts, 4);
    }

    #[tokio::test]
    async fn test_async_item_retry_and_panic() {
        let calls = AtomicU32::new(0);
        let f = |x: i32| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("first".to_string())
                } else {
                    Ok(x + 1)
                }
            }
        };
        let out = run_item_async(0, 1, &f, &RetryPolicy::new(1, Duration::ZERO)).await;
        assert_eq!(out, Ok(2));

        let panicky = |_: i32| async move {
            if true {
                panic!("async boom");
            }
            Ok::<i32, String>(0)
        };
        let out = run_item_async(3, 1, &panicky, &RetryPolicy::none()).await;
        assert_eq!(out.unwrap_err().message, "panicked: async boom");
    }
}

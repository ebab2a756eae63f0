//! Bounded polling helpers.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// The deadline passed before the awaited condition held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeout {
    /// How long the wait lasted.
    pub waited: Duration,
}

/// Polls `condition` every `interval` until it yields `Some`, or fails once
/// `timeout` has elapsed.
///
/// The condition is always evaluated at least once, so a zero `timeout`
/// still succeeds when the condition already holds. Errors from the
/// condition end the wait immediately. A `timeout` too large to represent
/// as a deadline (such as [`Duration::MAX`]) waits without one.
pub async fn poll_until<T, E, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<Result<T, WaitTimeout>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = started.checked_add(timeout);
    loop {
        if let Some(value) = condition().await? {
            return Ok(Ok(value));
        }
        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                return Ok(Err(WaitTimeout {
                    waited: now - started,
                }));
            },
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };
        sleep(pause).await;
    }
}

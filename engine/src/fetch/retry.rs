//! Retry/backoff control flow shared by the segment fetcher (§4.3).
//!
//! The upstream transcoder produces segments just-in-time, so this follows
//! the spec's explicit linear-capped schedule — `min((attempt+1)*3s, 15s)` —
//! rather than the exponential-with-jitter curve used elsewhere in the
//! codebase for best-effort network calls (decision recorded in DESIGN.md).

use std::future::Future;
use std::time::Duration;

pub const DEFAULT_RETRY_BUDGET: u32 = 8;

/// What a single attempt decided.
pub enum RetryAction<T, E> {
    Success(T),
    Retry(E),
    Fail(E),
}

/// Delay before attempt number `attempt` (0-based) is retried.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = attempt.saturating_add(1).saturating_mul(3).min(15);
    Duration::from_secs(secs as u64)
}

/// Run `attempt` up to `budget` times, sleeping [`backoff_delay`] between
/// retries. Returns the last error if the budget is exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(budget: u32, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RetryAction<T, E>>,
{
    let budget = budget.max(1);
    let mut last_err = None;
    for n in 0..budget {
        match attempt(n).await {
            RetryAction::Success(v) => return Ok(v),
            RetryAction::Fail(e) => return Err(e),
            RetryAction::Retry(e) => {
                last_err = Some(e);
                if n + 1 < budget {
                    tokio::time::sleep(backoff_delay(n)).await;
                }
            }
        }
    }
    Err(last_err.expect("budget >= 1 guarantees at least one attempt ran"))
}

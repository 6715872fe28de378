//! Bounded retries for optimistic-concurrency conflicts.

use std::future::Future;
use std::time::Duration;

use crate::error::DomainError;

/// How often and how patiently to retry a conflicting commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Runs `attempt` until it succeeds, fails with anything other than a
/// store conflict, or the policy is exhausted.
///
/// Each call of `attempt` must re-read the state it writes against; a
/// conflict means what it read is stale. Exhaustion surfaces as
/// [`DomainError::ConcurrencyConflict`].
pub async fn retry_on_conflict<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        match attempt().await {
            Err(e) if e.is_conflict() => {
                metrics::counter!("commit_conflicts_total", "operation" => operation).increment(1);
                tracing::warn!(operation, attempt = n, max_attempts, "commit conflicted");
                if n < max_attempts {
                    tokio::time::sleep(policy.backoff * n).await;
                }
            }
            other => return other,
        }
    }

    metrics::counter!("commit_retries_exhausted_total", "operation" => operation).increment(1);
    Err(DomainError::ConcurrencyConflict {
        operation,
        attempts: max_attempts,
    })
}

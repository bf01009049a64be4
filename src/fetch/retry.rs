//! Retry policy for a single range fetch, per spec §4.B / §7.

use bytes::Bytes;

use crate::fetch::client::FetchClient;

/// The outcome of one attempt at fetching a range, before the retry
/// loop decides what to do with it.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 206 Partial Content.
    Success(Bytes),
    /// 404 Not Found — no retry, maps to a `null` for this sub-range.
    NotFound,
    /// 200 OK to a ranged request: the server ignored the Range header.
    /// Treated as transient.
    ServerIgnoredRange,
    /// Any other HTTP or transport-level failure.
    Transient(String),
}

/// The final, post-retry result handed back to the caller.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Bytes(Bytes),
    /// The archive genuinely does not have this range (404).
    NotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (spec's *R*).
    pub max_attempts: u32,
    /// Base delay unit in seconds (spec's `delay_base`).
    pub delay_base_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            delay_base_secs: 1,
        }
    }
}

/// Fetches one range, retrying per spec §4.B:
/// - 206 -> success;
/// - 200 (server ignored the range) -> transient, sleep `k *
///   delay_base` where `k` is the attempt count;
/// - 404 -> `NotFound`, no retry;
/// - anything else -> retry with linearly increasing backoff.
pub async fn fetch_with_retry(
    client: &dyn FetchClient,
    file: &str,
    offset: usize,
    length: usize,
    policy: RetryPolicy,
) -> Result<FetchResult, String> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match client.get_range(file, offset, length).await {
            FetchOutcome::Success(body) => return Ok(FetchResult::Bytes(body)),
            FetchOutcome::NotFound => return Ok(FetchResult::NotFound),
            FetchOutcome::ServerIgnoredRange => {
                if attempt >= policy.max_attempts {
                    return Err(format!(
                        "{file}: server kept ignoring range after {attempt} attempts"
                    ));
                }
                sleep_backoff(attempt, policy.delay_base_secs).await;
            }
            FetchOutcome::Transient(reason) => {
                if attempt >= policy.max_attempts {
                    return Err(format!(
                        "{file}: giving up after {attempt} attempts ({reason})"
                    ));
                }
                tracing::warn!(
                    "Transient error fetching {} (attempt {}/{}): {}",
                    file,
                    attempt,
                    policy.max_attempts,
                    reason
                );
                sleep_backoff(attempt, policy.delay_base_secs).await;
            }
        }
    }
}

async fn sleep_backoff(attempt: u32, delay_base_secs: u64) {
    let secs = attempt as u64 * delay_base_secs;
    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<FetchOutcome>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FetchClient for ScriptedClient {
        async fn get_range(&self, _file: &str, _offset: usize, _length: usize) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }
    }

    /// S3: 500, 500, 206 across three attempts succeeds on the third.
    #[tokio::test]
    async fn s3_retries_twice_then_succeeds() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                FetchOutcome::Transient("500".to_string()),
                FetchOutcome::Transient("500".to_string()),
                FetchOutcome::Success(Bytes::from_static(b"ok")),
            ]),
            calls: AtomicUsize::new(0),
        };
        let policy = RetryPolicy {
            max_attempts: 5,
            delay_base_secs: 0,
        };
        let result = fetch_with_retry(&client, "f", 0, 10, policy).await.unwrap();
        match result {
            FetchResult::Bytes(b) => assert_eq!(&b[..], b"ok"),
            _ => panic!("expected bytes"),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_returns_immediately_without_retry() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![FetchOutcome::NotFound]),
            calls: AtomicUsize::new(0),
        };
        let result = fetch_with_retry(&client, "f", 0, 10, RetryPolicy::default())
            .await
            .unwrap();
        assert!(matches!(result, FetchResult::NotFound));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_is_an_error() {
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                FetchOutcome::Transient("x".to_string()),
                FetchOutcome::Transient("x".to_string()),
            ]),
            calls: AtomicUsize::new(0),
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            delay_base_secs: 0,
        };
        let result = fetch_with_retry(&client, "f", 0, 10, policy).await;
        assert!(result.is_err());
    }
}

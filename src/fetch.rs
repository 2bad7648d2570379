//! Outbound HTTP with rate-limit aware retry and backoff.
//!
//! Every fetch a source parser performs goes through a [`FetchContext`],
//! which wraps the request in retry logic so transient failures are
//! recovered close to where they happen instead of bubbling up as task
//! failures.
//!
//! # Rate-limit signal
//!
//! The observed sources throttle crawlers with HTTP 418 rather than the
//! standard 429; both are treated as the rate-limit signal. A throttled
//! fetch is never an error by itself; it raises the context's penalty
//! level and is retried after a wait.
//!
//! # Retry strategy
//!
//! - Maximum 5 attempts per fetch (configurable)
//! - Exponential backoff starting at 1 second, doubling per consecutive
//!   penalty, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//! - The penalty level persists across fetches within one context and
//!   resets to baseline on the first success, so a source that has begun
//!   throttling is approached slowly for the rest of the sequence
//! - Backoff state is scoped to the context (one per task), never shared
//!   across tasks: one source's penalty does not slow another source down
//!
//! Non-retryable errors (config, parse, I/O) pass through immediately
//! without consuming attempt budget; the loop inspects
//! [`ScrapeError::is_retryable`] rather than catching anything blindly.

use rand::{rng, Rng};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument, warn};

use crate::errors::ScrapeError;

/// HTTP status the observed sources use to signal "too many requests".
const TEAPOT_RATE_LIMIT: StatusCode = StatusCode::IM_A_TEAPOT;

/// Backoff schedule and attempt ceiling for one fetch sequence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per fetch before giving up.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles with each penalty level.
    pub base_delay: Duration,
    /// Cap on the computed delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every delay. Zero disables
    /// jitter, which the timing tests rely on.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Delay for the given penalty level: `base * 2^penalty`, capped.
    /// The sequence is non-decreasing in the penalty level by construction.
    fn delay_for(&self, penalty: u32) -> Duration {
        let factor = 1u32.checked_shl(penalty).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Per-task fetch state: an HTTP client plus the current backoff penalty.
///
/// Each task owns exactly one context, so its penalty level reflects only
/// the behavior of the source that task is talking to.
#[derive(Debug)]
pub struct FetchContext {
    client: reqwest::Client,
    policy: RetryPolicy,
    /// Consecutive retryable failures since the last success.
    penalty: u32,
}

impl FetchContext {
    pub fn new(policy: RetryPolicy) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(FetchContext {
            client,
            policy,
            penalty: 0,
        })
    }

    /// Run `fetch` until it succeeds, fails non-retryably, or exhausts the
    /// attempt ceiling. The last error is returned as-is, so a rate-limit
    /// exhaustion surfaces as a rate-limit flavored network error.
    #[instrument(level = "debug", skip_all)]
    pub async fn execute<T, F, Fut>(&mut self, mut fetch: F) -> Result<T, ScrapeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match fetch().await {
                Ok(value) => {
                    self.penalty = 0;
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt >= self.policy.max_attempts {
                        error!(
                            attempt,
                            max = self.policy.max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let mut delay = self.policy.delay_for(self.penalty);
                    if self.policy.jitter_ms > 0 {
                        let jitter_ms: u64 = rng().random_range(0..=self.policy.jitter_ms);
                        delay += Duration::from_millis(jitter_ms);
                    }
                    self.penalty = self.penalty.saturating_add(1);

                    warn!(
                        attempt,
                        max = self.policy.max_attempts,
                        rate_limited = e.is_rate_limit(),
                        penalty = self.penalty,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// GET `url` with `query` and return the response body as text.
    pub async fn get_text(
        &mut self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, ScrapeError> {
        let client = self.client.clone();
        let url = url.to_string();
        self.execute(|| {
            let client = client.clone();
            let url = url.clone();
            async move {
                let resp = client
                    .get(&url)
                    .query(query)
                    .send()
                    .await
                    .map_err(classify_reqwest)?;
                let resp = check_status(&url, resp)?;
                resp.text().await.map_err(classify_reqwest)
            }
        })
        .await
    }

    /// GET `url` with `query` and decode the response body as JSON.
    pub async fn get_json(
        &mut self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ScrapeError> {
        let text = self.get_text(url, query).await?;
        serde_json::from_str(&text)
            .map_err(|e| ScrapeError::Parse(format!("invalid JSON from {url}: {e}")))
    }

    /// Current penalty level; exposed for tests and progress logging.
    pub fn penalty(&self) -> u32 {
        self.penalty
    }
}

/// Map an HTTP status onto the error taxonomy.
///
/// 418/429 are the rate-limit signal, 5xx is transient, and any other
/// non-success status means the resource is not what the parser expects,
/// which retrying cannot fix.
fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, ScrapeError> {
    let status = resp.status();
    if status == TEAPOT_RATE_LIMIT || status == StatusCode::TOO_MANY_REQUESTS {
        debug!(%url, %status, "Source signalled rate limit");
        return Err(ScrapeError::rate_limited(url));
    }
    if status.is_server_error() {
        return Err(ScrapeError::Network {
            message: format!("{url} answered {status}"),
            rate_limited: false,
        });
    }
    if !status.is_success() {
        return Err(ScrapeError::Parse(format!(
            "{url} answered unexpected status {status}"
        )));
    }
    Ok(resp)
}

/// Map a transport-level `reqwest` failure onto the error taxonomy.
///
/// Timeouts and connection failures are transient; a malformed request is a
/// configuration problem and must not consume retry budget.
fn classify_reqwest(e: reqwest::Error) -> ScrapeError {
    if e.is_builder() {
        ScrapeError::Config(format!("malformed request: {e}"))
    } else if e.is_decode() {
        ScrapeError::Parse(format!("undecodable response body: {e}"))
    } else {
        ScrapeError::from_request(e)
    }
}

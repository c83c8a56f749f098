use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const MAX_ATTEMPTS: usize = 5;
const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff state for one request.
#[derive(Debug)]
pub(crate) struct Backoff {
    provider: &'static str,
    attempt: usize,
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            attempt: 0,
            delay: BASE_DELAY,
        }
    }

    /// Records a throttled attempt and sleeps before the next one.
    ///
    /// Returns `false` without sleeping once `MAX_ATTEMPTS` requests were made.
    pub(crate) async fn retry(&mut self, retry_after: Option<Duration>) -> bool {
        self.attempt += 1;
        if self.attempt >= MAX_ATTEMPTS {
            return false;
        }
        let wait = retry_after.map_or(self.delay, |hint| hint.max(self.delay));
        warn!(
            "{} rate limited; retrying in {:.1}s (attempt {}/{})",
            self.provider,
            wait.as_secs_f32(),
            self.attempt,
            MAX_ATTEMPTS
        );
        sleep(wait).await;
        self.delay = next_delay(self.delay);
        true
    }
}

/// Transient throttling only; quota and auth failures are final.
pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) || status.as_u16() == 529
    {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests")
}

/// `Retry-After` in delta-seconds form.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn next_delay(current: Duration) -> Duration {
    current.saturating_mul(2).clamp(BASE_DELAY, MAX_DELAY)
}

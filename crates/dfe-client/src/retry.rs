//! Retry logic with exponential backoff for the distribution exchange.
//!
//! Retries only on connection-level transport errors (refused, reset, DNS).
//! A timeout is returned at once: the request timeout is the budget for the
//! whole exchange, and a retry would multiply it. An HTTP response of any
//! status ends the loop; the caller inspects it.

use std::time::Duration;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// Send a request, retrying non-timeout transport failures up to
/// `max_retries` times.
///
/// The closure `f` is called up to `max_retries + 1` times, and exactly once
/// when the first attempt times out.
pub(crate) async fn retry_send<F, Fut>(
    max_retries: u32,
    endpoint: &str,
    f: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..max_retries {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_timeout() => {
                tracing::warn!(endpoint, attempt = attempt + 1, "distribution request timed out: {e}");
                return Err(e);
            }
            Err(e) => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(
                    endpoint,
                    attempt = attempt + 1,
                    max_retries,
                    "distribution request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}

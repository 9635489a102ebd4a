//! Exponential backoff for the token request.
//!
//! The token request mutates nothing on either side, so it is repeated on
//! transport failures and on the statuses the gateway answers while
//! overloaded or in maintenance. Other statuses go straight back to the
//! caller. The last attempt's result is returned whatever it is.

use std::time::Duration;

use reqwest::StatusCode;

/// Retry attempts after the initial request.
pub(crate) const MAX_RETRIES: u32 = 3;

/// First backoff delay; doubles each attempt (200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

fn transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS << attempt)
}

/// Send, repeating transport errors and transient statuses.
/// `f` runs at most `MAX_RETRIES + 1` times.
pub(crate) async fn retry_send<F, Fut>(endpoint: &str, f: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let result = f().await;
        if attempt == MAX_RETRIES {
            return result;
        }
        let cause = match &result {
            Ok(resp) if transient_status(resp.status()) => format!("status {}", resp.status()),
            Ok(_) => return result,
            Err(e) => e.to_string(),
        };
        let delay = backoff(attempt);
        attempt += 1;
        tracing::warn!(
            endpoint,
            attempt,
            max_retries = MAX_RETRIES,
            "gateway request failed ({cause}), retrying in {delay:?}"
        );
        tokio::time::sleep(delay).await;
    }
}

use std::future::Future;
use std::time::Duration;

use log::warn;
use reqwest::Response;
use serde::de::DeserializeOwned;
use tokio::time::sleep;

use crate::config::ProviderConfig;
use crate::llm::client::{ModelCallError, ModelCallErrorKind};

pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client, ModelCallError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| ModelCallError::new(ModelCallErrorKind::Other, e.to_string()))
}

/// Drops the request URL from the error so query parameters never reach logs.
pub(crate) fn transport_error(err: reqwest::Error) -> ModelCallError {
    let err = err.without_url();
    let kind = if err.is_timeout() {
        ModelCallErrorKind::Timeout
    } else if let Some(status) = err.status() {
        return ModelCallError::from_status(status.as_u16(), err.to_string());
    } else {
        ModelCallErrorKind::Other
    };
    ModelCallError::new(kind, err.to_string())
}

/// Reads a provider response, turning non-2xx statuses into typed errors.
pub(crate) async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ModelCallError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(ModelCallError::from_status(status.as_u16(), body));
    }
    res.json::<T>().await.map_err(transport_error)
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or runs out of retries.
/// Backoff doubles from `initial_backoff`: 1s, 2s, 4s with the defaults.
pub(crate) async fn with_retry<T, F, Fut>(
    provider: &str,
    max_retries: u32,
    initial_backoff: Duration,
    mut attempt: F,
) -> Result<T, ModelCallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelCallError>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) && tries < max_retries => {
                let delay = initial_backoff * 2u32.pow(tries);
                tries += 1;
                warn!(
                    "{} call attempt {} failed ({}), retrying after {}ms...",
                    provider,
                    tries,
                    err,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn should_retry(err: &ModelCallError) -> bool {
    err.is_retryable() || err.is_server_error()
}

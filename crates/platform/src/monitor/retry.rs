//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Exponential-backoff retry over a declared retryable-error set, honoring
//! cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::error::MonitorError;
use super::CancelSignal;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryConfig {
    /// `RetryableCloudError` backoff: 1 minute initial, 30 minute cap,
    /// effectively unbounded attempts.
    pub fn cloud_default() -> Self {
        Self {
            initial_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(30 * 60),
        }
    }
}

pub struct RetryRunner;

impl RetryRunner {
    /// Retry `op` while it fails with `MonitorError::RetryableCloudError`.
    /// Any other error, or cancellation, propagates immediately. `name` is
    /// only used for logging.
    pub async fn run_with_retry<F, Fut, T>(
        op: F,
        config: &RetryConfig,
        name: &str,
        cancel: &CancelSignal,
    ) -> Result<T, MonitorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, MonitorError>>,
    {
        let mut interval = config.initial_interval;
        loop {
            if cancel.is_cancelled() {
                return Err(MonitorError::Cancelled);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(MonitorError::RetryableCloudError(cause)) => {
                    tracing::warn!(name, cause, backoff = ?interval, "retrying after retryable cloud error");
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
                    tokio::select! {
                        _ = tokio::time::sleep(interval + jitter) => {}
                        _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
                    }
                    interval = (interval * 2).min(config.max_interval);
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_immediately_when_op_succeeds() {
        let cancel = CancelSignal::new();
        let result = RetryRunner::run_with_retry(
            || async { Ok::<_, MonitorError>(42) },
            &RetryConfig::cloud_default(),
            "test",
            &cancel,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn propagates_terminal_errors_without_retry() {
        let cancel = CancelSignal::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result = RetryRunner::run_with_retry(
            move || {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(MonitorError::TerminalCloudError("denied".to_string())) }
            },
            &RetryConfig::cloud_default(),
            "test",
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(MonitorError::TerminalCloudError(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_retry_loop() {
        let cancel = CancelSignal::new();
        cancel.cancel();
        let result = RetryRunner::run_with_retry(
            || async { Err::<(), _>(MonitorError::RetryableCloudError("throttled".to_string())) },
            &RetryConfig::cloud_default(),
            "test",
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(MonitorError::Cancelled)));
    }
}

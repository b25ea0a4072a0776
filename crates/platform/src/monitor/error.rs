//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Error kinds surfaced by the transport, the cloud connectivity API, and
//! cooperative cancellation.

use thiserror::Error;

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// Pub/sub publish/subscribe/unsubscribe failure.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A subscribe call did not ack within its window.
    #[error("operation timed out")]
    TimeoutError,

    /// Throttling or internal-server-error from `ConnectivityProvider`;
    /// retried by `RetryRunner` with exponential backoff.
    #[error("retryable cloud error: {0}")]
    RetryableCloudError(String),

    /// Any other `ConnectivityProvider` failure; not retried.
    #[error("terminal cloud error: {0}")]
    TerminalCloudError(String),

    /// Cooperative cancellation. State is left unadvanced.
    #[error("operation cancelled")]
    Cancelled,
}

//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Certificate expiry tracking and connectivity-reactive regeneration: the
//! two monitors that decide *when* a `CertGen` needs to produce a new
//! certificate, as opposed to `ca`, which decides *how*.

pub mod connectivity;
pub mod error;
pub mod expiry;
pub mod retry;
pub mod shadow;
pub mod transport;

pub use connectivity::{CachingConnectivityProvider, ConnectivityProvider, FixedConnectivityProvider};
pub use error::{MonitorError, MonitorResult};
pub use expiry::ExpiryMonitor;
pub use retry::{RetryConfig, RetryRunner};
pub use shadow::{ShadowMonitor, ShadowMonitorHandles};
pub use transport::{InMemoryShadowTransport, ShadowTransport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation signal shared by the subscribe worker, the
/// processing worker, and `RetryRunner`. Deliberately hand-rolled instead of
/// pulling in `tokio-util` for a single `CancellationToken`-shaped primitive.
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelSignalInner>,
}

#[derive(Default)]
struct CancelSignalInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. Safe to race against with
    /// `tokio::select!` inside a sleep or await point.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

/// De-duplicate a list of strings, preserving the order of first occurrence.
pub(crate) fn dedupe_preserve_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

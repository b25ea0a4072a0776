//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! The cloud connectivity API facade: a blocking-style lookup of this
//! device's current host-address set, wrapped with a non-blocking cached
//! view for `ExpiryMonitor`'s expiry-path regenerations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use trustedge_types::prelude::ConnectivityInfo;

use super::error::MonitorResult;
use super::dedupe_preserve_order;

/// Cloud API facade consumed by `ShadowMonitor`. Implementations call out to
/// whatever SDK the host runtime provides; errors are classified by the
/// implementation into `MonitorError::RetryableCloudError` (throttling,
/// internal server error) or `MonitorError::TerminalCloudError` (anything
/// else).
#[async_trait]
pub trait ConnectivityProvider: Send + Sync {
    async fn get_connectivity_info(&self) -> MonitorResult<Vec<ConnectivityInfo>>;
}

/// Wraps a `ConnectivityProvider`, caching the host-address set from its last
/// successful call behind a plain `RwLock` — reads never block on the
/// network, matching the "non-blocking view" contract.
pub struct CachingConnectivityProvider {
    inner: Arc<dyn ConnectivityProvider>,
    cache: RwLock<Vec<String>>,
}

impl CachingConnectivityProvider {
    pub fn new(inner: Arc<dyn ConnectivityProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(Vec::new()),
        }
    }

    pub async fn get_connectivity_info(&self) -> MonitorResult<Vec<ConnectivityInfo>> {
        let infos = self.inner.get_connectivity_info().await?;
        let hosts = dedupe_preserve_order(infos.iter().map(|i| i.host_address.clone()));
        *self.cache.write().expect("cache lock poisoned") = hosts;
        Ok(infos)
    }

    /// Non-blocking view of the last successful result's host addresses,
    /// deduplicated, order preserved. Empty until the first successful call.
    pub fn cached_host_addresses(&self) -> Vec<String> {
        self.cache.read().expect("cache lock poisoned").clone()
    }
}

/// Reference `ConnectivityProvider` that always returns a fixed, configured
/// endpoint list. Suitable for a single-node deployment with no live cloud
/// connectivity API, or as a default before a real implementation is wired
/// in.
pub struct FixedConnectivityProvider {
    infos: Vec<ConnectivityInfo>,
}

impl FixedConnectivityProvider {
    pub fn new(infos: Vec<ConnectivityInfo>) -> Self {
        Self { infos }
    }
}

#[async_trait]
impl ConnectivityProvider for FixedConnectivityProvider {
    async fn get_connectivity_info(&self) -> MonitorResult<Vec<ConnectivityInfo>> {
        Ok(self.infos.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(host: &str) -> ConnectivityInfo {
        ConnectivityInfo {
            host_address: host.to_string(),
            port: 8883,
            id: "primary".to_string(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn cache_is_empty_until_first_success() {
        let provider = CachingConnectivityProvider::new(Arc::new(FixedConnectivityProvider::new(vec![info("10.0.0.1")])));
        assert!(provider.cached_host_addresses().is_empty());
        provider.get_connectivity_info().await.unwrap();
        assert_eq!(provider.cached_host_addresses(), vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn cache_deduplicates_preserving_order() {
        let provider = CachingConnectivityProvider::new(Arc::new(FixedConnectivityProvider::new(vec![
            info("10.0.0.1"),
            info("10.0.0.2"),
            info("10.0.0.1"),
        ])));
        provider.get_connectivity_info().await.unwrap();
        assert_eq!(
            provider.cached_host_addresses(),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
    }
}

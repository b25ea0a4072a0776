//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Periodic scan of registered `CertGen`s, regenerating those at or near
//! expiry.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::ca::{CertGen, CertStore};

use super::CancelSignal;

/// Default tick interval when none is given to `start`.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

type HostAddressSupplier = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

pub struct ExpiryMonitor {
    store: Arc<CertStore>,
    host_address_supplier: HostAddressSupplier,
    registry: RwLock<Vec<Arc<CertGen>>>,
    cancel: CancelSignal,
}

impl ExpiryMonitor {
    pub fn new(store: Arc<CertStore>, host_address_supplier: HostAddressSupplier) -> Self {
        Self {
            store,
            host_address_supplier,
            registry: RwLock::new(Vec::new()),
            cancel: CancelSignal::new(),
        }
    }

    pub async fn add(&self, certgen: Arc<CertGen>) {
        self.registry.write().await.push(certgen);
    }

    /// Remove every registered `CertGen` with the given subject. A removal
    /// taking effect mid-tick is honored: `tick` re-checks membership before
    /// regenerating each entry.
    pub async fn remove(&self, subject: &str) {
        self.registry.write().await.retain(|c| c.subject() != subject);
    }

    async fn is_registered(&self, certgen: &Arc<CertGen>) -> bool {
        self.registry
            .read()
            .await
            .iter()
            .any(|c| Arc::ptr_eq(c, certgen))
    }

    /// One scan: order the current registry by `expiry_time()` ascending
    /// (never-issued sorts first), then regenerate from the front while each
    /// head reports `should_regenerate()` — ordering guarantees that once one
    /// entry doesn't need regeneration, none of the rest do either.
    pub async fn tick(&self) {
        let snapshot: Vec<Arc<CertGen>> = self.registry.read().await.clone();
        let mut ordered: Vec<(Option<OffsetDateTime>, Arc<CertGen>)> = Vec::with_capacity(snapshot.len());
        for certgen in snapshot {
            let expiry = certgen.expiry_time().await;
            ordered.push((expiry, certgen));
        }
        ordered.sort_by(|(a, _), (b, _)| cmp_optional_instant(a, b));

        for (_, certgen) in ordered {
            if !self.is_registered(&certgen).await {
                continue;
            }
            if !certgen.should_regenerate().await {
                break;
            }

            let store = self.store.clone();
            let hosts_fn = self.host_address_supplier.clone();
            let subject = certgen.subject().to_string();
            let result = certgen
                .generate(&store, move || (hosts_fn)(), "expiry")
                .await;
            if let Err(err) = result {
                tracing::warn!(subject, error = %err, "expiry regeneration failed, will retry next tick");
            }
        }
    }

    /// Spawn the periodic tick loop. Cancellation stops the loop after the
    /// in-flight tick (if any) completes.
    pub fn start(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.cancel.cancelled() => return,
                }
                self.tick().await;
            }
        })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

fn cmp_optional_instant(a: &Option<OffsetDateTime>, b: &Option<OffsetDateTime>) -> std::cmp::Ordering {
    match (a, b) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use trustedge_types::prelude::{CaAlgorithm, CertProfile, ValidityPolicy};

    async fn store() -> Arc<CertStore> {
        let dir = tempfile::tempdir().unwrap();
        let passphrase = trustedge_core::generate_passphrase();
        Arc::new(CertStore::update(dir.path(), &passphrase, CaAlgorithm::EcdsaP256).unwrap())
    }

    fn counting_certgen(subject: &str, calls: Arc<AtomicUsize>) -> Arc<CertGen> {
        let key_pair = crate::ca::builder::generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        Arc::new(CertGen::new(
            subject,
            CertProfile::Server,
            key_pair,
            ValidityPolicy::server_default(),
            604_800,
            Arc::new(move |_chain| {
                calls.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        ))
    }

    #[tokio::test]
    async fn unissued_certgen_regenerates_on_first_tick() {
        let store = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = ExpiryMonitor::new(store, Arc::new(Vec::new));
        monitor.add(counting_certgen("device-a", calls.clone())).await;

        monitor.tick().await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn freshly_issued_certgen_does_not_regenerate_next_tick() {
        let store = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = ExpiryMonitor::new(store, Arc::new(Vec::new));
        monitor.add(counting_certgen("device-a", calls.clone())).await;

        monitor.tick().await;
        monitor.tick().await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn removed_certgen_is_skipped_even_if_due() {
        let store = store().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let monitor = ExpiryMonitor::new(store, Arc::new(Vec::new));
        let certgen = counting_certgen("device-a", calls.clone());
        monitor.add(certgen).await;
        monitor.remove("device-a").await;

        monitor.tick().await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }
}

//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `ShadowMonitor`: reacts to a remote desired/reported state document,
//! reconciles local reported state to desired state, calls the cloud
//! connectivity API with bounded retries, dedupes redundant triggers, and
//! rotates managed server certificates only when the host-address set
//! actually changes.
//!
//! The MQTT callback thread must never block on crypto — incoming deltas and
//! get-accepted responses are parsed into a [`PendingShadowRequest`] and
//! dropped into a single-slot queue; a separate periodic worker drains it.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use trustedge_types::prelude::PendingShadowRequest;
use trustedge_types::shadow::{
    ShadowDeltaMessage, ShadowGetAcceptedMessage, UpdateShadowReportedState, UpdateShadowRequest,
};

use crate::ca::{CertGen, CertStore};

use super::connectivity::CachingConnectivityProvider;
use super::error::{MonitorError, MonitorResult};
use super::retry::{RetryConfig, RetryRunner};
use super::transport::{MessageCallback, ShadowTransport};
use super::{dedupe_preserve_order, CancelSignal};

/// Per-subscribe timeout before a subscribe attempt is treated as failed.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(60);
/// Base delay between subscribe retries; spec adds `jitter(0..10s)` on top.
const SUBSCRIBE_RETRY_BASE: Duration = Duration::from_secs(120);
/// Default processing-loop fixed delay, overridable via configuration.
pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_secs(5);

struct ReconciliationState {
    last_cis_version: u64,
    last_host_addresses: Option<Vec<String>>,
}

/// The two background workers `ShadowMonitor::start` spawns.
pub struct ShadowMonitorHandles {
    pub processing: JoinHandle<()>,
    pub subscribe: JoinHandle<()>,
}

pub struct ShadowMonitor {
    thing_name: String,
    transport: Arc<dyn ShadowTransport>,
    connectivity: Arc<CachingConnectivityProvider>,
    store: Arc<CertStore>,
    certgens: Vec<Arc<CertGen>>,
    retry_config: RetryConfig,
    processing_delay: Duration,
    pending: AsyncMutex<Option<PendingShadowRequest>>,
    state: AsyncMutex<ReconciliationState>,
    cancel: CancelSignal,
}

impl ShadowMonitor {
    pub fn new(
        thing_name: impl Into<String>,
        transport: Arc<dyn ShadowTransport>,
        connectivity: Arc<CachingConnectivityProvider>,
        store: Arc<CertStore>,
        certgens: Vec<Arc<CertGen>>,
        processing_delay: Duration,
    ) -> Self {
        Self {
            thing_name: thing_name.into(),
            transport,
            connectivity,
            store,
            certgens,
            retry_config: RetryConfig::cloud_default(),
            processing_delay,
            pending: AsyncMutex::new(None),
            state: AsyncMutex::new(ReconciliationState {
                last_cis_version: 0,
                last_host_addresses: None,
            }),
            cancel: CancelSignal::new(),
        }
    }

    fn topic_delta(&self) -> String {
        format!("$aws/things/{}-gci/shadow/update/delta", self.thing_name)
    }

    fn topic_get_accepted(&self) -> String {
        format!("$aws/things/{}-gci/shadow/get/accepted", self.thing_name)
    }

    fn topic_get(&self) -> String {
        format!("$aws/things/{}-gci/shadow/get", self.thing_name)
    }

    fn topic_update(&self) -> String {
        format!("$aws/things/{}-gci/shadow/update", self.thing_name)
    }

    /// Last shadow version this monitor has fully reconciled. Exposed for
    /// tests asserting invariant 1 (monotonically non-decreasing).
    pub async fn last_processed_version(&self) -> u64 {
        self.state.lock().await.last_cis_version
    }

    /// Host-address set observed by the most recent successful connectivity
    /// lookup. Exposed for tests asserting invariant 2.
    pub async fn last_host_addresses(&self) -> Option<Vec<String>> {
        self.state.lock().await.last_host_addresses.clone()
    }

    /// Start the subscribe worker and the processing worker. The connection-
    /// resumed hook is registered on the transport so a reconnect schedules a
    /// fresh get-shadow publish.
    pub fn start(self: Arc<Self>) -> ShadowMonitorHandles {
        let processing = {
            let this = self.clone();
            tokio::spawn(async move { this.processing_loop().await })
        };

        let subscribe = {
            let this = self.clone();
            tokio::spawn(async move { this.subscribe_worker().await })
        };

        let resumed = self.clone();
        self.transport
            .set_connection_resumed_callback(Arc::new(move |_session_present: bool| {
                let this = resumed.clone();
                tokio::spawn(async move {
                    if let Err(err) = this.publish_get_request().await {
                        tracing::warn!(error = %err, "failed to publish get-shadow request on reconnect");
                    }
                });
            }));

        ShadowMonitorHandles { processing, subscribe }
    }

    /// Cancel both workers and unsubscribe from the shadow topics.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let _ = self.transport.unsubscribe(&self.topic_delta()).await;
        let _ = self.transport.unsubscribe(&self.topic_get_accepted()).await;
    }

    async fn subscribe_worker(self: Arc<Self>) {
        let delta_topic = self.topic_delta();
        let this = self.clone();
        let on_delta: MessageCallback = Arc::new(move |payload| {
            let this = this.clone();
            tokio::spawn(async move { this.handle_delta_message(payload).await });
        });
        self.subscribe_with_retry(&delta_topic, on_delta).await;
        if self.cancel.is_cancelled() {
            return;
        }

        let get_accepted_topic = self.topic_get_accepted();
        let this = self.clone();
        let on_get_accepted: MessageCallback = Arc::new(move |payload| {
            let this = this.clone();
            tokio::spawn(async move { this.handle_get_accepted_message(payload).await });
        });
        self.subscribe_with_retry(&get_accepted_topic, on_get_accepted).await;
        if self.cancel.is_cancelled() {
            return;
        }

        if let Err(err) = self.publish_get_request().await {
            tracing::warn!(error = %err, "failed to publish initial get-shadow request");
        }
    }

    /// Subscribe to `topic`, retrying indefinitely (`120s + jitter(0..10s)`
    /// between attempts) on transport failure or a 60s subscribe timeout,
    /// until it succeeds or cancellation is signaled.
    async fn subscribe_with_retry(&self, topic: &str, callback: MessageCallback) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let attempt = tokio::time::timeout(SUBSCRIBE_TIMEOUT, self.transport.subscribe(topic, callback.clone())).await;
            match attempt {
                Ok(Ok(())) => {
                    tracing::info!(topic, "subscribed to shadow topic");
                    return;
                }
                Ok(Err(err)) => {
                    tracing::warn!(topic, error = %err, "shadow topic subscribe failed, retrying");
                }
                Err(_) => {
                    let err = MonitorError::TimeoutError;
                    tracing::warn!(topic, error = %err, "shadow topic subscribe timed out, retrying");
                }
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..10_000));
            tokio::select! {
                _ = tokio::time::sleep(SUBSCRIBE_RETRY_BASE + jitter) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn handle_delta_message(&self, payload: Vec<u8>) {
        match serde_json::from_slice::<ShadowDeltaMessage>(&payload) {
            Ok(msg) => {
                self.enqueue(PendingShadowRequest {
                    version: msg.version,
                    desired_state: msg.state,
                })
                .await;
            }
            Err(err) => tracing::warn!(error = %err, "dropping malformed shadow delta message"),
        }
    }

    async fn handle_get_accepted_message(&self, payload: Vec<u8>) {
        match serde_json::from_slice::<ShadowGetAcceptedMessage>(&payload) {
            Ok(msg) => {
                self.enqueue(PendingShadowRequest {
                    version: msg.version,
                    desired_state: msg.state.desired,
                })
                .await;
            }
            Err(err) => tracing::warn!(error = %err, "dropping malformed shadow get-accepted message"),
        }
    }

    /// Single-slot enqueue: "higher version wins, otherwise drop".
    async fn enqueue(&self, incoming: PendingShadowRequest) {
        let mut slot = self.pending.lock().await;
        let current = slot.take();
        *slot = Some(PendingShadowRequest::merge(current, incoming));
    }

    async fn processing_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.processing_delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => return,
            }
            self.process_tick().await;
        }
    }

    /// One processing-worker iteration, per distilled-spec §4.5. Exposed
    /// directly (rather than only through the periodic loop) so tests can
    /// drive it deterministically.
    pub async fn process_tick(&self) {
        let request = {
            let mut slot = self.pending.lock().await;
            slot.take()
        };
        let Some(request) = request else {
            return;
        };

        let last_cis_version = self.state.lock().await.last_cis_version;
        if request.version <= last_cis_version {
            // Already reconciled at this version (or an out-of-order redelivery
            // of an older one, possible under QoS-1 at-least-once delivery) —
            // converge the reported state without regenerating or moving
            // `last_cis_version` backward.
            self.publish_reported(&request).await;
            return;
        }

        let infos = match RetryRunner::run_with_retry(
            || async { self.connectivity.get_connectivity_info().await },
            &self.retry_config,
            "get_connectivity_info",
            &self.cancel,
        )
        .await
        {
            Ok(infos) => infos,
            Err(MonitorError::Cancelled) => {
                tracing::info!("shadow processing cancelled while fetching connectivity info");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "connectivity lookup failed, shadow version not advanced; will retry on next event");
                return;
            }
        };

        let new_hosts = dedupe_preserve_order(infos.into_iter().map(|i| i.host_address));

        let hosts_changed = {
            let mut state = self.state.lock().await;
            let changed = state.last_host_addresses.as_deref() != Some(new_hosts.as_slice());
            state.last_host_addresses = Some(new_hosts.clone());
            changed
        };

        if hosts_changed {
            for certgen in &self.certgens {
                let hosts = new_hosts.clone();
                let subject = certgen.subject().to_string();
                let result = certgen
                    .generate(&self.store, move || hosts, "connectivity info was updated")
                    .await;
                if let Err(err) = result {
                    tracing::warn!(subject, error = %err, "certificate regeneration failed, shadow version not advanced");
                    return;
                }
            }
        }

        self.publish_reported(&request).await;
        self.state.lock().await.last_cis_version = request.version;
    }

    /// Publish `{thingName, version, state.reported}`, echoing the request's
    /// desired state back as reported. Failures are logged, never retried
    /// inline — the next shadow event reconciles.
    async fn publish_reported(&self, request: &PendingShadowRequest) {
        let body = UpdateShadowRequest {
            thing_name: self.thing_name.clone(),
            version: request.version,
            state: UpdateShadowReportedState {
                reported: request.desired_state.clone(),
            },
        };
        match serde_json::to_vec(&body) {
            Ok(payload) => {
                if let Err(err) = self.transport.publish(&self.topic_update(), payload).await {
                    tracing::warn!(error = %err, "failed to publish reported shadow state; next shadow event will reconcile");
                }
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize reported shadow state"),
        }
    }

    async fn publish_get_request(&self) -> MonitorResult<()> {
        self.transport.publish(&self.topic_get(), Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::builder as ca_builder;
    use crate::ca::gen::IssuedChain;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock as StdRwLock;
    use trustedge_types::prelude::{CaAlgorithm, CertProfile, ConnectivityInfo, ValidityPolicy};

    use crate::monitor::connectivity::{CachingConnectivityProvider, ConnectivityProvider};
    use crate::monitor::transport::InMemoryShadowTransport;

    /// Test-only connectivity double whose host list can be swapped mid-test,
    /// unlike `FixedConnectivityProvider`, to model scenario 2 (two deltas
    /// arriving against two distinct host sets on the same monitor).
    #[derive(Default)]
    struct SwitchableConnectivityProvider {
        infos: StdRwLock<Vec<ConnectivityInfo>>,
    }

    impl SwitchableConnectivityProvider {
        fn set(&self, hosts: &[&str]) {
            *self.infos.write().unwrap() = hosts
                .iter()
                .map(|h| ConnectivityInfo {
                    host_address: h.to_string(),
                    port: 8883,
                    id: "primary".to_string(),
                    metadata: Default::default(),
                })
                .collect();
        }
    }

    #[async_trait]
    impl ConnectivityProvider for SwitchableConnectivityProvider {
        async fn get_connectivity_info(&self) -> MonitorResult<Vec<ConnectivityInfo>> {
            Ok(self.infos.read().unwrap().clone())
        }
    }

    async fn fixture(hosts: &[&str]) -> (Arc<ShadowMonitor>, Arc<InMemoryShadowTransport>, Arc<AtomicUsize>, Arc<SwitchableConnectivityProvider>) {
        let dir = tempfile::tempdir().unwrap();
        let passphrase = trustedge_core::generate_passphrase();
        let store = Arc::new(CertStore::update(dir.path(), &passphrase, CaAlgorithm::EcdsaP256).unwrap());

        let provider = Arc::new(SwitchableConnectivityProvider::default());
        provider.set(hosts);
        let connectivity = Arc::new(CachingConnectivityProvider::new(provider.clone() as Arc<dyn ConnectivityProvider>));

        let generate_calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = generate_calls.clone();
        let key_pair = ca_builder::generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let certgen = Arc::new(CertGen::new(
            "device-1",
            CertProfile::Server,
            key_pair,
            ValidityPolicy::server_default(),
            604_800,
            Arc::new(move |_chain: IssuedChain| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        let transport = Arc::new(InMemoryShadowTransport::new());
        let monitor = Arc::new(ShadowMonitor::new(
            "thing-1",
            transport.clone() as Arc<dyn ShadowTransport>,
            connectivity,
            store,
            vec![certgen],
            Duration::from_secs(5),
        ));

        (monitor, transport, generate_calls, provider)
    }

    fn request(version: u64, key: &str, value: i64) -> PendingShadowRequest {
        PendingShadowRequest {
            version,
            desired_state: serde_json::from_value(serde_json::json!({ key: value })).unwrap(),
        }
    }

    #[tokio::test]
    async fn duplicate_version_publishes_without_regenerating() {
        let (monitor, _transport, calls, _provider) = fixture(&["10.0.0.1"]).await;

        monitor.enqueue(request(5, "test", 1)).await;
        monitor.process_tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.last_processed_version().await, 5);

        monitor.enqueue(request(5, "test", 1)).await;
        monitor.process_tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "duplicate version must not regenerate");
        assert_eq!(monitor.last_processed_version().await, 5);
    }

    #[tokio::test]
    async fn out_of_order_redelivery_of_an_older_version_does_not_regress_last_cis_version() {
        let (monitor, _transport, calls, provider) = fixture(&["10.0.0.1"]).await;

        monitor.enqueue(request(5, "test", 1)).await;
        monitor.process_tick().await;
        assert_eq!(monitor.last_processed_version().await, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A stale QoS-1 redelivery of an already-superseded version arrives
        // after the slot has been drained; even with a changed host set it
        // must not regenerate or move last_cis_version backward.
        provider.set(&["10.0.0.99"]);
        monitor.enqueue(request(3, "test", 1)).await;
        monitor.process_tick().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "stale version must not regenerate");
        assert_eq!(monitor.last_processed_version().await, 5, "last_cis_version must not move backward");
    }

    #[tokio::test]
    async fn unchanged_host_set_skips_regeneration() {
        let (monitor, _transport, calls, _provider) = fixture(&["10.0.0.1"]).await;

        monitor.enqueue(request(1, "test", 1)).await;
        monitor.process_tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        monitor.enqueue(request(2, "test", 1)).await;
        monitor.process_tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "unchanged host set must not trigger generate");
        assert_eq!(monitor.last_processed_version().await, 2);
        assert_eq!(monitor.last_host_addresses().await, Some(vec!["10.0.0.1".to_string()]));
    }

    #[tokio::test]
    async fn rapid_deltas_collapse_to_latest_version() {
        let (monitor, _transport, calls, _provider) = fixture(&["10.0.0.1"]).await;

        for version in [1u64, 2, 3] {
            monitor.enqueue(request(version, "host", version as i64)).await;
        }

        monitor.process_tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.last_processed_version().await, 3);
    }

    #[tokio::test]
    async fn two_deltas_with_distinct_host_sets_regenerate_in_version_order() {
        let (monitor, _transport, calls, provider) = fixture(&["10.0.0.1"]).await;

        monitor.enqueue(request(1, "test", 1)).await;
        monitor.process_tick().await;
        assert_eq!(monitor.last_processed_version().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        provider.set(&["10.0.0.2"]);
        monitor.enqueue(request(2, "test", 2)).await;
        monitor.process_tick().await;
        assert_eq!(monitor.last_processed_version().await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.last_host_addresses().await, Some(vec!["10.0.0.2".to_string()]));
    }

    #[tokio::test]
    async fn cold_start_subscribes_and_reconciles_first_get_response() {
        let (monitor, transport, calls, _provider) = fixture(&["10.0.0.1"]).await;
        let handles = monitor.clone().start();

        // Wait for the subscribe worker to register both topics and publish
        // the initial get-shadow request.
        for _ in 0..100 {
            if !transport.published_messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(transport
            .published_messages()
            .iter()
            .any(|(topic, _)| topic.ends_with("/shadow/get")));

        transport.inject_message(
            "$aws/things/thing-1-gci/shadow/get/accepted",
            serde_json::to_vec(&serde_json::json!({
                "version": 1,
                "state": { "desired": {"test": 1}, "reported": {} },
            }))
            .unwrap(),
        );

        // handle_get_accepted_message spawns onto the runtime; give it a
        // moment before driving the processing loop.
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.process_tick().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.last_processed_version().await, 1);
        assert!(transport
            .published_messages()
            .iter()
            .any(|(topic, _)| topic.ends_with("/shadow/update")));

        monitor.stop().await;
        handles.processing.abort();
        handles.subscribe.abort();
    }
}

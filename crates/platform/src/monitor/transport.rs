//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! The pub/sub transport boundary `ShadowMonitor` talks through, plus an
//! in-memory reference implementation for local testing and single-node
//! deployments where no MQTT broker is present.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::error::{MonitorError, MonitorResult};

pub type MessageCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
pub type ConnectionResumedCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Publish/subscribe transport consumed by `ShadowMonitor`. All QoS-1;
/// `subscribe` completes once the broker acks. Mirrors the host runtime's
/// raw pub/sub client, which is otherwise out of scope.
#[async_trait]
pub trait ShadowTransport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MonitorResult<()>;
    async fn subscribe(&self, topic: &str, on_message: MessageCallback) -> MonitorResult<()>;
    async fn unsubscribe(&self, topic: &str) -> MonitorResult<()>;

    /// Register the connection-resumed observer. Implementations invoke it
    /// whenever the underlying connection comes back up (`session_present`
    /// mirrors the MQTT CONNACK flag).
    fn set_connection_resumed_callback(&self, callback: ConnectionResumedCallback);
}

/// In-memory transport: publishes are recorded for assertions, subscriptions
/// are tracked in a topic map, and tests drive message delivery via
/// `inject_message` / `trigger_connection_resumed` rather than a real
/// broker.
#[derive(Default)]
pub struct InMemoryShadowTransport {
    subscribers: Mutex<HashMap<String, Vec<MessageCallback>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    resumed_callback: Mutex<Option<ConnectionResumedCallback>>,
}

impl InMemoryShadowTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(topic, payload)` pairs published so far, oldest first.
    pub fn published_messages(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().expect("lock poisoned").clone()
    }

    /// Deliver `payload` to every callback subscribed to `topic`.
    pub fn inject_message(&self, topic: &str, payload: Vec<u8>) {
        let callbacks = self
            .subscribers
            .lock()
            .expect("lock poisoned")
            .get(topic)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(payload.clone());
        }
    }

    pub fn trigger_connection_resumed(&self, session_present: bool) {
        if let Some(callback) = self.resumed_callback.lock().expect("lock poisoned").clone() {
            callback(session_present);
        }
    }
}

#[async_trait]
impl ShadowTransport for InMemoryShadowTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MonitorResult<()> {
        self.published
            .lock()
            .map_err(|_| MonitorError::TransportError("publish lock poisoned".to_string()))?
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, on_message: MessageCallback) -> MonitorResult<()> {
        self.subscribers
            .lock()
            .map_err(|_| MonitorError::TransportError("subscribe lock poisoned".to_string()))?
            .entry(topic.to_string())
            .or_default()
            .push(on_message);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> MonitorResult<()> {
        self.subscribers
            .lock()
            .map_err(|_| MonitorError::TransportError("unsubscribe lock poisoned".to_string()))?
            .remove(topic);
        Ok(())
    }

    fn set_connection_resumed_callback(&self, callback: ConnectionResumedCallback) {
        *self.resumed_callback.lock().expect("lock poisoned") = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn injected_message_reaches_subscriber() {
        let transport = InMemoryShadowTransport::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        transport
            .subscribe("topic/a", Arc::new(move |_payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        transport.inject_message("topic/a", b"hello".to_vec());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let transport = InMemoryShadowTransport::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        transport
            .subscribe("topic/a", Arc::new(move |_payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        transport.unsubscribe("topic/a").await.unwrap();
        transport.inject_message("topic/a", b"hello".to_vec());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_is_recorded() {
        let transport = InMemoryShadowTransport::new();
        transport.publish("topic/b", b"payload".to_vec()).await.unwrap();
        assert_eq!(transport.published_messages(), vec![("topic/b".to_string(), b"payload".to_vec())]);
    }
}

//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! AWS IoT Device Shadow wire shapes and the single-slot pending-request
//! type consumed by the shadow monitor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Local view of a shadow document's `desired`/`reported` halves plus its
/// optimistic-locking version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowState {
    pub version: u64,
    #[serde(default)]
    pub desired: Map<String, Value>,
    #[serde(default)]
    pub reported: Map<String, Value>,
}

/// Payload of a `.../shadow/update/delta` message: `state` here *is* the
/// delta (desired minus reported), not a `{desired, reported, delta}` triple.
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowDeltaMessage {
    pub version: u64,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Payload of a `.../shadow/get/accepted` message.
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowGetAcceptedMessage {
    pub version: u64,
    #[serde(default)]
    pub state: ShadowGetAcceptedState,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShadowGetAcceptedState {
    #[serde(default)]
    pub desired: Map<String, Value>,
    #[serde(default)]
    pub reported: Map<String, Value>,
}

/// Body published to `.../shadow/update` to converge reported state.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateShadowRequest {
    #[serde(rename = "thingName")]
    pub thing_name: String,
    pub version: u64,
    pub state: UpdateShadowReportedState,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateShadowReportedState {
    pub reported: Map<String, Value>,
}

/// The single outstanding shadow-processing request. At most one may be
/// pending at a time; `merge` implements the "higher version wins, otherwise
/// drop" rule from the distilled spec.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingShadowRequest {
    pub version: u64,
    pub desired_state: Map<String, Value>,
}

impl PendingShadowRequest {
    /// Merge an incoming request into the current slot, keeping whichever of
    /// the two carries the higher version. A `current` of `None` always
    /// accepts `incoming`.
    pub fn merge(current: Option<Self>, incoming: Self) -> Self {
        match current {
            Some(existing) if existing.version >= incoming.version => existing,
            _ => incoming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(version: u64) -> PendingShadowRequest {
        PendingShadowRequest {
            version,
            desired_state: Map::new(),
        }
    }

    #[test]
    fn merge_replaces_slot_when_incoming_is_newer() {
        let merged = PendingShadowRequest::merge(Some(req(1)), req(2));
        assert_eq!(merged.version, 2);
    }

    #[test]
    fn merge_keeps_slot_when_incoming_is_older_or_equal() {
        let merged = PendingShadowRequest::merge(Some(req(3)), req(2));
        assert_eq!(merged.version, 3);
        let merged = PendingShadowRequest::merge(Some(req(3)), req(3));
        assert_eq!(merged.version, 3);
    }

    #[test]
    fn merge_accepts_incoming_when_slot_is_empty() {
        let merged = PendingShadowRequest::merge(None, req(5));
        assert_eq!(merged.version, 5);
    }

    #[test]
    fn three_rapid_deltas_collapse_to_the_latest() {
        let mut slot: Option<PendingShadowRequest> = None;
        for version in [1, 2, 3] {
            slot = Some(PendingShadowRequest::merge(slot, req(version)));
        }
        assert_eq!(slot.unwrap().version, 3);
    }

    #[test]
    fn delta_message_deserializes() {
        let json = r#"{"version":1,"state":{"test":1},"timestamp":1690000000}"#;
        let msg: ShadowDeltaMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.version, 1);
        assert_eq!(msg.state.get("test").unwrap(), 1);
    }

    #[test]
    fn get_accepted_message_deserializes() {
        let json = r#"{"version":1,"state":{"desired":{"test":1},"reported":{}}}"#;
        let msg: ShadowGetAcceptedMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.version, 1);
        assert_eq!(msg.state.desired.get("test").unwrap(), 1);
    }
}

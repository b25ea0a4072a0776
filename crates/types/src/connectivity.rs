//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Cloud connectivity-API wire types.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single reachable endpoint for this device, as published by the cloud
/// connectivity API (`GetConnectivityInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityInfo {
    #[serde(rename = "hostAddress")]
    pub host_address: String,
    pub port: u16,
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let info = ConnectivityInfo {
            host_address: "10.0.0.1".to_string(),
            port: 8883,
            id: "primary".to_string(),
            metadata: HashMap::new(),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"hostAddress\""));
        let round_tripped: ConnectivityInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, round_tripped);
    }
}

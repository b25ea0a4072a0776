//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Runtime configuration for the edge CA agent, loaded from environment
//! variables in the same style as the rest of the TrustEdge workspace.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use trustedge_core::Secret;
use trustedge_types::prelude::CaAlgorithm;

/// Runtime configuration for the edge CA agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Thing identity used to namespace the shadow topics (`{thing}-gci`).
    pub thing_name: String,
    /// CA key algorithm: `RSA_2048` or `ECDSA_P256`.
    pub ca_type: CaAlgorithm,
    /// Directory holding `ca.jks`, `ca.pem`, and `devices/`.
    pub workdir: PathBuf,
    /// CA keystore passphrase. Generated on first boot if not given.
    pub ca_passphrase: Option<Secret<String>>,
    /// Server leaf validity, clamped to `[172800, 864000]` seconds.
    pub server_cert_validity_seconds: u64,
    /// Client leaf validity in seconds.
    pub client_cert_validity_seconds: u64,
    /// `ExpiryMonitor` tick interval.
    pub expiry_monitor_interval: Duration,
    /// `ShadowMonitor` processing-loop fixed delay. Must be `> 0`.
    pub shadow_processing_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let thing_name = env::var("THING_NAME").unwrap_or_else(|_| "greengrass-core".to_string());

        let ca_type = match env::var("CA_TYPE").unwrap_or_else(|_| "ECDSA_P256".to_string()).as_str() {
            "RSA_2048" => CaAlgorithm::Rsa2048,
            "ECDSA_P256" => CaAlgorithm::EcdsaP256,
            other => return Err(anyhow!("unknown CA_TYPE {other:?}, expected RSA_2048 or ECDSA_P256")),
        };

        let workdir = env::var("CA_WORKDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/trustedge/ca"));

        let ca_passphrase = env::var("CA_PASSPHRASE").ok().map(Secret::new);

        let server_cert_validity_seconds = env::var("SERVER_CERT_VALIDITY_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(604_800);

        let client_cert_validity_seconds = env::var("CLIENT_CERT_VALIDITY_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(604_800);

        let expiry_monitor_interval_seconds: u64 = env::var("EXPIRY_MONITOR_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let shadow_processing_delay_seconds: u64 = env::var("SHADOW_PROCESSING_DELAY_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        if shadow_processing_delay_seconds == 0 {
            return Err(anyhow!("SHADOW_PROCESSING_DELAY_SECONDS must be > 0"));
        }

        Ok(Config {
            thing_name,
            ca_type,
            workdir,
            ca_passphrase,
            server_cert_validity_seconds,
            client_cert_validity_seconds,
            expiry_monitor_interval: Duration::from_secs(expiry_monitor_interval_seconds),
            shadow_processing_delay: Duration::from_secs(shadow_processing_delay_seconds),
        })
    }
}

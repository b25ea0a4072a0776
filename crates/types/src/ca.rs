//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Certificate-authority domain types: key algorithm, leaf profile, SAN
//! entries, and validity policy.

use std::net::IpAddr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CA and leaf key algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CaAlgorithm {
    Rsa2048,
    EcdsaP256,
}

/// Which extended-key-usage profile a leaf certificate is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CertProfile {
    Server,
    Client,
}

/// A single Subject-Alternative-Name entry, already classified as IP or DNS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SanEntry {
    Ip(IpAddr),
    Dns(String),
}

/// Lower/upper/default bounds (in seconds) on certificate validity.
///
/// `clamp` implements the boundary behavior from the distilled spec: a
/// requested validity below `min_seconds` or above `max_seconds` is pulled
/// back to the nearest bound rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidityPolicy {
    pub min_seconds: u64,
    pub max_seconds: u64,
    pub default_seconds: u64,
}

impl ValidityPolicy {
    /// Server leaf validity: clamped to [2 days, 10 days], default 7 days.
    pub fn server_default() -> Self {
        Self {
            min_seconds: 172_800,
            max_seconds: 864_000,
            default_seconds: 604_800,
        }
    }

    /// Client leaf validity: constant 7 days in the current policy.
    pub fn client_default() -> Self {
        Self {
            min_seconds: 604_800,
            max_seconds: 604_800,
            default_seconds: 604_800,
        }
    }

    /// Clamp a requested validity (in seconds) into `[min_seconds, max_seconds]`.
    pub fn clamp(&self, requested_seconds: u64) -> u64 {
        requested_seconds.clamp(self.min_seconds, self.max_seconds)
    }
}

//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Shared wire types for the TrustEdge edge CA agent.
//!
//! This crate provides the canonical type definitions shared by the
//! certificate-issuance core and the shadow-connectivity monitor: CA
//! algorithm selection, certificate profiles, typed Subject-Alternative-Name
//! entries, cloud connectivity info, and the AWS IoT Device Shadow wire
//! shapes. Types are serializable via serde and have JSON schema support via
//! schemars.
//!
//! # Quick Start
//!
//! ```rust
//! use trustedge_types::prelude::*;
//!
//! let policy = ValidityPolicy::server_default();
//! assert_eq!(policy.clamp(100 * 86400), 10 * 86400);
//! ```

pub mod ca;
pub mod connectivity;
pub mod shadow;

pub mod prelude {
    pub use crate::ca::{CaAlgorithm, CertProfile, SanEntry, ValidityPolicy};
    pub use crate::connectivity::ConnectivityInfo;
    pub use crate::shadow::{PendingShadowRequest, ShadowState};
}

//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! TrustEdge Platform — the certificate-lifecycle core of an edge device
//! that runs a local certificate authority.
//!
//! - [`ca`]: the local CA itself — keystore, pure cert-building functions,
//!   and the stateful per-subject certificate generator.
//! - [`monitor`]: the two things that decide *when* to call back into `ca` —
//!   an expiry-driven poller and a cloud-shadow-driven connectivity watcher
//!   — plus the retry helper both of them lean on.
//! - [`config`]: environment-sourced runtime configuration.

pub mod ca;
pub mod config;
pub mod monitor;

pub use config::Config;

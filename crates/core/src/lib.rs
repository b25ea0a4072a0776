//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

#![cfg_attr(docsrs, feature(doc_cfg))]

//! # TrustEdge Core
//!
//! Secret handling and small cryptographic primitives shared by the TrustEdge
//! edge agent: a CSPRNG-backed passphrase and serial-number generator, and a
//! `Secret<T>` wrapper that keeps sensitive values out of logs and serialized
//! output.
//!
//! ## Quick Start
//!
//! ```rust
//! use trustedge_core::{generate_passphrase, Secret};
//!
//! let passphrase: Secret<String> = generate_passphrase();
//! assert_eq!(passphrase.expose_secret().len(), 16);
//! ```

pub mod crypto;
pub mod secret;

pub use crypto::{generate_passphrase, generate_serial};
pub use secret::Secret;

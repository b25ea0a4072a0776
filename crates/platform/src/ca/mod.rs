//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! The local certificate authority: keystore, pure cert-building functions,
//! and the stateful per-subject certificate generator.

pub mod builder;
pub mod error;
pub mod gen;
pub mod san;
pub mod store;

pub use builder::CertBuilder;
pub use error::CaError;
pub use gen::CertGen;
pub use store::CertStore;

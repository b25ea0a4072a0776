//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Error kinds for the CA: a keystore failure and a cert-generation failure,
//! each fatal for the call but not for the process.

use thiserror::Error;

pub type CaResult<T> = Result<T, CaError>;

#[derive(Error, Debug)]
pub enum CaError {
    /// CA load/generate/persist failure. Callers treat this as fatal for the
    /// current invocation but may retry it later.
    #[error("CA keystore error: {0}")]
    KeyStore(String),

    /// Signing or PEM/CSR encoding failure.
    #[error("certificate generation error: {0}")]
    CertGen(String),
}

impl CaError {
    pub fn key_store(cause: impl std::fmt::Display) -> Self {
        Self::KeyStore(cause.to_string())
    }

    pub fn cert_gen(cause: impl std::fmt::Display) -> Self {
        Self::CertGen(cause.to_string())
    }
}

impl From<std::io::Error> for CaError {
    fn from(err: std::io::Error) -> Self {
        Self::KeyStore(err.to_string())
    }
}

impl From<rcgen::Error> for CaError {
    fn from(err: rcgen::Error) -> Self {
        Self::CertGen(err.to_string())
    }
}

//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `CertGen`: a stateful holder of `{subject, key pair, last issued cert,
//! validity policy}` that produces a new leaf certificate on demand and
//! notifies a consumer callback. Server and client variants are modeled as
//! one type tagged by [`CertProfile`] rather than two inheriting types.

use std::sync::Arc;
use std::time::Duration;

use rcgen::KeyPair;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use trustedge_types::prelude::{CertProfile, ValidityPolicy};

use super::builder;
use super::error::CaResult;
use super::store::CertStore;

/// Seconds of slack `should_regenerate` leaves before a cert's `not_after`.
const REGENERATE_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// A freshly issued certificate, PEM-encoded, with its validity window.
#[derive(Debug, Clone)]
pub struct IssuedCert {
    pub pem: String,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// What a `CertGen` hands to its consumer callback: a bare leaf for server
/// certs, or `[leaf, ca]` for client certs.
#[derive(Debug, Clone)]
pub enum IssuedChain {
    Leaf(String),
    LeafAndCa(String, String),
}

/// `fn(chain_or_leaf)` consumer — no subscription framework needed.
pub type ConsumerCallback = Arc<dyn Fn(IssuedChain) + Send + Sync>;

#[derive(Default)]
struct CertGenState {
    last_issued: Option<IssuedCert>,
}

pub struct CertGen {
    subject: String,
    profile: CertProfile,
    key_pair: KeyPair,
    validity_seconds: u64,
    consumer_callback: ConsumerCallback,
    state: Mutex<CertGenState>,
}

impl CertGen {
    /// Build a new `CertGen`. `requested_validity_seconds` is clamped against
    /// `policy` immediately, so later reads of `validity_seconds` never need
    /// to re-clamp.
    pub fn new(
        subject: impl Into<String>,
        profile: CertProfile,
        key_pair: KeyPair,
        policy: ValidityPolicy,
        requested_validity_seconds: u64,
        consumer_callback: ConsumerCallback,
    ) -> Self {
        Self {
            subject: subject.into(),
            profile,
            key_pair,
            validity_seconds: policy.clamp(requested_validity_seconds),
            consumer_callback,
            state: Mutex::new(CertGenState::default()),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn profile(&self) -> CertProfile {
        self.profile
    }

    /// Compute and install a new certificate. Serialized per `CertGen` via
    /// the internal mutex — concurrent callers to the same `CertGen` queue
    /// up rather than race; distinct `CertGen`s may generate in parallel.
    ///
    /// CPU-bound signing runs on a blocking-pool thread so it never stalls
    /// the async executor backing transport callbacks.
    pub async fn generate<F>(
        &self,
        store: &CertStore,
        host_address_supplier: F,
        reason: &str,
    ) -> CaResult<()>
    where
        F: FnOnce() -> Vec<String> + Send + 'static,
    {
        tracing::info!(subject = %self.subject, reason, "regenerating certificate");
        let mut state = self.state.lock().await;

        let ca_cert = store.ca_certificate()?;
        let ca_key = store.ca_private_key()?;
        let subject = self.subject.clone();
        let profile = self.profile;
        let validity_seconds = self.validity_seconds;
        let key_pair_der = self.key_pair.serialize_der();
        let signature_alg = builder::signature_algorithm(store.algorithm());

        let (pem, chain, not_before, not_after) = tokio::task::spawn_blocking(
            move || -> CaResult<(String, IssuedChain, OffsetDateTime, OffsetDateTime)> {
                let key_pair = KeyPair::from_der_and_sign_algo(&key_pair_der, signature_alg)
                    .map_err(super::error::CaError::from)?;
                let now = OffsetDateTime::now_utc();
                let not_before = now;
                let not_after = now + Duration::from_secs(validity_seconds);

                match profile {
                    CertProfile::Server => {
                        let hosts = host_address_supplier();
                        let cert = builder::sign_server_cert(
                            &ca_cert, &ca_key, &key_pair, &subject, &hosts, not_before, not_after,
                        )?;
                        let pem = builder::pem_encode(&cert);
                        Ok((pem.clone(), IssuedChain::Leaf(pem), not_before, not_after))
                    }
                    CertProfile::Client => {
                        let cert = builder::sign_client_cert(
                            &ca_cert, &ca_key, &key_pair, &subject, not_before, not_after,
                        )?;
                        let pem = builder::pem_encode(&cert);
                        let ca_pem = builder::pem_encode(&ca_cert);
                        Ok((pem.clone(), IssuedChain::LeafAndCa(pem, ca_pem), not_before, not_after))
                    }
                }
            },
        )
        .await
        .map_err(|err| super::error::CaError::cert_gen(format!("signing task panicked: {err}")))??;

        state.last_issued = Some(IssuedCert { pem, not_before, not_after });
        drop(state);

        (self.consumer_callback)(chain);
        Ok(())
    }

    /// `last_issued is None` OR `now >= not_after` OR `now + 24h > not_after`.
    pub async fn should_regenerate(&self) -> bool {
        let state = self.state.lock().await;
        match &state.last_issued {
            None => true,
            Some(issued) => {
                let now = OffsetDateTime::now_utc();
                now >= issued.not_after || now + REGENERATE_HORIZON > issued.not_after
            }
        }
    }

    /// `last_issued.not_after`, or `None` if nothing has ever been issued —
    /// `ExpiryMonitor` treats `None` as sorting before every real instant.
    pub async fn expiry_time(&self) -> Option<OffsetDateTime> {
        self.state.lock().await.last_issued.as_ref().map(|i| i.not_after)
    }
}

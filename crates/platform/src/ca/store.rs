//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! `CertStore`: the CA's root key and certificate at rest, plus the
//! per-device certificate cache.
//!
//! The root key pair never leaves this module in plaintext form. It is kept
//! on disk in `<workdir>/ca.jks`, an AES-256-GCM container keyed by a
//! passphrase stretched through Argon2id — not a Java keystore file; the
//! name only echoes the layout Greengrass core devices expect to find on
//! disk. Alongside it, `<workdir>/ca.pem` carries a plaintext PEM copy of the
//! public CA certificate for distribution — the one piece of trust-bundle
//! distribution this store is responsible for. Device certificates are plain
//! PEM under `<workdir>/devices/`, since they carry no private key material
//! worth encrypting at rest.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use rcgen::{Certificate, CertificateParams, KeyPair};
use rand_core::{OsRng, RngCore};
use time::OffsetDateTime;
use trustedge_core::Secret;
use trustedge_types::prelude::CaAlgorithm;

use super::builder;
use super::error::{CaError, CaResult};

const KEYSTORE_FILE: &str = "ca.jks";
const CA_CERT_PEM_FILE: &str = "ca.pem";
const DEVICES_DIR: &str = "devices";
const MAGIC: &[u8; 4] = b"TJK1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Validity window of the self-signed root, chosen once at first boot.
const CA_VALIDITY_SECONDS: i64 = 5 * 365 * 24 * 60 * 60;

pub struct CertStore {
    workdir: PathBuf,
    algorithm: CaAlgorithm,
    ca_key_der: Vec<u8>,
    ca_cert_der: Vec<u8>,
}

impl CertStore {
    /// Load the existing keystore at `<workdir>/ca.jks` if it decrypts under
    /// `passphrase` and matches `algorithm`; otherwise generate a fresh root
    /// and persist it. Idempotent: repeated calls with the same passphrase
    /// and algorithm return an equivalent store without touching disk.
    pub fn update(
        workdir: &Path,
        passphrase: &Secret<String>,
        algorithm: CaAlgorithm,
    ) -> CaResult<Self> {
        fs::create_dir_all(workdir)?;
        set_owner_only_dir(workdir)?;

        let path = workdir.join(KEYSTORE_FILE);
        if let Ok(bytes) = fs::read(&path) {
            match decrypt_record(&bytes, passphrase.expose_secret()) {
                Ok(record) if record.algorithm == algorithm => {
                    tracing::info!(algorithm = ?algorithm, "loaded existing CA keystore");
                    return Ok(Self {
                        workdir: workdir.to_path_buf(),
                        algorithm,
                        ca_key_der: record.ca_key_der,
                        ca_cert_der: record.ca_cert_der,
                    });
                }
                Ok(record) => {
                    tracing::warn!(
                        stored = ?record.algorithm,
                        requested = ?algorithm,
                        "CA algorithm mismatch, discarding and regenerating keystore"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "CA keystore unreadable, regenerating");
                }
            }
        }

        let store = Self::generate(workdir, algorithm)?;
        let record = Record {
            algorithm,
            ca_cert_der: store.ca_cert_der.clone(),
            ca_key_der: store.ca_key_der.clone(),
        };
        let bytes = encrypt_record(&record, passphrase.expose_secret());
        fs::write(&path, bytes)?;
        set_owner_only_file(&path)?;

        let pem_path = workdir.join(CA_CERT_PEM_FILE);
        fs::write(&pem_path, builder::pem_encode(&store.ca_certificate()?))?;

        Ok(store)
    }

    fn generate(workdir: &Path, algorithm: CaAlgorithm) -> CaResult<Self> {
        tracing::info!(algorithm = ?algorithm, "generating new CA root");
        let key_pair = builder::generate_key_pair(algorithm)?;
        let not_before = OffsetDateTime::now_utc();
        let not_after = not_before + time::Duration::seconds(CA_VALIDITY_SECONDS);
        let cert = builder::create_ca_cert(&key_pair, not_before, not_after, builder::CA_COMMON_NAME)?;
        Ok(Self {
            workdir: workdir.to_path_buf(),
            algorithm,
            ca_key_der: key_pair.serialize_der(),
            ca_cert_der: cert.der().to_vec(),
        })
    }

    pub fn algorithm(&self) -> CaAlgorithm {
        self.algorithm
    }

    /// Reconstruct the CA's signing key pair from the stored DER.
    pub fn ca_private_key(&self) -> CaResult<KeyPair> {
        KeyPair::from_der_and_sign_algo(&self.ca_key_der, builder::signature_algorithm(self.algorithm))
            .map_err(CaError::from)
    }

    /// Reconstruct the CA's certificate, usable as the `issuer` argument to
    /// `CertificateParams::signed_by`.
    pub fn ca_certificate(&self) -> CaResult<Certificate> {
        let key_pair = self.ca_private_key()?;
        let params = CertificateParams::from_ca_cert_der(&self.ca_cert_der, &key_pair)
            .map_err(CaError::from)?;
        params.self_signed(&key_pair).map_err(CaError::from)
    }

    fn devices_dir(&self) -> PathBuf {
        self.workdir.join(DEVICES_DIR)
    }

    /// Write `pem` to `<workdir>/devices/<cert_id>.pem` unless it already
    /// exists. Returns whether a write happened.
    pub fn store_device_certificate_if_absent(&self, cert_id: &str, pem: &str) -> CaResult<bool> {
        let dir = self.devices_dir();
        fs::create_dir_all(&dir)?;
        set_owner_only_dir(&dir)?;
        let path = dir.join(format!("{cert_id}.pem"));
        if path.exists() {
            return Ok(false);
        }
        fs::write(&path, pem)?;
        set_owner_only_file(&path)?;
        Ok(true)
    }

    pub fn load_device_certificate(&self, cert_id: &str) -> CaResult<Option<String>> {
        let path = self.devices_dir().join(format!("{cert_id}.pem"));
        match fs::read_to_string(&path) {
            Ok(pem) => Ok(Some(pem)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CaError::from(err)),
        }
    }
}

struct Record {
    algorithm: CaAlgorithm,
    ca_cert_der: Vec<u8>,
    ca_key_der: Vec<u8>,
}

fn algorithm_tag(algorithm: CaAlgorithm) -> u8 {
    match algorithm {
        CaAlgorithm::Rsa2048 => 0,
        CaAlgorithm::EcdsaP256 => 1,
    }
}

fn algorithm_from_tag(tag: u8) -> CaResult<CaAlgorithm> {
    match tag {
        0 => Ok(CaAlgorithm::Rsa2048),
        1 => Ok(CaAlgorithm::EcdsaP256),
        other => Err(CaError::key_store(format!("unknown CA algorithm tag {other}"))),
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> CaResult<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|err| CaError::key_store(format!("key derivation failed: {err}")))?;
    Ok(key)
}

fn encrypt_record(record: &Record, passphrase: &str) -> Vec<u8> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(passphrase, &salt).expect("argon2 derivation with fixed output length cannot fail");
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut plaintext = Vec::with_capacity(1 + 8 + record.ca_cert_der.len() + record.ca_key_der.len());
    plaintext.push(algorithm_tag(record.algorithm));
    plaintext.extend_from_slice(&(record.ca_cert_der.len() as u32).to_be_bytes());
    plaintext.extend_from_slice(&record.ca_cert_der);
    plaintext.extend_from_slice(&(record.ca_key_der.len() as u32).to_be_bytes());
    plaintext.extend_from_slice(&record.ca_key_der);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .expect("AES-256-GCM encryption of a bounded in-memory buffer cannot fail");

    let mut out = Vec::with_capacity(MAGIC.len() + SALT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

fn decrypt_record(bytes: &[u8], passphrase: &str) -> CaResult<Record> {
    let header_len = MAGIC.len() + SALT_LEN + NONCE_LEN;
    if bytes.len() < header_len || &bytes[..MAGIC.len()] != MAGIC {
        return Err(CaError::key_store("not a recognized CA keystore file"));
    }
    let salt = &bytes[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let nonce_bytes = &bytes[MAGIC.len() + SALT_LEN..header_len];
    let ciphertext = &bytes[header_len..];

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CaError::key_store("wrong passphrase or corrupted keystore"))?;

    let mut cursor = 0usize;
    let algorithm = algorithm_from_tag(*plaintext.get(cursor).ok_or_else(|| CaError::key_store("truncated keystore"))?)?;
    cursor += 1;

    let cert_len = read_u32(&plaintext, cursor)?;
    cursor += 4;
    let ca_cert_der = plaintext
        .get(cursor..cursor + cert_len)
        .ok_or_else(|| CaError::key_store("truncated keystore"))?
        .to_vec();
    cursor += cert_len;

    let key_len = read_u32(&plaintext, cursor)?;
    cursor += 4;
    let ca_key_der = plaintext
        .get(cursor..cursor + key_len)
        .ok_or_else(|| CaError::key_store("truncated keystore"))?
        .to_vec();

    Ok(Record {
        algorithm,
        ca_cert_der,
        ca_key_der,
    })
}

fn read_u32(bytes: &[u8], at: usize) -> CaResult<usize> {
    let slice: [u8; 4] = bytes
        .get(at..at + 4)
        .ok_or_else(|| CaError::key_store("truncated keystore"))?
        .try_into()
        .expect("slice of length 4");
    Ok(u32::from_be_bytes(slice) as usize)
}

#[cfg(unix)]
fn set_owner_only_file(path: &Path) -> CaResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(CaError::from)
}

#[cfg(not(unix))]
fn set_owner_only_file(_path: &Path) -> CaResult<()> {
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_dir(path: &Path) -> CaResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(CaError::from)
}

#[cfg(not(unix))]
fn set_owner_only_dir(_path: &Path) -> CaResult<()> {
    Ok(())
}

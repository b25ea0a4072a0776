//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Pure, stateless certificate-building operations: CA self-signing, leaf
//! signing for the server and client profiles, PEM encode/decode, and CSR
//! assembly.
//!
//! Every issued certificate embeds the same fixed DN scaffolding
//! (`C=US, ST=Washington, L=Seattle, O=Amazon.com Inc., OU=Amazon Web
//! Services`) with only the common name varying.

use std::net::IpAddr;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber, SignatureAlgorithm,
};
use time::OffsetDateTime;
use trustedge_types::prelude::{CaAlgorithm, SanEntry};
use x509_parser::extensions::{GeneralName, ParsedExtension};

use super::error::{CaError, CaResult};
use super::san;

/// Fixed common name of the self-signed root certificate.
pub const CA_COMMON_NAME: &str = "Greengrass Core CA";

/// The result of parsing a PKCS#10 CSR back out.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCsr {
    pub common_name: String,
    pub sans: Vec<SanEntry>,
}

/// Map the CA's key algorithm to the `rcgen` signature-algorithm constant
/// used both for key generation and for the cert's own signature.
pub fn signature_algorithm(algorithm: CaAlgorithm) -> &'static SignatureAlgorithm {
    match algorithm {
        CaAlgorithm::Rsa2048 => &rcgen::PKCS_RSA_SHA256,
        CaAlgorithm::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
    }
}

/// Generate a fresh key pair for the given algorithm (RSA 2048 or NIST P256).
pub fn generate_key_pair(algorithm: CaAlgorithm) -> CaResult<KeyPair> {
    KeyPair::generate_for(signature_algorithm(algorithm)).map_err(CaError::from)
}

fn fixed_dn(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "US");
    dn.push(DnType::StateOrProvinceName, "Washington");
    dn.push(DnType::LocalityName, "Seattle");
    dn.push(DnType::OrganizationName, "Amazon.com Inc.");
    dn.push(DnType::OrganizationalUnitName, "Amazon Web Services");
    dn.push(DnType::CommonName, common_name);
    dn
}

/// Self-sign a new CA root certificate with `BasicConstraints: CA:true`.
pub fn create_ca_cert(
    key_pair: &KeyPair,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    common_name: &str,
) -> CaResult<Certificate> {
    let mut params = CertificateParams::new(Vec::new())?;
    params.distinguished_name = fixed_dn(common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params.not_before = not_before;
    params.not_after = not_after;
    params.serial_number = Some(SerialNumber::from(trustedge_core::generate_serial()));
    params.self_signed(key_pair).map_err(CaError::from)
}

/// Sign a server leaf. The SAN set is `host_addresses ∪ {"localhost"}`,
/// deduplicated and classified IP-vs-DNS by [`san::classify`].
pub fn sign_server_cert(
    ca_cert: &Certificate,
    ca_key: &KeyPair,
    subject_key_pair: &KeyPair,
    common_name: &str,
    host_addresses: &[String],
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> CaResult<Certificate> {
    let mut hosts = host_addresses.to_vec();
    hosts.push("localhost".to_string());
    let sans = san::classify_and_dedupe(&hosts);

    let mut params = CertificateParams::new(sans)?;
    params.distinguished_name = fixed_dn(common_name);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.not_before = not_before;
    params.not_after = not_after;
    params.serial_number = Some(SerialNumber::from(trustedge_core::generate_serial()));
    params
        .signed_by(subject_key_pair, ca_cert, ca_key)
        .map_err(CaError::from)
}

/// Sign a client leaf. No SAN; `EKU = clientAuth`.
pub fn sign_client_cert(
    ca_cert: &Certificate,
    ca_key: &KeyPair,
    subject_key_pair: &KeyPair,
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> CaResult<Certificate> {
    let mut params = CertificateParams::new(Vec::new())?;
    params.distinguished_name = fixed_dn(common_name);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.not_before = not_before;
    params.not_after = not_after;
    params.serial_number = Some(SerialNumber::from(trustedge_core::generate_serial()));
    params
        .signed_by(subject_key_pair, ca_cert, ca_key)
        .map_err(CaError::from)
}

/// RFC 7468 PEM encoding of a certificate (`-----BEGIN CERTIFICATE-----`).
pub fn pem_encode(cert: &Certificate) -> String {
    cert.pem()
}

/// Raw DER bytes contained in a `CERTIFICATE` PEM block, for round-trip
/// comparison against `cert.der()`.
pub fn pem_decode_cert_der(pem: &str) -> CaResult<Vec<u8>> {
    let (_, block) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| CaError::cert_gen(format!("invalid certificate PEM: {e}")))?;
    Ok(block.contents)
}

/// Assemble a PKCS#10 CSR (`CERTIFICATE REQUEST` PEM) carrying `common_name`
/// and the given IP/DNS SAN entries via the `extensionRequest` attribute.
pub fn create_csr(
    key_pair: &KeyPair,
    common_name: &str,
    ips: &[IpAddr],
    dns: &[String],
) -> CaResult<String> {
    let mut sans: Vec<String> = ips.iter().map(IpAddr::to_string).collect();
    sans.extend(dns.iter().cloned());

    let mut params = CertificateParams::new(sans)?;
    params.distinguished_name = fixed_dn(common_name);
    let csr = params.serialize_request(key_pair)?;
    Ok(csr.pem())
}

/// Parse a PKCS#10 CSR PEM back into its common name and SAN set.
pub fn pem_decode_csr(pem: &str) -> CaResult<DecodedCsr> {
    let (_, block) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| CaError::cert_gen(format!("invalid CSR PEM: {e}")))?;
    let (_, csr) = x509_parser::certification_request::X509CertificateRequest::from_der(
        &block.contents,
    )
    .map_err(|e| CaError::cert_gen(format!("invalid CSR DER: {e}")))?;

    let common_name = csr
        .certification_request_info
        .subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let sans = csr
        .certification_request_info
        .requested_extensions()
        .find_map(|ext| match ext {
            ParsedExtension::SubjectAlternativeName(san) => Some(san),
            _ => None,
        })
        .map(|san| {
            san.general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::IPAddress(octets) => ip_from_octets(octets).map(SanEntry::Ip),
                    GeneralName::DNSName(name) => Some(SanEntry::Dns((*name).to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(DecodedCsr { common_name, sans })
}

fn ip_from_octets(octets: &[u8]) -> Option<IpAddr> {
    match octets.len() {
        4 => {
            let bytes: [u8; 4] = octets.try_into().ok()?;
            Some(IpAddr::from(bytes))
        }
        16 => {
            let bytes: [u8; 16] = octets.try_into().ok()?;
            Some(IpAddr::from(bytes))
        }
        _ => None,
    }
}

/// Marker type grouping the free functions above under one doc path, mirroring
/// the distilled spec's "CertBuilder" component name.
pub struct CertBuilder;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    #[test]
    fn ca_cert_is_self_signed_and_marked_ca() {
        let key = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let cert = create_ca_cert(&key, now(), now() + Duration::from_secs(86400), CA_COMMON_NAME)
            .unwrap();
        assert!(!cert.pem().is_empty());
    }

    #[test]
    fn server_cert_round_trips_through_pem() {
        let ca_key = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let ca_cert =
            create_ca_cert(&ca_key, now(), now() + Duration::from_secs(86400), CA_COMMON_NAME)
                .unwrap();
        let leaf_key = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let leaf = sign_server_cert(
            &ca_cert,
            &ca_key,
            &leaf_key,
            "device-1",
            &["10.0.0.1".to_string(), "device.example.com".to_string()],
            now(),
            now() + Duration::from_secs(3600),
        )
        .unwrap();

        let pem = pem_encode(&leaf);
        let decoded_der = pem_decode_cert_der(&pem).unwrap();
        assert_eq!(decoded_der, leaf.der().to_vec());
    }

    #[test]
    fn csr_round_trips_subject_and_sans() {
        let key = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let pem = create_csr(
            &key,
            "device-1",
            &["10.0.0.1".parse().unwrap()],
            &["device.example.com".to_string()],
        )
        .unwrap();

        let decoded = pem_decode_csr(&pem).unwrap();
        assert_eq!(decoded.common_name, "device-1");
        assert!(decoded.sans.contains(&SanEntry::Ip("10.0.0.1".parse().unwrap())));
        assert!(decoded
            .sans
            .contains(&SanEntry::Dns("device.example.com".to_string())));
    }

    #[test]
    fn two_certs_in_the_same_process_have_different_serials() {
        let ca_key = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let ca_cert =
            create_ca_cert(&ca_key, now(), now() + Duration::from_secs(86400), CA_COMMON_NAME)
                .unwrap();
        let key_a = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let key_b = generate_key_pair(CaAlgorithm::EcdsaP256).unwrap();
        let cert_a = sign_client_cert(
            &ca_cert,
            &ca_key,
            &key_a,
            "client-a",
            now(),
            now() + Duration::from_secs(3600),
        )
        .unwrap();
        let cert_b = sign_client_cert(
            &ca_cert,
            &ca_key,
            &key_b,
            "client-b",
            now(),
            now() + Duration::from_secs(3600),
        )
        .unwrap();
        assert_ne!(cert_a.der(), cert_b.der());
    }
}

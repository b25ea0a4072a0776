//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Classifies a raw host-address string as an IP literal or a DNS name, and
//! reduces a host-address list to the deduplicated, order-preserving set of
//! canonical SAN strings `CertBuilder` feeds into `rcgen`.

use std::net::IpAddr;

use trustedge_types::prelude::SanEntry;

/// Classify one host-address string.
///
/// Accepts IPv4 dotted-quad and IPv6 (with or without `::` compression),
/// optionally bracketed and port-suffixed (`[::1]:8883`, `10.0.0.1:443`).
/// Anything that does not parse as an IP literal is treated as a DNS name.
pub fn classify(raw: &str) -> SanEntry {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let inner = &rest[..end];
            if let Ok(ip) = inner.parse::<IpAddr>() {
                return SanEntry::Ip(ip);
            }
        }
        return SanEntry::Dns(trimmed.to_string());
    }

    // A bare (unbracketed) string with more than one colon is only valid as
    // an IPv6 literal — there is no well-defined way to split off a port.
    if trimmed.matches(':').count() > 1 {
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return SanEntry::Ip(ip);
        }
        return SanEntry::Dns(trimmed.to_string());
    }

    if let Some((host, port)) = trimmed.rsplit_once(':') {
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return SanEntry::Ip(ip);
            }
        }
    }

    match trimmed.parse::<IpAddr>() {
        Ok(ip) => SanEntry::Ip(ip),
        Err(_) => SanEntry::Dns(trimmed.to_string()),
    }
}

/// Canonical string form of a classified entry, suitable for handing to
/// `rcgen::CertificateParams::new`.
pub fn canonical_string(entry: &SanEntry) -> String {
    match entry {
        SanEntry::Ip(ip) => ip.to_string(),
        SanEntry::Dns(name) => name.clone(),
    }
}

/// Classify and de-duplicate a host-address list (order-preserving, first
/// occurrence wins), returning the canonical strings ready for `rcgen`.
pub fn classify_and_dedupe(hosts: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for host in hosts {
        let entry = classify(host);
        let canonical = canonical_string(&entry);
        if seen.insert(canonical.clone()) {
            out.push(canonical);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ipv4_dotted_quad() {
        assert_eq!(classify("127.0.0.1"), SanEntry::Ip("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn accepts_compressed_ipv6_without_brackets() {
        assert_eq!(classify("::1"), SanEntry::Ip("::1".parse().unwrap()));
        assert_eq!(
            classify("2001:db8::1"),
            SanEntry::Ip("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn accepts_bracketed_port_suffixed_ipv6() {
        assert_eq!(classify("[::1]:8883"), SanEntry::Ip("::1".parse().unwrap()));
    }

    #[test]
    fn accepts_port_suffixed_ipv4() {
        assert_eq!(
            classify("10.0.0.1:443"),
            SanEntry::Ip("10.0.0.1".parse().unwrap())
        );
    }

    #[test]
    fn rejects_invalid_ipv4_as_dns_name() {
        assert_eq!(
            classify("999.999.999.999"),
            SanEntry::Dns("999.999.999.999".to_string())
        );
    }

    #[test]
    fn classifies_plain_hostname_as_dns() {
        assert_eq!(
            classify("device.example.com"),
            SanEntry::Dns("device.example.com".to_string())
        );
    }

    #[test]
    fn dedupe_preserves_first_occurrence_order() {
        let hosts = vec![
            "10.0.0.1".to_string(),
            "device.example.com".to_string(),
            "10.0.0.1".to_string(),
        ];
        assert_eq!(
            classify_and_dedupe(&hosts),
            vec!["10.0.0.1".to_string(), "device.example.com".to_string()]
        );
    }
}

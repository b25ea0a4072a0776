//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! CSPRNG-backed generation of CA passphrases and certificate serial numbers.

use crate::Secret;
use rand_core::{OsRng, RngCore};

/// Number of bytes drawn from the OS RNG to build a passphrase.
const PASSPHRASE_LEN: usize = 16;

/// Printable ASCII range used for generated passphrases: space (0x20) through `~` (0x7E).
const PRINTABLE_LO: u8 = b' ';
const PRINTABLE_HI: u8 = b'~';

/// Number of bytes in a certificate serial number (160 bits).
const SERIAL_LEN: usize = 20;

/// Generate a fresh CA keystore passphrase.
///
/// Draws `PASSPHRASE_LEN` bytes from the OS CSPRNG and maps each byte to a
/// printable ASCII character via `(b & 0x7F) mod ('~' - ' ') + ' '` — the
/// exact formula given in the distilled spec. The modulus is `'~' - ' ' =
/// 94`, not `95`, so the mapped range is `[' ', '}']`; `'~'` itself is never
/// produced. This is the spec's own formula taken literally over its looser
/// "0x20-0x7E" prose.
pub fn generate_passphrase() -> Secret<String> {
    let mut raw = [0u8; PASSPHRASE_LEN];
    OsRng.fill_bytes(&mut raw);
    let span = (PRINTABLE_HI - PRINTABLE_LO) as u16;
    let chars: String = raw
        .iter()
        .map(|b| PRINTABLE_LO + ((*b as u16 & 0x7F) % span) as u8)
        .map(|b| b as char)
        .collect();
    Secret::new(chars)
}

/// Generate a uniformly random 160-bit certificate serial number.
///
/// The high bit of the first byte is cleared so the value is never mistaken
/// for a negative integer by DER's two's-complement `INTEGER` encoding.
pub fn generate_serial() -> Vec<u8> {
    let mut raw = [0u8; SERIAL_LEN];
    OsRng.fill_bytes(&mut raw);
    raw[0] &= 0x7F;
    raw.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_is_printable_ascii() {
        let p = generate_passphrase();
        let exposed = p.expose_secret();
        assert_eq!(exposed.len(), PASSPHRASE_LEN);
        assert!(exposed
            .bytes()
            .all(|b| (PRINTABLE_LO..=PRINTABLE_HI).contains(&b)));
    }

    #[test]
    fn passphrases_are_not_constant() {
        let a = generate_passphrase();
        let b = generate_passphrase();
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn serial_is_160_bits_and_non_negative() {
        let serial = generate_serial();
        assert_eq!(serial.len(), SERIAL_LEN);
        assert_eq!(serial[0] & 0x80, 0);
    }

    #[test]
    fn serials_are_not_constant() {
        let a = generate_serial();
        let b = generate_serial();
        assert_ne!(a, b);
    }
}

//! Sofia credential digest.
//!
//! The devices never see the plaintext password; login sends an 8-character
//! token derived from it. The derivation is regular MD5 with the digest
//! bytes pairwise summed and mapped onto a 62-character alphabet.

use md5::{Digest, Md5};

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Computes the Sofia hash of a plaintext password.
///
/// Pure function; the result is the exact ASCII token transmitted in the
/// `PassWord` field of the login request.
pub fn sofia_hash(password: &str) -> String {
    let digest = Md5::digest(password.as_bytes());
    (0..8)
        .map(|i| {
            let sum = digest[2 * i] as usize + digest[2 * i + 1] as usize;
            ALPHABET[sum % ALPHABET.len()] as char
        })
        .collect()
}

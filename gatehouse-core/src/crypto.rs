//! Cryptographic utilities for token and IP handling
//!
//! Token values are high-entropy random strings, so SHA-256 is sufficient
//! where a digest is needed; the memory-hard KDF lives in [`crate::password`]
//! and is reserved for low-entropy secrets. Comparisons against stored
//! secrets go through constant-time equality to avoid timing side channels.

use std::net::IpAddr;

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a cryptographically secure random token.
///
/// Produces 256 bits of entropy encoded as URL-safe base64 (43 characters),
/// suitable for email-verification links, password-reset links, and magic
/// links.
///
/// # Panics
///
/// Panics if the OS random number generator fails. That indicates a system
/// failure (entropy source unavailable) from which no security-sensitive
/// operation can recover.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a 6-digit two-factor code, zero-padded.
pub fn generate_two_factor_code() -> String {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    let n = u32::from_be_bytes(bytes) % 1_000_000;
    format!("{n:06}")
}

/// Deterministic one-way digest of a requester's IP address.
///
/// The raw address is never persisted; the hex digest is used purely as an
/// equality key for abuse tracking.
pub fn hash_ip(addr: &IpAddr) -> String {
    let mut hasher = Sha256::new();
    hasher.update(addr.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

//! Versioned password hashing
//!
//! Hashes are stored as `version.saltHex.hashHex`, derived with
//! PBKDF2-HMAC-SHA256 (310k iterations, 16-byte random salt, 256-bit
//! output). [`verify_password`] never fails on malformed input: a legacy
//! bcrypt-style hash (`$2...` prefix) or a corrupted value reports
//! `needs_upgrade` so the affected account is forced through the reset flow
//! instead of silently mis-validating.

use pbkdf2::pbkdf2_hmac;
use rand::{TryRngCore, rngs::OsRng};
use sha2::Sha256;

use crate::{
    Error,
    crypto::constant_time_eq,
    error::CryptoError,
};

const CURRENT_VERSION: &str = "v1";
const ITERATIONS: u32 = 310_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Result of checking a password against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCheck {
    /// The password matched the stored hash.
    pub is_valid: bool,
    /// The stored hash uses a legacy or unknown format and the account must
    /// go through a password reset before it can authenticate again.
    pub needs_upgrade: bool,
}

/// Hash a password with the current scheme.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt).map_err(|e| {
        Error::Crypto(CryptoError::PasswordHash(format!(
            "OS RNG failure while generating salt: {e}"
        )))
    })?;

    let digest = derive(password, &salt);
    Ok(format!(
        "{CURRENT_VERSION}.{}.{}",
        hex::encode(salt),
        hex::encode(digest)
    ))
}

/// Verify a password against a stored hash.
///
/// A hash carrying the bcrypt marker prefix is never validated against the
/// current scheme; it reports `is_valid: false, needs_upgrade: true`, as does
/// any hash that fails to parse.
pub fn verify_password(password: &str, stored_hash: &str) -> PasswordCheck {
    if stored_hash.starts_with("$2") {
        return PasswordCheck {
            is_valid: false,
            needs_upgrade: true,
        };
    }

    let Some((version, salt, expected)) = parse_hash(stored_hash) else {
        return PasswordCheck {
            is_valid: false,
            needs_upgrade: true,
        };
    };

    let digest = derive(password, &salt);
    PasswordCheck {
        is_valid: constant_time_eq(&digest, &expected),
        needs_upgrade: version != CURRENT_VERSION,
    }
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, ITERATIONS, &mut out);
    out
}

fn parse_hash(stored_hash: &str) -> Option<(String, Vec<u8>, Vec<u8>)> {
    let mut parts = stored_hash.splitn(3, '.');
    let version = parts.next()?;
    let salt_hex = parts.next()?;
    let hash_hex = parts.next()?;
    if version.is_empty() || salt_hex.is_empty() || hash_hex.is_empty() {
        return None;
    }

    let salt = hex::decode(salt_hex).ok()?;
    let hash = hex::decode(hash_hex).ok()?;
    Some((version.to_string(), salt, hash))
}

//! Credential generation and hashing.
//!
//! Enrollment tokens are stored as an unsalted SHA-256 (the consume path looks
//! rows up by hash). Node API keys are stored salted; verification and every
//! other secret comparison is constant-time.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SECRET_BYTES: usize = 32;
const SALT_BYTES: usize = 16;

/// Generates a fresh random secret (token or API key), hex-encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Deterministic hash used as the lookup key for enrollment tokens.
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Salted hash for node API keys, stored as `salt$digest`.
pub fn hash_api_key(api_key: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), salted_digest(&salt, api_key))
}

/// Constant-time verification of a presented API key against a stored
/// `salt$digest` entry.
pub fn verify_api_key(api_key: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    constant_time_eq(&salted_digest(&salt, api_key), digest_hex)
}

/// Constant-time string equality for bearer credentials.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn salted_digest(salt: &[u8], secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

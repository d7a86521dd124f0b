//! Cryptographic operations for the voice chat proxy.
//!
//! - [`access_token`]: client RTC access tokens (HMAC-SHA256 over a packed
//!   claims message, keyed with the RTC application key)
//! - [`signer`]: upstream OpenAPI request signatures (HMAC-SHA256 key chain
//!   derived from the account secret key)
//!
//! Both schemes share the primitives in this module. Neither ever logs key
//! material; keys are passed as `SecretString` and exposed only at the HMAC
//! call site.

pub mod access_token;
pub mod signer;

use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 of `data` under `key`.
pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| format!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time HMAC-SHA256 verification.
pub(crate) fn verify_hmac_sha256(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.verify_slice(expected).is_ok()
        }
        Err(_) => false,
    }
}

/// Lowercase hex SHA-256 digest.
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Draw a random u32 from the system CSPRNG.
pub(crate) fn random_u32() -> Result<u32, String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes)
        .map_err(|e| format!("nonce generation failed: {}", e))?;
    Ok(u32::from_le_bytes(bytes))
}

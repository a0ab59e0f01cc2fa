//! Cryptographic utilities for Chatline Server
//!
//! Server-side crypto covers:
//! - Password hashing and verification (PBKDF2-HMAC-SHA256)
//! - Entity, file and connection identifier generation

use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use ring::{
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use std::num::NonZeroU32;

const SALT_LENGTH: usize = 16;
const CREDENTIAL_LENGTH: usize = 32;
const FILE_ID_LENGTH: usize = 16;
const CONNECTION_ID_LENGTH: usize = 8;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; N];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("Failed to generate random bytes"))?;
    Ok(bytes)
}

/// Generate a new entity identifier (UUID v4)
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a file ID (base64url, 16 bytes)
pub fn generate_file_id() -> anyhow::Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<FILE_ID_LENGTH>()?))
}

/// Generate a connection ID for a live socket (hex, 8 bytes)
pub fn generate_connection_id() -> anyhow::Result<String> {
    Ok(hex::encode(random_bytes::<CONNECTION_ID_LENGTH>()?))
}

/// Hash a password for storage.
///
/// Format: `pbkdf2$<iterations>$<salt>$<hash>` with unpadded base64 parts.
pub fn hash_password(password: &str, iterations: u32) -> anyhow::Result<String> {
    let rounds = NonZeroU32::new(iterations)
        .ok_or_else(|| anyhow::anyhow!("Password iterations must be non-zero"))?;
    let salt = random_bytes::<SALT_LENGTH>()?;

    let mut credential = [0u8; CREDENTIAL_LENGTH];
    pbkdf2::derive(PBKDF2_ALG, rounds, &salt, password.as_bytes(), &mut credential);

    Ok(format!(
        "pbkdf2${}${}${}",
        iterations,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(credential)
    ))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if parts.len() != 4 || parts[0] != "pbkdf2" {
        return false;
    }

    let Some(rounds) = parts[1].parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (STANDARD_NO_PAD.decode(parts[2]), STANDARD_NO_PAD.decode(parts[3])) else {
        return false;
    };

    // ring compares in constant time
    pbkdf2::verify(PBKDF2_ALG, rounds, &salt, password.as_bytes(), &expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_verification() {
        let hash = hash_password("correct horse", 1_000).unwrap();

        assert!(hash.starts_with("pbkdf2$1000$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_password_hash_is_salted() {
        let a = hash_password("same", 1_000).unwrap();
        let b = hash_password("same", 1_000).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_rejected() {
        assert!(!verify_password("x", "plain-text"));
        assert!(!verify_password("x", "pbkdf2$0$AAAA$AAAA"));
        assert!(!verify_password("x", "pbkdf2$10$!!$!!"));
    }

    #[test]
    fn test_identifier_generation() {
        let id1 = generate_file_id().unwrap();
        let id2 = generate_file_id().unwrap();
        assert!(!id1.is_empty());
        assert_ne!(id1, id2);

        let conn = generate_connection_id().unwrap();
        assert_eq!(conn.len(), CONNECTION_ID_LENGTH * 2);
        assert!(conn.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

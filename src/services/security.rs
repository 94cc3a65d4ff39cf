use argon2::password_hash::{rand_core::OsRng as SaltRng, PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::HashingCosts;
use crate::error::{AppError, Result};

/// Build an argon2id hasher from the configured costs.
fn hasher(costs: &HashingCosts) -> Result<Argon2<'static>> {
    let params = Params::new(
        costs.memory_cost_kib,
        costs.time_cost,
        costs.parallelism,
        None,
    )
    .map_err(|e| AppError::Internal(format!("Invalid argon2 parameters: {}", e)))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with argon2id and a fresh random salt.
pub fn hash_password(password: &str, costs: &HashingCosts) -> Result<String> {
    let salt = SaltString::generate(&mut SaltRng);
    let hash = hasher(costs)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against its stored hash. The hash string carries its own
/// cost parameters, so verification works across cost changes.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generate a cryptographically secure random string (hex-encoded, so the
/// output is twice `byte_len` characters).
pub fn generate_random_string(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate an application secret of at least 32 bytes, hex-encoded.
pub fn generate_secret_key() -> String {
    generate_random_string(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_costs() -> HashingCosts {
        // Low costs keep the test suite fast; production values come from config.
        HashingCosts {
            time_cost: 1,
            memory_cost_kib: 8192,
            parallelism: 1,
        }
    }

    #[test]
    fn test_password_hashing_roundtrip() {
        let costs = test_costs();
        let hash = hash_password("Correct1Horse", &costs).unwrap();
        assert!(verify_password("Correct1Horse", &hash));
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_hash_is_salted() {
        let costs = test_costs();
        let h1 = hash_password("Abc12345", &costs).unwrap();
        let h2 = hash_password("Abc12345", &costs).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hash_embeds_cost_parameters() {
        let costs = test_costs();
        let hash = hash_password("Abc12345", &costs).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=8192"));
        assert!(hash.contains("t=1"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_verify_rejects_invalid_hash() {
        assert!(!verify_password("test", "not_a_valid_hash"));
    }

    #[test]
    fn test_random_string() {
        let s1 = generate_random_string(16);
        let s2 = generate_random_string(16);
        assert_eq!(s1.len(), 32); // hex encoding doubles length
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_secret_key_length() {
        let key = generate_secret_key();
        // 32 bytes, hex-encoded
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

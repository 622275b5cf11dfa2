//! Password hashing with Argon2id
//!
//! Hashes are stored in PHC string format, so the algorithm parameters and
//! salt travel with the hash.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// A wrong password is `Ok(false)`; only a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("abrazo-cerrado").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("abrazo-cerrado", &hash).unwrap());
        assert!(!verify_password("abrazo-abierto", &hash).unwrap());
    }

    #[test]
    fn test_same_password_gets_different_salt() {
        let a = hash_password("ochos123").unwrap();
        let b = hash_password("ochos123").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("ochos123", &a).unwrap());
        assert!(verify_password("ochos123", &b).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }
}

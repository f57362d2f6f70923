//! Password hashing for API users.
//!
//! Hashes are stored in PHC string format (`$argon2id$v=19$...`), so the
//! parameters travel with the hash and can be raised later without breaking
//! existing users.

use crate::error::{Result, UserError};
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Upper bound on accepted password length, to keep hashing cost bounded.
pub const MAX_PASSWORD_LENGTH: usize = 512;

/// Hashes `password` with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() || password.len() > MAX_PASSWORD_LENGTH {
        return Err(UserError::PasswordHash(format!(
            "password length must be between 1 and {} bytes",
            MAX_PASSWORD_LENGTH
        )));
    }

    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::PasswordHash(e.to_string()))
}

/// Checks `password` against a stored PHC hash.
///
/// A wrong password is `Ok(false)`. A malformed stored hash is an error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Ok(false);
    }

    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| UserError::PasswordHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(UserError::PasswordHash(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let first = hash_password("same").unwrap();
        let second = hash_password("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(hash_password("").is_err());
        assert!(hash_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
        assert!(verify_password("s3cret", "not-a-phc-string").is_err());
    }
}

use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hashes a password with Argon2id, returning a PHC-format string.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(rand::thread_rng());

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AppError::Internal)?
        .to_string();

    Ok(hash)
}

/// Verifies a password against a stored PHC hash string.
pub fn verify_password(password: &str, hash: &str) -> AppResult<()> {
    let parsed =
        PasswordHash::new(hash).map_err(|_| AppError::Internal)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthenticated("incorrect username or password".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("topsecret").unwrap();
        assert!(verify_password("topsecret", &hash).is_ok());
    }

    #[test]
    fn wrong_password_rejected() {
        let hash = hash_password("topsecret").unwrap();
        assert!(verify_password("nottopsecret", &hash).is_err());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("topsecret").unwrap();
        let b = hash_password("topsecret").unwrap();
        assert_ne!(a, b);
    }
}

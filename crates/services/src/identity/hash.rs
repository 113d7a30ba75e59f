use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::IdentityError;

/// Hash a password with Argon2id and a random salt (PHC string format).
///
/// # Errors
///
/// Returns `IdentityError::Hash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Hash(e.to_string()))
}

/// Check a password against a stored PHC hash.
///
/// # Errors
///
/// Returns `IdentityError::Hash` if the stored hash cannot be parsed.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, IdentityError> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| IdentityError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

//! Local credential verifier: salted Argon2id hashes in PHC string format.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

use crate::{
    error::{AppError, AppResult},
    models::{NewUser, User},
};

pub fn hash_password(plaintext: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Never errors: an unparsable stored hash simply does not verify.
/// The digest comparison inside `verify_password` is constant-time.
pub fn verify_password(stored_hash: &str, plaintext: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is not a valid PHC string: {}", e);
            false
        }
    }
}

impl User {
    pub fn set_password(&mut self, plaintext: &str) -> AppResult<()> {
        self.password_hash = Some(hash_password(plaintext)?);
        Ok(())
    }

    /// False for accounts that only have an external identity.
    pub fn check_password(&self, plaintext: &str) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(hash, plaintext))
    }
}

impl NewUser {
    pub fn set_password(&mut self, plaintext: &str) -> AppResult<()> {
        self.password_hash = Some(hash_password(plaintext)?);
        Ok(())
    }
}

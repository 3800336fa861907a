use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("encode account password")]
    Encode(#[source] password_hash::Error),
    #[error("stored account password is not a valid PHC string")]
    Malformed(#[source] password_hash::Error),
}

/// Encodes sign-up passwords and checks login attempts against stored hashes.
#[derive(Default)]
pub struct PasswordEncoder {
    argon2: Argon2<'static>,
}

impl PasswordEncoder {
    pub fn encode(&self, raw: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let encoded = self
            .argon2
            .hash_password(raw.as_bytes(), &salt)
            .map_err(PasswordError::Encode)?;
        Ok(encoded.to_string())
    }

    /// `Ok(false)` on a mismatch; `Err` only when `encoded` cannot be parsed.
    pub fn matches(&self, raw: &str, encoded: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(encoded).map_err(PasswordError::Malformed)?;
        Ok(self.argon2.verify_password(raw.as_bytes(), &parsed).is_ok())
    }
}

//! Password hashing (argon2 PHC strings) and one-time reset codes.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::{Error as HashError, SaltString},
};
use rand_core::{OsRng, RngCore};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash(password: &str) -> Result<String, HashError> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// `false` for a wrong password or a malformed stored hash.
pub fn verify(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    .unwrap_or(false)
}

/// A six-digit numeric code.
pub fn reset_code() -> String {
  (OsRng.next_u32() % 900_000 + 100_000).to_string()
}

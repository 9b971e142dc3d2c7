//! Password hashing and strength rules
//!
//! Hashes are Argon2id PHC strings with a random salt per password.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with Argon2id defaults.
///
/// ```ignore
/// let hash = hash_password("correct horse")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC hash.
///
/// A wrong password is `Ok(false)`; a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// Reasons a new password is refused, in the order they are checked
pub fn password_problems(password: &str, username: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push("Пароль должен содержать не менее 8 символов");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("Пароль не может состоять только из цифр");
    }
    if !username.is_empty() && password.to_lowercase().contains(&username.to_lowercase()) {
        problems.push("Пароль не должен содержать имя пользователя");
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_is_argon2id_and_salted() {
        let first = hash_password("путешествие").expect("Failed to hash password");
        let second = hash_password("путешествие").expect("Failed to hash password");

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_password_problems() {
        assert!(password_problems("tver-2024-trip", "ivan").is_empty());
        assert_eq!(password_problems("short", "ivan").len(), 1);
        assert!(password_problems("12345678", "ivan").contains(&"Пароль не может состоять только из цифр"));
        assert!(password_problems("myIVANpassword", "ivan")
            .contains(&"Пароль не должен содержать имя пользователя"));
    }

    proptest! {
        #[test]
        fn prop_long_mixed_passwords_pass(body in "[a-z]{6,20}", digit in 0u8..10) {
            let password = format!("{}!{}", body, digit);
            prop_assert!(password_problems(&password, "").is_empty());
        }
    }
}

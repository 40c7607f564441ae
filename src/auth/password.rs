//! Argon2id password hashing. Both calls run on the blocking pool; a default-cost hash takes
//! tens of milliseconds and must not stall the async workers.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

/// Salted hash in PHC string form.
pub async fn hash_password(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow!("argon2 hash: {e}"))
    })
    .await
    .context("password hash task")?
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub async fn verify_password(plain: String, stored: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(&stored).map_err(|e| anyhow!("stored hash: {e}"))?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .context("password verify task")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_are_salted_phc_strings() {
        let a = hash_password("pw123".into()).await.unwrap();
        let b = hash_password("pw123".into()).await.unwrap();
        assert!(a.starts_with("$argon2id$"));
        assert_ne!(a, b);
        assert!(!a.contains("pw123"));
    }

    #[tokio::test]
    async fn verify_matches_only_the_original() {
        let stored = hash_password("pw123".into()).await.unwrap();
        assert!(verify_password("pw123".into(), stored.clone()).await.unwrap());
        assert!(!verify_password("pw124".into(), stored.clone()).await.unwrap());
        assert!(!verify_password(String::new(), stored).await.unwrap());
    }

    #[tokio::test]
    async fn unreadable_hash_is_an_error() {
        assert!(verify_password("pw123".into(), "plaintext".into()).await.is_err());
    }
}

use argon2::{
    password_hash::{self, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

/// Argon2 PHC string. The only thing the user repository accepts as a password,
/// so plaintext can never reach storage.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn from_plaintext(plain: &str) -> anyhow::Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(Self(hash))
    }

    /// Wraps a hash loaded from storage.
    pub fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Checks `plain` against a stored PHC string. A malformed stored hash counts
/// as a mismatch.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let parsed = match password_hash::PasswordHash::new(stored) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = PasswordHash::from_plaintext(password).expect("hashing should succeed");
        assert!(verify_password(password, hash.as_str()));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = PasswordHash::from_plaintext("correct-horse-battery-staple").unwrap();
        assert!(!verify_password("wrong-password", hash.as_str()));
        assert!(!verify_password("", hash.as_str()));
    }

    #[test]
    fn same_plaintext_hashes_differently() {
        let a = PasswordHash::from_plaintext("secret1").unwrap();
        let b = PasswordHash::from_plaintext("secret1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("secret1", a.as_str()));
        assert!(verify_password("secret1", b.as_str()));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn debug_does_not_print_the_hash() {
        let hash = PasswordHash::from_plaintext("secret1").unwrap();
        assert!(!format!("{:?}", hash).contains(hash.as_str()));
    }
}

use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// Random bytes behind a reset token (160 bits).
const TOKEN_BYTES: usize = 20;

/// How long a reset token stays valid.
pub const RESET_WINDOW: Duration = Duration::minutes(10);

/// A freshly issued password-reset credential. `plaintext` leaves the process
/// exactly once (by mail); only `hash` and `expires_at` are stored.
pub struct ResetToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

impl ResetToken {
    pub fn generate() -> Self {
        Self::generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(now: OffsetDateTime) -> Self {
        let mut raw = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let plaintext = hex::encode(raw);
        let hash = hash_reset_token(&plaintext);
        Self {
            plaintext,
            hash,
            expires_at: now + RESET_WINDOW,
        }
    }
}

impl std::fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// SHA-256 hex digest. Unsalted so a stored token can be looked up by value.
pub fn hash_reset_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

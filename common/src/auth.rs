use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("username or password does not match")]
    InvalidCredentials,
}

/// Lowercase hex SHA-256 of `input`. All credential handling works on
/// digests; plaintext is hashed at the edge and never stored or logged.
pub fn digest_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Seam for credential checking, so the compare algorithm is testable
/// independent of where the reference secrets come from.
pub trait CredentialVerifier {
    fn verify(&self, username_digest: &str, password_digest: &str) -> bool;
}

/// The deployed verifier: two fixed reference digests.
///
/// The source system defines exactly one username digest and one password
/// digest with no per-user records, so the "username" is effectively a
/// second fixed secret. Whether multiple users were ever intended is
/// unknown; a real user table would plug in behind [`CredentialVerifier`].
pub struct FixedDigestVerifier {
    username_digest: String,
    password_digest: String,
}

impl FixedDigestVerifier {
    pub fn new(username_digest: impl Into<String>, password_digest: impl Into<String>) -> Self {
        Self {
            username_digest: username_digest.into(),
            password_digest: password_digest.into(),
        }
    }
}

fn digest_matches(reference_hex: &str, candidate_hex: &str) -> bool {
    let (Ok(reference), Ok(candidate)) = (hex::decode(reference_hex), hex::decode(candidate_hex))
    else {
        return false;
    };
    // ct_eq on slices folds the length check in without early exit.
    bool::from(reference.ct_eq(&candidate))
}

impl CredentialVerifier for FixedDigestVerifier {
    fn verify(&self, username_digest: &str, password_digest: &str) -> bool {
        // Both comparisons always run; no short-circuit on the first field.
        let user_ok = u8::from(digest_matches(&self.username_digest, username_digest));
        let pass_ok = u8::from(digest_matches(&self.password_digest, password_digest));
        user_ok & pass_ok == 1
    }
}

pub type SessionToken = String;

/// Token -> expiry map over monotonic milliseconds.
///
/// Replaces the single process-wide authenticated flag of the source
/// system, so zero or many concurrent editors are representable. Expiry is
/// sliding: each authenticated request pushes the deadline out. Monotonic
/// time only; wall clock may jump during NTP sync.
pub struct SessionStore {
    idle_timeout_ms: u64,
    sessions: HashMap<SessionToken, u64>,
}

impl SessionStore {
    pub fn new(idle_timeout_ms: u64) -> Self {
        Self {
            idle_timeout_ms,
            sessions: HashMap::new(),
        }
    }

    /// Validates the submitted digests and issues a session token on match.
    pub fn login(
        &mut self,
        verifier: &dyn CredentialVerifier,
        username_digest: &str,
        password_digest: &str,
        now_ms: u64,
    ) -> Result<SessionToken, AuthError> {
        if !verifier.verify(username_digest, password_digest) {
            return Err(AuthError::InvalidCredentials);
        }

        self.purge_expired(now_ms);

        let token = hex::encode(rand::random::<[u8; 16]>());
        self.sessions
            .insert(token.clone(), now_ms.saturating_add(self.idle_timeout_ms));
        Ok(token)
    }

    /// True while the token exists and has not idled out; touching a live
    /// session slides its expiry forward.
    pub fn is_authenticated(&mut self, token: &str, now_ms: u64) -> bool {
        match self.sessions.get_mut(token) {
            Some(expires_at) if now_ms < *expires_at => {
                *expires_at = now_ms.saturating_add(self.idle_timeout_ms);
                true
            }
            Some(_) => {
                self.sessions.remove(token);
                false
            }
            None => false,
        }
    }

    /// Idempotent; revoking an unknown or already-revoked token is a no-op.
    pub fn logout(&mut self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn purge_expired(&mut self, now_ms: u64) {
        self.sessions.retain(|_, expires_at| now_ms < *expires_at);
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn verifier() -> FixedDigestVerifier {
        FixedDigestVerifier::new(digest_hex("edb"), digest_hex("control"))
    }

    #[test]
    fn digest_hex_matches_known_vector() {
        // SHA-256("password"), a published test vector.
        assert_eq!(
            digest_hex("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn login_succeeds_with_both_digests_correct() {
        let mut store = SessionStore::new(600_000);
        let token = store
            .login(&verifier(), &digest_hex("edb"), &digest_hex("control"), 1_000)
            .unwrap();

        assert!(store.is_authenticated(&token, 2_000));
        assert_eq!(store.active_sessions(), 1);
    }

    #[test]
    fn single_field_mismatch_issues_no_session() {
        let mut store = SessionStore::new(600_000);
        let good_user = digest_hex("edb");
        let good_pass = digest_hex("control");
        let bad = digest_hex("guess");

        assert_eq!(
            store.login(&verifier(), &bad, &good_pass, 0),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            store.login(&verifier(), &good_user, &bad, 0),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            store.login(&verifier(), &bad, &bad, 0),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(store.active_sessions(), 0);
    }

    #[test]
    fn non_hex_input_is_rejected_not_panicked() {
        let verifier = verifier();
        assert!(!verifier.verify("not hex at all", &digest_hex("control")));
        assert!(!verifier.verify("", ""));
    }

    #[test]
    fn session_idles_out_without_activity() {
        let mut store = SessionStore::new(1_000);
        let token = store
            .login(&verifier(), &digest_hex("edb"), &digest_hex("control"), 0)
            .unwrap();

        assert!(store.is_authenticated(&token, 999));
        // The touch at 999 slid expiry to 1_999.
        assert!(store.is_authenticated(&token, 1_500));
        assert!(!store.is_authenticated(&token, 3_000));
        // Expired token is gone for good, even at an earlier-looking time.
        assert!(!store.is_authenticated(&token, 0));
    }

    #[test]
    fn logout_is_idempotent() {
        let mut store = SessionStore::new(600_000);
        let token = store
            .login(&verifier(), &digest_hex("edb"), &digest_hex("control"), 0)
            .unwrap();

        store.logout(&token);
        assert!(!store.is_authenticated(&token, 1));
        store.logout(&token);
        assert_eq!(store.active_sessions(), 0);
    }

    #[test]
    fn concurrent_sessions_are_independent() {
        let mut store = SessionStore::new(600_000);
        let first = store
            .login(&verifier(), &digest_hex("edb"), &digest_hex("control"), 0)
            .unwrap();
        let second = store
            .login(&verifier(), &digest_hex("edb"), &digest_hex("control"), 0)
            .unwrap();

        assert_ne!(first, second);
        store.logout(&first);
        assert!(!store.is_authenticated(&first, 1));
        assert!(store.is_authenticated(&second, 1));
    }
}

use serde::{Deserialize, Serialize};

/// Reference credential digests: 64-char lowercase hex SHA-256. The
/// defaults are the values the original deployment shipped with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username_digest: String,
    pub password_digest: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username_digest: "a9e35fa05f07f5bcea9698ef1f3acc7bb7c7514c7a8d6f916722b366047f554c"
                .to_string(),
            password_digest: "0fcd568a5cb9bdb4677b69354b11ee415af8f784519cff3da49a26f84eaee7f2"
                .to_string(),
        }
    }
}

fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub auth: AuthConfig,
    pub timezone: String,
    pub tick_interval_ms: u64,
    pub session_idle_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            timezone: "America/Los_Angeles".to_string(),
            tick_interval_ms: 5_000,
            session_idle_timeout_ms: 600_000,
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(1_000, 60_000);
        self.session_idle_timeout_ms = self.session_idle_timeout_ms.clamp(60_000, 86_400_000);

        // A malformed digest can never match anything; fall back to the
        // defaults rather than locking every editor out.
        self.auth.username_digest = self.auth.username_digest.to_ascii_lowercase();
        self.auth.password_digest = self.auth.password_digest.to_ascii_lowercase();
        if !is_sha256_hex(&self.auth.username_digest) || !is_sha256_hex(&self.auth.password_digest)
        {
            self.auth = AuthConfig::default();
        }
    }
}

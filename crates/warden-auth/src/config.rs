//! Token verification, replay cache and token exchange configuration.

/// Configuration for the service-account token validator.
#[derive(Debug, Clone)]
pub struct TokenValidatorConfig {
    /// Accepted `aud` values. Empty rejects every token.
    pub allowed_audiences: Vec<String>,
    /// Accepted header algorithms (default: `ES256`, `RS256`).
    pub allowed_algorithms: Vec<String>,
    /// Upper bound on `exp - iat`, in seconds (default: 600).
    pub max_token_lifetime_secs: i64,
    /// Tolerated clock skew, in seconds (default: 60).
    pub clock_skew_secs: i64,
}

impl TokenValidatorConfig {
    /// Merge audiences from several sources, dropping blanks and
    /// duplicates while keeping first-seen order.
    pub fn with_audiences<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for audience in sources {
            let audience = audience.as_ref().trim();
            if !audience.is_empty() && !self.allowed_audiences.iter().any(|a| a == audience) {
                self.allowed_audiences.push(audience.to_string());
            }
        }
        self
    }
}

impl Default for TokenValidatorConfig {
    fn default() -> Self {
        Self {
            allowed_audiences: Vec::new(),
            allowed_algorithms: vec!["ES256".into(), "RS256".into()],
            max_token_lifetime_secs: 600,
            clock_skew_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayBackendKind {
    Redis,
    Memory,
    Disabled,
}

impl ReplayBackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Some(ReplayBackendKind::Redis),
            "memory" => Some(ReplayBackendKind::Memory),
            "disabled" | "none" => Some(ReplayBackendKind::Disabled),
            _ => None,
        }
    }
}

/// Configuration for the `jti` replay cache.
#[derive(Debug, Clone)]
pub struct ReplayCacheConfig {
    pub backend: ReplayBackendKind,
    /// Required for the Redis backend.
    pub redis_url: Option<String>,
    /// Per-write timeout, in milliseconds (default: 500).
    pub timeout_ms: u64,
    /// Prefix for cache keys (default: `sa-jti:`).
    pub key_prefix: String,
    /// With the `Disabled` backend, skip replay checks instead of
    /// rejecting every token.
    pub allow_fail_open: bool,
}

impl Default for ReplayCacheConfig {
    fn default() -> Self {
        Self {
            backend: ReplayBackendKind::Memory,
            redis_url: None,
            timeout_ms: 500,
            key_prefix: "sa-jti:".into(),
            allow_fail_open: false,
        }
    }
}

/// Configuration for access tokens minted by the token exchange.
#[derive(Debug, Clone)]
pub struct TokenExchangeConfig {
    /// PEM-encoded Ed25519 private key for access token signing.
    pub signing_key_pem: String,
    /// PEM-encoded Ed25519 public key for access token verification.
    pub verification_key_pem: String,
    /// `iss` of minted access tokens.
    pub issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
}

impl Default for TokenExchangeConfig {
    fn default() -> Self {
        Self {
            signing_key_pem: String::new(),
            verification_key_pem: String::new(),
            issuer: "warden".into(),
            access_token_lifetime_secs: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audiences_merge_without_duplicates() {
        let config = TokenValidatorConfig::default()
            .with_audiences(["https://a", " https://b ", ""])
            .with_audiences(vec!["https://a".to_string(), "https://c".to_string()]);
        assert_eq!(
            config.allowed_audiences,
            vec!["https://a", "https://b", "https://c"]
        );
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!(ReplayBackendKind::parse("Redis"), Some(ReplayBackendKind::Redis));
        assert_eq!(ReplayBackendKind::parse("none"), Some(ReplayBackendKind::Disabled));
        assert_eq!(ReplayBackendKind::parse("memcached"), None);
    }
}

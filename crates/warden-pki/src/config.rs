//! PKI configuration.

/// Configuration for the CA, issuance and signing services.
#[derive(Debug, Clone)]
pub struct PkiConfig {
    /// Lifetime of the self-signed per-usage CA certificates, in days
    /// (default: 3650).
    pub ca_validity_days: u32,
    /// Organization (`O`) placed in CA subjects.
    pub ca_organization: String,
    /// 256-bit AES-GCM key sealing server-held private keys at rest.
    /// `None` stores them as plain PEM.
    pub key_sealing_key: Option<[u8; 32]>,
    /// How long a built JWKS is served before it is rebuilt from storage
    /// (default: 60 seconds).
    pub jwks_cache_ttl_secs: u64,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            ca_validity_days: 3650,
            ca_organization: "Warden".into(),
            key_sealing_key: None,
            jwks_cache_ttl_secs: 60,
        }
    }
}

/// Configuration for server-side payload signing.
#[derive(Debug, Clone, Default)]
pub struct SigningConfig {
    /// Audiences a signed payload may address. Empty rejects every
    /// payload.
    pub allowed_audiences: Vec<String>,
}

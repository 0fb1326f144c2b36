//! Environment-driven configuration.

use std::time::Duration;

use warden_auth::{ReplayBackendKind, ReplayCacheConfig, TokenExchangeConfig, TokenValidatorConfig};
use warden_db::DbConfig;
use warden_pki::{PkiConfig, SigningConfig};

use crate::error::ServerError;

/// Audience variables merged, in order, into the token validator's
/// allow-list.
const AUDIENCE_VARS: [&str; 2] = ["WARDEN_ALLOWED_AUDIENCES", "WARDEN_TOKEN_AUDIENCE"];

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub db: DbConfig,
    pub pki: PkiConfig,
    pub signing: SigningConfig,
    pub validator: TokenValidatorConfig,
    pub replay: ReplayCacheConfig,
    pub exchange: TokenExchangeConfig,
    pub rotation_interval: Duration,
}

impl WardenConfig {
    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ServerError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_defaults = DbConfig::default();
        let db = DbConfig {
            url: get("WARDEN_DB_URL").unwrap_or(db_defaults.url),
            namespace: get("WARDEN_DB_NAMESPACE").unwrap_or(db_defaults.namespace),
            database: get("WARDEN_DB_DATABASE").unwrap_or(db_defaults.database),
            username: get("WARDEN_DB_USER").unwrap_or(db_defaults.username),
            password: get("WARDEN_DB_PASSWORD").unwrap_or(db_defaults.password),
        };

        let pki_defaults = PkiConfig::default();
        let pki = PkiConfig {
            ca_validity_days: parse_or(&get, "WARDEN_CA_VALIDITY_DAYS", pki_defaults.ca_validity_days)?,
            ca_organization: get("WARDEN_CA_ORGANIZATION").unwrap_or(pki_defaults.ca_organization),
            key_sealing_key: get("WARDEN_KEY_SEALING_KEY")
                .map(|hex_key| parse_sealing_key(&hex_key))
                .transpose()?,
            jwks_cache_ttl_secs: parse_or(
                &get,
                "WARDEN_JWKS_CACHE_TTL_SECS",
                pki_defaults.jwks_cache_ttl_secs,
            )?,
        };

        let signing = SigningConfig {
            allowed_audiences: split_list(get("WARDEN_SIGNING_AUDIENCES").as_deref()),
        };

        let mut validator = TokenValidatorConfig::default();
        for var in AUDIENCE_VARS {
            validator = validator.with_audiences(split_list(get(var).as_deref()));
        }

        let redis_url = get("WARDEN_REDIS_URL");
        let backend = match get("WARDEN_REPLAY_BACKEND") {
            Some(kind) => ReplayBackendKind::parse(&kind).ok_or_else(|| {
                ServerError::Config(format!("unknown WARDEN_REPLAY_BACKEND: {kind}"))
            })?,
            None if redis_url.is_some() => ReplayBackendKind::Redis,
            None => ReplayBackendKind::Memory,
        };
        let replay_defaults = ReplayCacheConfig::default();
        let replay = ReplayCacheConfig {
            backend,
            redis_url,
            timeout_ms: parse_or(&get, "WARDEN_REPLAY_TIMEOUT_MS", replay_defaults.timeout_ms)?,
            key_prefix: get("WARDEN_REPLAY_KEY_PREFIX").unwrap_or(replay_defaults.key_prefix),
            allow_fail_open: parse_or(&get, "WARDEN_REPLAY_FAIL_OPEN", false)?,
        };

        let exchange_defaults = TokenExchangeConfig::default();
        let exchange = TokenExchangeConfig {
            signing_key_pem: get("WARDEN_ACCESS_TOKEN_PRIVATE_KEY").unwrap_or_default(),
            verification_key_pem: get("WARDEN_ACCESS_TOKEN_PUBLIC_KEY").unwrap_or_default(),
            issuer: get("WARDEN_ACCESS_TOKEN_ISSUER").unwrap_or(exchange_defaults.issuer),
            access_token_lifetime_secs: parse_or(
                &get,
                "WARDEN_ACCESS_TOKEN_LIFETIME_SECS",
                exchange_defaults.access_token_lifetime_secs,
            )?,
        };

        let rotation_interval =
            Duration::from_secs(parse_or(&get, "WARDEN_ROTATION_INTERVAL_SECS", 3600u64)?);
        if rotation_interval.is_zero() {
            return Err(ServerError::Config(
                "WARDEN_ROTATION_INTERVAL_SECS must be positive".into(),
            ));
        }

        Ok(Self {
            db,
            pki,
            signing,
            validator,
            replay,
            exchange,
            rotation_interval,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ServerError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid {key}: {raw}"))),
        None => Ok(default),
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_sealing_key(hex_key: &str) -> Result<[u8; 32], ServerError> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| ServerError::Config(format!("WARDEN_KEY_SEALING_KEY is not hex: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        ServerError::Config("WARDEN_KEY_SEALING_KEY must be 32 bytes (64 hex chars)".into())
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WardenConfig, ServerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WardenConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db.url, "ws://127.0.0.1:8000");
        assert_eq!(config.replay.backend, ReplayBackendKind::Memory);
        assert!(!config.replay.allow_fail_open);
        assert!(config.pki.key_sealing_key.is_none());
        assert_eq!(config.rotation_interval, Duration::from_secs(3600));
        assert!(config.validator.allowed_audiences.is_empty());
    }

    #[test]
    fn audiences_merge_across_variables() {
        let config = load(&[
            ("WARDEN_ALLOWED_AUDIENCES", "https://a, https://b"),
            ("WARDEN_TOKEN_AUDIENCE", "https://b,https://c"),
        ])
        .unwrap();
        assert_eq!(
            config.validator.allowed_audiences,
            vec!["https://a", "https://b", "https://c"]
        );
    }

    #[test]
    fn redis_url_selects_redis_backend() {
        let config = load(&[("WARDEN_REDIS_URL", "redis://cache:6379")]).unwrap();
        assert_eq!(config.replay.backend, ReplayBackendKind::Redis);

        let config = load(&[
            ("WARDEN_REDIS_URL", "redis://cache:6379"),
            ("WARDEN_REPLAY_BACKEND", "memory"),
        ])
        .unwrap();
        assert_eq!(config.replay.backend, ReplayBackendKind::Memory);
    }

    #[test]
    fn sealing_key_must_be_32_bytes() {
        let key = "11".repeat(32);
        let config = load(&[("WARDEN_KEY_SEALING_KEY", key.as_str())]).unwrap();
        assert_eq!(config.pki.key_sealing_key, Some([0x11; 32]));

        assert!(load(&[("WARDEN_KEY_SEALING_KEY", "abcd")]).is_err());
        assert!(load(&[("WARDEN_KEY_SEALING_KEY", "zz")]).is_err());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(load(&[("WARDEN_ROTATION_INTERVAL_SECS", "soon")]).is_err());
        assert!(load(&[("WARDEN_ROTATION_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("WARDEN_REPLAY_BACKEND", "memcached")]).is_err());
    }
}

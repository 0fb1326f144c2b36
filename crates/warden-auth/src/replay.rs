//! `jti` replay cache.
//!
//! A token identifier is recorded with an atomic set-if-absent write
//! that expires once the token itself could no longer be accepted. A
//! second write of the same identifier inside that window is a replay.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::config::{ReplayBackendKind, ReplayCacheConfig};
use crate::error::AuthError;

/// Entries kept before the memory cache sweeps expired keys.
const MEMORY_SWEEP_THRESHOLD: usize = 4096;

/// Atomic set-if-absent with expiry.
pub trait ReplayCache: Send + Sync {
    /// Record `key` for `ttl_secs` seconds. Returns `false` when the key
    /// is already present.
    fn set_if_absent(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<bool, AuthError>> + Send;
}

/// Redis-backed cache shared by every replica (`SET key 1 NX EX ttl`).
#[derive(Clone)]
pub struct RedisReplayCache {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisReplayCache {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = redis::Client::open(url)
            .map_err(|e| AuthError::JtiCheckFailed(format!("invalid redis url: {e}")))?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| AuthError::JtiCheckFailed("redis connect timed out".into()))?
            .map_err(|e| AuthError::JtiCheckFailed(format!("redis connect: {e}")))?;
        Ok(Self {
            connection,
            timeout,
        })
    }
}

impl ReplayCache for RedisReplayCache {
    async fn set_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool, AuthError> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg("1").arg("NX").arg("EX").arg(ttl_secs);

        let reply: redis::RedisResult<Option<String>> =
            match tokio::time::timeout(self.timeout, cmd.query_async(&mut conn)).await {
                Ok(reply) => reply,
                Err(_) => {
                    return Err(AuthError::JtiCheckFailed("redis write timed out".into()));
                }
            };

        // `OK` when the key was set, nil when it already existed.
        reply
            .map(|r| r.is_some())
            .map_err(|e| AuthError::JtiCheckFailed(format!("redis write: {e}")))
    }
}

/// Process-local cache for single-replica deployments and tests.
#[derive(Default)]
pub struct MemoryReplayCache {
    entries: DashMap<String, Instant>,
}

impl MemoryReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReplayCache for MemoryReplayCache {
    async fn set_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool, AuthError> {
        if self.entries.len() >= MEMORY_SWEEP_THRESHOLD {
            self.purge_expired();
        }

        let now = Instant::now();
        let expires_at = now + Duration::from_secs(ttl_secs);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    return Ok(false);
                }
                entry.insert(expires_at);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }
}

/// Outcome of a replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// First use of the identifier.
    Fresh,
    /// The identifier was seen before and has not expired.
    Replayed,
    /// No cache is configured and fail-open was requested.
    Skipped,
}

/// The configured replay cache.
pub enum ReplayBackend {
    Redis {
        cache: RedisReplayCache,
        key_prefix: String,
    },
    Memory {
        cache: MemoryReplayCache,
        key_prefix: String,
    },
    Disabled {
        allow_fail_open: bool,
    },
}

impl ReplayBackend {
    pub async fn from_config(config: &ReplayCacheConfig) -> Result<Self, AuthError> {
        let key_prefix = config.key_prefix.clone();
        match config.backend {
            ReplayBackendKind::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    AuthError::JtiCheckFailed("redis replay cache needs a url".into())
                })?;
                let cache =
                    RedisReplayCache::connect(url, Duration::from_millis(config.timeout_ms))
                        .await?;
                Ok(ReplayBackend::Redis { cache, key_prefix })
            }
            ReplayBackendKind::Memory => Ok(ReplayBackend::Memory {
                cache: MemoryReplayCache::new(),
                key_prefix,
            }),
            ReplayBackendKind::Disabled => Ok(Self::disabled(config.allow_fail_open)),
        }
    }

    pub fn memory(key_prefix: impl Into<String>) -> Self {
        ReplayBackend::Memory {
            cache: MemoryReplayCache::new(),
            key_prefix: key_prefix.into(),
        }
    }

    pub fn disabled(allow_fail_open: bool) -> Self {
        if allow_fail_open {
            warn!("jti replay protection is DISABLED; replayed service-account tokens will be accepted");
        }
        ReplayBackend::Disabled { allow_fail_open }
    }

    /// Record `jti` for `ttl_secs` seconds and report whether it was
    /// already present.
    pub async fn check(&self, jti: &str, ttl_secs: u64) -> Result<ReplayCheck, AuthError> {
        let inserted = match self {
            ReplayBackend::Redis { cache, key_prefix } => {
                cache.set_if_absent(&format!("{key_prefix}{jti}"), ttl_secs).await?
            }
            ReplayBackend::Memory { cache, key_prefix } => {
                cache.set_if_absent(&format!("{key_prefix}{jti}"), ttl_secs).await?
            }
            ReplayBackend::Disabled { allow_fail_open: true } => {
                warn!(jti, "skipping jti replay check, no replay cache configured");
                return Ok(ReplayCheck::Skipped);
            }
            ReplayBackend::Disabled { allow_fail_open: false } => {
                return Err(AuthError::JtiCheckFailed(
                    "no replay cache configured".into(),
                ));
            }
        };

        if inserted {
            Ok(ReplayCheck::Fresh)
        } else {
            debug!(jti, "jti already recorded");
            Ok(ReplayCheck::Replayed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_rejects_second_write() {
        let cache = MemoryReplayCache::new();
        assert!(cache.set_if_absent("a", 60).await.unwrap());
        assert!(!cache.set_if_absent("a", 60).await.unwrap());
        assert!(cache.set_if_absent("b", 60).await.unwrap());
    }

    #[tokio::test]
    async fn memory_cache_entries_expire() {
        let cache = MemoryReplayCache::new();
        assert!(cache.set_if_absent("a", 1).await.unwrap());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.set_if_absent("a", 1).await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let cache = MemoryReplayCache::new();
        cache.set_if_absent("short", 0).await.unwrap();
        cache.set_if_absent("long", 60).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn backend_prefixes_and_detects_replay() {
        let backend = ReplayBackend::memory("sa-jti:");
        assert_eq!(backend.check("id-1", 60).await.unwrap(), ReplayCheck::Fresh);
        assert_eq!(backend.check("id-1", 60).await.unwrap(), ReplayCheck::Replayed);
        if let ReplayBackend::Memory { cache, .. } = &backend {
            assert!(cache.entries.contains_key("sa-jti:id-1"));
        }
    }

    #[tokio::test]
    async fn disabled_backend_fails_closed() {
        let backend = ReplayBackend::disabled(false);
        let err = backend.check("id-1", 60).await.unwrap_err();
        assert!(matches!(err, AuthError::JtiCheckFailed(_)));
    }

    #[tokio::test]
    async fn disabled_backend_can_fail_open() {
        let backend = ReplayBackend::disabled(true);
        assert_eq!(backend.check("id-1", 60).await.unwrap(), ReplayCheck::Skipped);
        assert_eq!(backend.check("id-1", 60).await.unwrap(), ReplayCheck::Skipped);
    }

    #[tokio::test]
    async fn redis_backend_requires_url() {
        let config = ReplayCacheConfig {
            backend: ReplayBackendKind::Redis,
            redis_url: None,
            ..Default::default()
        };
        assert!(matches!(
            ReplayBackend::from_config(&config).await,
            Err(AuthError::JtiCheckFailed(_))
        ));
    }
}

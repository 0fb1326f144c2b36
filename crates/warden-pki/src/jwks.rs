//! JWKS publication per certificate group.
//!
//! A group's published set holds every non-revoked certificate's JWK,
//! newest first. Sets are rebuilt whenever the group's certificates
//! change in this process and otherwise after the configured TTL;
//! expired keys are filtered out at read time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use warden_core::error::WardenResult;
use warden_core::models::certificate::IssuedCertificate;
use warden_core::models::certificate_group::CertificateGroup;
use warden_core::models::jwk::{Jwk, JwkAttributes, JwkSet};
use warden_core::repository::{CertificateGroupRepository, CertificateRepository};

use crate::config::PkiConfig;

const ATTRIBUTE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Which keys of a group to publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JwksMode {
    /// Only the most recently issued valid key.
    #[default]
    Latest,
    /// Every valid key.
    Full,
}

#[derive(Debug, Clone)]
struct PublishedKey {
    jwk: Jwk,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct PublishedSet {
    built_at: Instant,
    keys: Vec<PublishedKey>,
}

fn published_key(cert: &IssuedCertificate) -> PublishedKey {
    let mut jwk = cert.jwk.clone();
    jwk.attributes = Some(JwkAttributes {
        enabled: true,
        created: cert.issued_at.format(ATTRIBUTE_TIME_FORMAT).to_string(),
        updated: cert.updated_at.format(ATTRIBUTE_TIME_FORMAT).to_string(),
        usage: cert.usage_type.as_str().to_string(),
    });
    PublishedKey {
        jwk,
        expires_at: cert.expires_at,
    }
}

pub struct JwksPublisher<G, C> {
    groups: G,
    certificates: C,
    ttl: Duration,
    cache: DashMap<String, Arc<PublishedSet>>,
}

impl<G, C> JwksPublisher<G, C>
where
    G: CertificateGroupRepository,
    C: CertificateRepository,
{
    pub fn new(groups: G, certificates: C, config: &PkiConfig) -> Self {
        Self {
            groups,
            certificates,
            ttl: Duration::from_secs(config.jwks_cache_ttl_secs),
            cache: DashMap::new(),
        }
    }

    /// Rebuild a group's published set from storage. Returns the number
    /// of non-revoked keys.
    pub async fn rebuild(&self, group: &CertificateGroup) -> WardenResult<usize> {
        let now = Utc::now();
        let keys: Vec<PublishedKey> = self
            .certificates
            .list_for_group(group.id)
            .await?
            .iter()
            .filter(|cert| !cert.is_revoked_at(now))
            .map(published_key)
            .collect();

        let count = keys.len();
        self.cache.insert(
            group.group_code.clone(),
            Arc::new(PublishedSet {
                built_at: Instant::now(),
                keys,
            }),
        );
        debug!(group_code = %group.group_code, keys = count, "Rebuilt JWKS");
        Ok(count)
    }

    pub fn invalidate(&self, group_code: &str) {
        self.cache.remove(group_code);
    }

    /// The group's JWKS. Fails with `GroupNotFound` for an unknown group.
    pub async fn list_jwks_for_group(
        &self,
        group_code: &str,
        mode: JwksMode,
    ) -> WardenResult<JwkSet> {
        let cached = self
            .cache
            .get(group_code)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|set| set.built_at.elapsed() < self.ttl);

        let set = match cached {
            Some(set) => set,
            None => {
                let group = self.groups.get_by_code(group_code).await?;
                self.rebuild(&group).await?;
                self.cache
                    .get(group_code)
                    .map(|entry| Arc::clone(entry.value()))
                    .unwrap_or_else(|| {
                        Arc::new(PublishedSet {
                            built_at: Instant::now(),
                            keys: Vec::new(),
                        })
                    })
            }
        };

        let now = Utc::now();
        let valid = set
            .keys
            .iter()
            .filter(|key| key.expires_at.is_none_or(|exp| exp > now))
            .map(|key| key.jwk.clone());
        let keys = match mode {
            JwksMode::Latest => valid.take(1).collect(),
            JwksMode::Full => valid.collect(),
        };
        Ok(JwkSet { keys })
    }
}

//! Server-side payload signing with stored group keys.
//!
//! A service account may have the server sign a payload with any active
//! key of its own certificate group. JWT-shaped payloads must address
//! an allow-listed audience and may only carry scopes granted to the
//! caller.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING,
    ECDSA_P521_SHA512_FIXED_SIGNING, EcdsaKeyPair, EcdsaSigningAlgorithm, RSA_PKCS1_SHA256,
    RSA_PKCS1_SHA384, RSA_PKCS1_SHA512, RsaKeyPair,
};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::Utc;
use rcgen::KeyPair;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::{AuditAction, AuditOutcome};
use warden_core::models::jwk::Jwk;
use warden_core::models::service_account::ServiceAccount;
use warden_core::repository::{
    AuditLogRepository, CertificateGroupRepository, CertificateRepository, PrivateKeyRepository,
};

use crate::audit::{Actor, AuditRecorder};
use crate::config::SigningConfig;
use crate::error::{PkiError, PkiResult};
use crate::keys::EcCurve;
use crate::seal::KeySealer;

/// How the request's `payload` string is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// base64url, then standard base64, else the raw string.
    #[default]
    Auto,
    Base64url,
    Base64,
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignPayloadRequest {
    pub kid: String,
    pub payload: String,
    #[serde(default)]
    pub encoding: PayloadEncoding,
    #[serde(default, rename = "hashAlgorithm")]
    pub hash_algorithm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSignature {
    pub kid: String,
    /// base64url; raw `R || S` for EC keys.
    pub signature: String,
    pub algorithm: String,
    #[serde(rename = "hashAlgorithm")]
    pub hash_algorithm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> PkiResult<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA256" | "S256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "S384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "S512" => Ok(HashAlgorithm::Sha512),
            _ => Err(PkiError::Validation(format!("unsupported hash algorithm: {name}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    fn for_curve(curve: EcCurve) -> Self {
        match curve {
            EcCurve::P256 => HashAlgorithm::Sha256,
            EcCurve::P384 => HashAlgorithm::Sha384,
            EcCurve::P521 => HashAlgorithm::Sha512,
        }
    }
}

pub fn decode_payload(payload: &str, encoding: PayloadEncoding) -> PkiResult<Vec<u8>> {
    let invalid = |e: base64::DecodeError| PkiError::Validation(format!("invalid payload encoding: {e}"));
    match encoding {
        PayloadEncoding::Plain => Ok(payload.as_bytes().to_vec()),
        PayloadEncoding::Base64url => URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(invalid),
        PayloadEncoding::Base64 => STANDARD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload))
            .map_err(invalid),
        PayloadEncoding::Auto => Ok(URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .or_else(|_| STANDARD.decode(payload))
            .unwrap_or_else(|_| payload.as_bytes().to_vec())),
    }
}

/// Claims of a compact JWT signing input (`header.claims[.sig]`) or of a
/// bare JSON object.
pub fn payload_claims(payload: &[u8]) -> PkiResult<Map<String, Value>> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| PkiError::Validation("payload is not UTF-8 text".into()))?;
    let segments: Vec<&str> = text.split('.').collect();
    let json_bytes = if segments.len() >= 2 {
        URL_SAFE_NO_PAD
            .decode(segments[1].trim_end_matches('='))
            .map_err(|e| PkiError::Validation(format!("invalid claims segment: {e}")))?
    } else {
        payload.to_vec()
    };

    match serde_json::from_slice::<Value>(&json_bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(PkiError::Validation("payload claims must be a JSON object".into())),
        Err(e) => Err(PkiError::Validation(format!("payload claims are not JSON: {e}"))),
    }
}

fn string_or_list(value: Option<&Value>, separator: char) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(separator)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// `aud` must be present and every audience allow-listed; `scope` (or
/// `scp`) must be a subset of the caller's scopes.
pub fn check_payload_claims(
    claims: &Map<String, Value>,
    allowed_audiences: &[String],
    caller: &ServiceAccount,
) -> PkiResult<()> {
    let audiences = string_or_list(claims.get("aud"), ' ');
    if audiences.is_empty() {
        return Err(PkiError::Validation("payload has no aud claim".into()));
    }
    if let Some(aud) = audiences.iter().find(|aud| !allowed_audiences.contains(aud)) {
        return Err(PkiError::Validation(format!("audience {aud} is not allowed")));
    }

    let mut scopes = string_or_list(claims.get("scope"), ' ');
    if scopes.is_empty() {
        scopes = string_or_list(claims.get("scp"), ' ');
    }
    if !caller.has_scopes(scopes.iter().map(String::as_str)) {
        return Err(PkiError::Validation(
            "payload requests scopes beyond the caller's grant".into(),
        ));
    }
    Ok(())
}

enum SigningKey {
    Rsa(RsaKeyPair),
    Ec(EcdsaKeyPair, EcCurve),
}

fn ecdsa_algorithm(curve: EcCurve) -> &'static EcdsaSigningAlgorithm {
    match curve {
        EcCurve::P256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
        EcCurve::P384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
        EcCurve::P521 => &ECDSA_P521_SHA512_FIXED_SIGNING,
    }
}

impl SigningKey {
    fn load(pem: &str, jwk: &Jwk) -> PkiResult<Self> {
        let pkcs8 = KeyPair::from_pem(pem)
            .map_err(|e| PkiError::Crypto(format!("unreadable private key: {e}")))?
            .serialize_der();
        match jwk.kty.as_str() {
            "RSA" => RsaKeyPair::from_pkcs8(&pkcs8)
                .map(SigningKey::Rsa)
                .map_err(|e| PkiError::Crypto(format!("RSA key rejected: {e}"))),
            "EC" => {
                let curve = EcCurve::parse(jwk.crv.as_deref().unwrap_or_default())?;
                EcdsaKeyPair::from_pkcs8(ecdsa_algorithm(curve), &pkcs8)
                    .map(|key| SigningKey::Ec(key, curve))
                    .map_err(|e| PkiError::Crypto(format!("EC key rejected: {e}")))
            }
            other => Err(PkiError::Validation(format!("unsupported key type: {other}"))),
        }
    }

    /// Returns `(signature, jws algorithm, hash)`.
    fn sign(
        &self,
        message: &[u8],
        hint: Option<HashAlgorithm>,
    ) -> PkiResult<(Vec<u8>, &'static str, HashAlgorithm)> {
        let rng = SystemRandom::new();
        match self {
            SigningKey::Rsa(key) => {
                let hash = hint.unwrap_or(HashAlgorithm::Sha256);
                let (padding, alg) = match hash {
                    HashAlgorithm::Sha256 => (&RSA_PKCS1_SHA256, "RS256"),
                    HashAlgorithm::Sha384 => (&RSA_PKCS1_SHA384, "RS384"),
                    HashAlgorithm::Sha512 => (&RSA_PKCS1_SHA512, "RS512"),
                };
                let mut signature = vec![0u8; key.public_modulus_len()];
                key.sign(padding, &rng, message, &mut signature)
                    .map_err(|_| PkiError::Signing("RSA signing failed".into()))?;
                Ok((signature, alg, hash))
            }
            SigningKey::Ec(key, curve) => {
                let hash = HashAlgorithm::for_curve(*curve);
                if let Some(requested) = hint.filter(|h| *h != hash) {
                    return Err(PkiError::Validation(format!(
                        "{} keys sign with {}, not {}",
                        curve.jwk_name(),
                        hash.as_str(),
                        requested.as_str()
                    )));
                }
                let signature = key
                    .sign(&rng, message)
                    .map_err(|_| PkiError::Signing("ECDSA signing failed".into()))?;
                Ok((signature.as_ref().to_vec(), curve.jws_algorithm(), hash))
            }
        }
    }
}

pub struct SigningService<G, C, K, A> {
    groups: G,
    certificates: C,
    private_keys: K,
    sealer: KeySealer,
    audit: AuditRecorder<A>,
    config: SigningConfig,
}

impl<G, C, K, A> SigningService<G, C, K, A>
where
    G: CertificateGroupRepository,
    C: CertificateRepository,
    K: PrivateKeyRepository,
    A: AuditLogRepository,
{
    pub fn new(
        groups: G,
        certificates: C,
        private_keys: K,
        sealer: KeySealer,
        audit: AuditRecorder<A>,
        config: SigningConfig,
    ) -> Self {
        Self {
            groups,
            certificates,
            private_keys,
            sealer,
            audit,
            config,
        }
    }

    /// Sign `request.payload` with the stored key for `request.kid` on
    /// behalf of `caller`.
    pub async fn sign_payload(
        &self,
        caller: &ServiceAccount,
        request: SignPayloadRequest,
    ) -> WardenResult<PayloadSignature> {
        let actor = Actor::service_account(&caller.name);
        let hint = request
            .hash_algorithm
            .as_deref()
            .map(HashAlgorithm::parse)
            .transpose()?;
        let payload = decode_payload(&request.payload, request.encoding)?;

        // 1. The key must be an active key of the caller's own group.
        let certificate = self.certificates.get_by_kid(&request.kid).await?;
        let group_code = caller.certificate_group_code.as_deref().ok_or_else(|| {
            PkiError::Validation(format!("service account {} has no certificate group", caller.name))
        })?;
        let group = self.groups.get_by_code(group_code).await?;
        if certificate.group_id != Some(group.id) {
            return Err(self
                .deny(&actor, &request.kid, group_code, "kid belongs to another group")
                .await);
        }
        if !certificate.is_active_at(Utc::now()) {
            return Err(self
                .deny(&actor, &request.kid, group_code, "certificate is revoked or expired")
                .await);
        }

        // 2. Audience and scope policy on the embedded claims.
        let claims = payload_claims(&payload)?;
        if let Err(e) = check_payload_claims(&claims, &self.config.allowed_audiences, caller) {
            return Err(self
                .deny(&actor, &request.kid, group_code, &e.to_string())
                .await);
        }

        // 3. Sign with the stored key.
        let record = self.private_keys.get_by_kid(&request.kid).await?;
        let pem = self.sealer.open(&record)?;
        let key = SigningKey::load(&pem, &certificate.jwk)?;
        let (signature, algorithm, hash) = key.sign(&payload, hint)?;

        info!(kid = %request.kid, group_code, algorithm, "Signed payload");
        self.audit
            .record(
                actor
                    .event(AuditAction::PayloadSigned)
                    .kid(&request.kid)
                    .group_code(group_code)
                    .details(json!({
                        "algorithm": algorithm,
                        "payload_sha256": hex::encode(Sha256::digest(&payload)),
                    })),
            )
            .await;

        Ok(PayloadSignature {
            kid: request.kid,
            signature: URL_SAFE_NO_PAD.encode(signature),
            algorithm: algorithm.to_string(),
            hash_algorithm: hash.as_str().to_string(),
        })
    }

    async fn deny(&self, actor: &Actor, kid: &str, group_code: &str, reason: &str) -> WardenError {
        warn!(kid, group_code, reason, "Signing request denied");
        self.audit
            .record(
                actor
                    .event(AuditAction::PayloadSigned)
                    .kid(kid)
                    .group_code(group_code)
                    .outcome(AuditOutcome::Denied)
                    .details(json!({ "reason": reason })),
            )
            .await;
        PkiError::Validation(reason.to_string()).into()
    }
}

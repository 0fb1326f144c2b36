//! Integration tests for server-side payload signing.

use std::collections::BTreeMap;
use std::sync::Arc;

use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_FIXED, ECDSA_P384_SHA384_FIXED, ECDSA_P521_SHA512_FIXED,
    RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384, RsaPublicKeyComponents,
    UnparsedPublicKey,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use warden_core::error::WardenError;
use warden_core::models::audit::{AuditAction, AuditOutcome};
use warden_core::models::certificate_group::{
    CreateCertificateGroup, KeyType, RotationPolicy, UsageType,
};
use warden_core::models::jwk::Jwk;
use warden_core::models::service_account::{CreateServiceAccount, ServiceAccount};
use warden_core::repository::{AuditFilter, AuditLogRepository, Pagination, ServiceAccountRepository};
use warden_db::repository::{
    SurrealAuditLogRepository, SurrealCertificateGroupRepository, SurrealCertificateRepository,
    SurrealPrivateKeyRepository, SurrealServiceAccountRepository,
};
use warden_pki::seal::KeySealer;
use warden_pki::signing::PayloadEncoding;
use warden_pki::{
    Actor, AuditRecorder, CaKeyStore, CertificateGroupService, IssuanceService,
    IssueForGroupRequest, JwksPublisher, PkiConfig, SignPayloadRequest, SigningConfig,
    SigningService,
};

type Groups = SurrealCertificateGroupRepository<Db>;
type Certificates = SurrealCertificateRepository<Db>;
type Keys = SurrealPrivateKeyRepository<Db>;
type Audit = SurrealAuditLogRepository<Db>;

const AUDIENCE: &str = "https://api.example/token";

struct Harness {
    registry: CertificateGroupService<Groups, Certificates, Audit>,
    issuance: IssuanceService<Groups, Certificates, Keys, Audit>,
    signing: SigningService<Groups, Certificates, Keys, Audit>,
    accounts: SurrealServiceAccountRepository<Db>,
    audit: Audit,
}

async fn setup() -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let config = PkiConfig {
        key_sealing_key: Some([3u8; 32]),
        ..Default::default()
    };
    let groups = SurrealCertificateGroupRepository::new(db.clone());
    let certificates = SurrealCertificateRepository::new(db.clone());
    let keys = SurrealPrivateKeyRepository::new(db.clone());
    let audit = SurrealAuditLogRepository::new(db.clone());
    let recorder = AuditRecorder::new(audit.clone());
    let sealer = KeySealer::new(config.key_sealing_key);

    let jwks = Arc::new(JwksPublisher::new(
        groups.clone(),
        certificates.clone(),
        &config,
    ));
    let issuance = IssuanceService::new(
        groups.clone(),
        certificates.clone(),
        keys.clone(),
        Arc::new(CaKeyStore::new(&config)),
        Arc::clone(&jwks),
        sealer.clone(),
        recorder.clone(),
    );
    let signing = SigningService::new(
        groups.clone(),
        certificates,
        keys,
        sealer,
        recorder.clone(),
        SigningConfig {
            allowed_audiences: vec![AUDIENCE.to_string()],
        },
    );
    let registry = CertificateGroupService::new(groups, jwks, recorder);

    Harness {
        registry,
        issuance,
        signing,
        accounts: SurrealServiceAccountRepository::new(db),
        audit,
    }
}

/// Create a client-signing group, issue one key and bind an account.
async fn account_with_key(
    h: &Harness,
    code: &str,
    key_type: KeyType,
    key_size: Option<u32>,
    key_curve: Option<&str>,
) -> (ServiceAccount, String, Jwk) {
    h.registry
        .create(
            CreateCertificateGroup {
                group_code: code.into(),
                display_name: code.into(),
                description: None,
                usage_type: UsageType::ClientSigning,
                key_type,
                key_curve: key_curve.map(str::to_string),
                key_size,
                subject: BTreeMap::from([("CN".to_string(), code.to_string())]),
                rotation_policy: RotationPolicy::default(),
            },
            &Actor::operator("admin"),
        )
        .await
        .unwrap();
    let issued = h
        .issuance
        .issue_for_group(
            IssueForGroupRequest {
                group_code: code.into(),
                ..Default::default()
            },
            &Actor::operator("admin"),
        )
        .await
        .unwrap();
    let account = h
        .accounts
        .create(CreateServiceAccount {
            name: format!("svc-{code}"),
            certificate_group_code: Some(code.into()),
            scopes: vec!["read".into(), "write".into()],
        })
        .await
        .unwrap();
    let kid = issued.certificate.kid.clone();
    (account, kid, issued.certificate.jwk)
}

fn signing_input(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{header}.{body}")
}

fn verify_with_jwk(jwk: &Jwk, message: &[u8], signature: &[u8], hash: &str) {
    let decode = |v: &Option<String>| URL_SAFE_NO_PAD.decode(v.as_ref().unwrap()).unwrap();
    match jwk.kty.as_str() {
        "RSA" => {
            let params = match hash {
                "SHA-384" => &RSA_PKCS1_2048_8192_SHA384,
                _ => &RSA_PKCS1_2048_8192_SHA256,
            };
            RsaPublicKeyComponents {
                n: decode(&jwk.n),
                e: decode(&jwk.e),
            }
            .verify(params, message, signature)
            .unwrap();
        }
        "EC" => {
            let mut point = vec![0x04];
            point.extend(decode(&jwk.x));
            point.extend(decode(&jwk.y));
            let alg = match jwk.crv.as_deref() {
                Some("P-256") => &ECDSA_P256_SHA256_FIXED,
                Some("P-384") => &ECDSA_P384_SHA384_FIXED,
                _ => &ECDSA_P521_SHA512_FIXED,
            };
            UnparsedPublicKey::new(alg, &point)
                .verify(message, signature)
                .unwrap();
        }
        other => panic!("unexpected kty {other}"),
    }
}

// ---------------------------------------------------------------------------
// Round trip through the published JWK
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signatures_verify_against_published_jwk() {
    let h = setup().await;
    let shapes: [(&str, KeyType, Option<u32>, Option<&str>, &str); 4] = [
        ("rsa", KeyType::Rsa, Some(2048), None, "RS256"),
        ("p256", KeyType::Ec, None, Some("P-256"), "ES256"),
        ("p384", KeyType::Ec, None, Some("P-384"), "ES384"),
        ("p521", KeyType::Ec, None, Some("P-521"), "ES512"),
    ];

    for (code, key_type, size, curve, alg) in shapes {
        let (account, kid, jwk) = account_with_key(&h, code, key_type, size, curve).await;
        let input = signing_input(json!({"aud": AUDIENCE, "scope": "read"}));

        let signed = h
            .signing
            .sign_payload(
                &account,
                SignPayloadRequest {
                    kid: kid.clone(),
                    payload: input.clone(),
                    encoding: PayloadEncoding::Auto,
                    hash_algorithm: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(signed.kid, kid);
        assert_eq!(signed.algorithm, alg);

        let signature = URL_SAFE_NO_PAD.decode(&signed.signature).unwrap();
        verify_with_jwk(&jwk, input.as_bytes(), &signature, &signed.hash_algorithm);
    }
}

#[tokio::test]
async fn rsa_honours_hash_hint() {
    let h = setup().await;
    let (account, kid, jwk) = account_with_key(&h, "rsa", KeyType::Rsa, None, None).await;
    let input = signing_input(json!({"aud": AUDIENCE}));

    let signed = h
        .signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid,
                payload: URL_SAFE_NO_PAD.encode(&input),
                encoding: PayloadEncoding::Base64url,
                hash_algorithm: Some("SHA-384".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(signed.algorithm, "RS384");
    assert_eq!(signed.hash_algorithm, "SHA-384");
    let signature = URL_SAFE_NO_PAD.decode(&signed.signature).unwrap();
    verify_with_jwk(&jwk, input.as_bytes(), &signature, "SHA-384");
}

#[tokio::test]
async fn ec_rejects_mismatched_hash_hint() {
    let h = setup().await;
    let (account, kid, _) = account_with_key(&h, "p256", KeyType::Ec, None, Some("P-256")).await;
    let err = h
        .signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid,
                payload: signing_input(json!({"aud": AUDIENCE})),
                encoding: PayloadEncoding::Plain,
                hash_algorithm: Some("SHA-512".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::CertificateValidation(_)));
}

// ---------------------------------------------------------------------------
// Policy enforcement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kid_of_another_group_is_denied() {
    let h = setup().await;
    let (account, _, _) = account_with_key(&h, "mine", KeyType::Ec, None, None).await;
    let (_, foreign_kid, _) = account_with_key(&h, "theirs", KeyType::Ec, None, None).await;

    let err = h
        .signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid: foreign_kid.clone(),
                payload: signing_input(json!({"aud": AUDIENCE})),
                encoding: PayloadEncoding::Auto,
                hash_algorithm: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::CertificateValidation(_)));

    let events = h
        .audit
        .list(
            AuditFilter {
                action: Some(AuditAction::PayloadSigned),
                kid: Some(foreign_kid),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(events.total, 1);
    assert_eq!(events.items[0].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn audience_outside_allow_list_is_denied() {
    let h = setup().await;
    let (account, kid, _) = account_with_key(&h, "g1", KeyType::Ec, None, None).await;
    let err = h
        .signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid,
                payload: signing_input(json!({"aud": "https://elsewhere.example"})),
                encoding: PayloadEncoding::Auto,
                hash_algorithm: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::CertificateValidation(_)));
}

#[tokio::test]
async fn ungranted_scope_is_denied() {
    let h = setup().await;
    let (account, kid, _) = account_with_key(&h, "g1", KeyType::Ec, None, None).await;
    let err = h
        .signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid,
                payload: signing_input(json!({"aud": AUDIENCE, "scope": "read admin"})),
                encoding: PayloadEncoding::Auto,
                hash_algorithm: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::CertificateValidation(_)));
}

#[tokio::test]
async fn revoked_key_cannot_sign() {
    let h = setup().await;
    let (account, kid, _) = account_with_key(&h, "g1", KeyType::Ec, None, None).await;
    h.issuance
        .revoke(&kid, None, &Actor::operator("admin"))
        .await
        .unwrap();

    let err = h
        .signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid,
                payload: signing_input(json!({"aud": AUDIENCE})),
                encoding: PayloadEncoding::Auto,
                hash_algorithm: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::CertificateValidation(_)));
}

#[tokio::test]
async fn successful_signing_is_audited() {
    let h = setup().await;
    let (account, kid, _) = account_with_key(&h, "g1", KeyType::Ec, None, None).await;
    h.signing
        .sign_payload(
            &account,
            SignPayloadRequest {
                kid: kid.clone(),
                payload: signing_input(json!({"aud": AUDIENCE, "scope": "write"})),
                encoding: PayloadEncoding::Auto,
                hash_algorithm: None,
            },
        )
        .await
        .unwrap();

    let events = h
        .audit
        .list(
            AuditFilter {
                action: Some(AuditAction::PayloadSigned),
                actor: Some(account.name.clone()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(events.total, 1);
    assert_eq!(events.items[0].outcome, AuditOutcome::Success);
    assert_eq!(events.items[0].kid.as_deref(), Some(kid.as_str()));
}

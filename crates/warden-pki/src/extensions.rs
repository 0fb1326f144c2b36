//! Key usage and extended key usage vocabulary.

use rcgen::{ExtendedKeyUsagePurpose, KeyUsagePurpose};
use warden_core::models::certificate_group::{KeyType, UsageType};

use crate::error::{PkiError, PkiResult};

fn key_usage(name: &str) -> Option<KeyUsagePurpose> {
    match name {
        "digitalSignature" => Some(KeyUsagePurpose::DigitalSignature),
        "contentCommitment" | "nonRepudiation" => Some(KeyUsagePurpose::ContentCommitment),
        "keyEncipherment" => Some(KeyUsagePurpose::KeyEncipherment),
        "dataEncipherment" => Some(KeyUsagePurpose::DataEncipherment),
        "keyAgreement" => Some(KeyUsagePurpose::KeyAgreement),
        "keyCertSign" => Some(KeyUsagePurpose::KeyCertSign),
        "cRLSign" | "crlSign" => Some(KeyUsagePurpose::CrlSign),
        "encipherOnly" => Some(KeyUsagePurpose::EncipherOnly),
        "decipherOnly" => Some(KeyUsagePurpose::DecipherOnly),
        _ => None,
    }
}

/// Map key usage names onto X.509 flags.
///
/// `encipherOnly` and `decipherOnly` are only meaningful together with
/// `keyAgreement` and are rejected without it.
pub fn parse_key_usage<S: AsRef<str>>(names: &[S]) -> PkiResult<Vec<KeyUsagePurpose>> {
    let mut purposes = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        let purpose = key_usage(name)
            .ok_or_else(|| PkiError::Validation(format!("unknown key usage: {name}")))?;
        if !purposes.contains(&purpose) {
            purposes.push(purpose);
        }
    }

    let modifies_agreement = purposes
        .iter()
        .any(|p| matches!(p, KeyUsagePurpose::EncipherOnly | KeyUsagePurpose::DecipherOnly));
    if modifies_agreement && !purposes.contains(&KeyUsagePurpose::KeyAgreement) {
        return Err(PkiError::Validation(
            "encipherOnly/decipherOnly require keyAgreement".into(),
        ));
    }
    Ok(purposes)
}

/// Key usage applied when a request names none.
pub fn default_key_usage(usage: UsageType, key_type: KeyType) -> Vec<KeyUsagePurpose> {
    match (usage, key_type) {
        (UsageType::Encryption, KeyType::Rsa) => vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DataEncipherment,
        ],
        (UsageType::Encryption, KeyType::Ec) => vec![KeyUsagePurpose::KeyAgreement],
        (UsageType::ServerSigning, KeyType::Rsa) => vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ],
        _ => vec![KeyUsagePurpose::DigitalSignature],
    }
}

pub fn extended_key_usage(usage: UsageType) -> ExtendedKeyUsagePurpose {
    match usage {
        UsageType::ServerSigning => ExtendedKeyUsagePurpose::ServerAuth,
        UsageType::ClientSigning => ExtendedKeyUsagePurpose::ClientAuth,
        UsageType::Encryption => ExtendedKeyUsagePurpose::EmailProtection,
    }
}

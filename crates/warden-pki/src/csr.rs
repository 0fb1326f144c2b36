//! Certificate signing requests.

use rcgen::{
    CertificateParams, CertificateSigningRequestParams, KeyPair, KeyUsagePurpose,
};
use warden_core::models::certificate_group::UsageType;

use crate::error::{PkiError, PkiResult};
use crate::extensions::extended_key_usage;
use crate::subject::Subject;

/// Request parameters for a subject, usage and key usage set.
pub fn request_params(
    subject: &Subject,
    usage: UsageType,
    key_usages: Vec<KeyUsagePurpose>,
) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = subject.distinguished_name.clone();
    params.key_usages = key_usages;
    params.extended_key_usages = vec![extended_key_usage(usage)];
    params
}

/// Build a PEM-encoded PKCS#10 request signed by `key_pair`.
pub fn build_csr(
    key_pair: &KeyPair,
    subject: &Subject,
    usage: UsageType,
    key_usages: Vec<KeyUsagePurpose>,
) -> PkiResult<String> {
    request_params(subject, usage, key_usages)
        .serialize_request(key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| PkiError::Validation(format!("failed to build CSR: {e}")))
}

/// Parse a PEM request and verify its self-signature.
pub fn parse_csr(pem: &str) -> PkiResult<CertificateSigningRequestParams> {
    if !pem.contains("-----BEGIN CERTIFICATE REQUEST-----") {
        return Err(PkiError::Validation(
            "CSR must be PEM-encoded (BEGIN CERTIFICATE REQUEST)".into(),
        ));
    }
    CertificateSigningRequestParams::from_pem(pem)
        .map_err(|e| PkiError::Validation(format!("invalid CSR: {e}")))
}

#[cfg(test)]
mod tests {
    use rcgen::DnType;

    use super::*;
    use crate::keys::{EcCurve, KeySpec, generate_private_key};
    use crate::subject::build_subject;

    fn subject() -> Subject {
        let template = [("CN".to_string(), "client-a".to_string())]
            .into_iter()
            .collect();
        build_subject(&template).unwrap()
    }

    #[test]
    fn built_csr_parses_back() {
        let key = generate_private_key(&KeySpec::Ec(EcCurve::P256)).unwrap();
        let pem = build_csr(
            &key,
            &subject(),
            UsageType::ClientSigning,
            vec![KeyUsagePurpose::DigitalSignature],
        )
        .unwrap();
        let parsed = parse_csr(&pem).unwrap();
        let cn = parsed
            .params
            .distinguished_name
            .get(&DnType::CommonName)
            .cloned();
        assert!(cn.is_some());
    }

    #[test]
    fn rejects_non_pem_input() {
        assert!(matches!(
            parse_csr("not a csr"),
            Err(PkiError::Validation(_))
        ));
    }

    #[test]
    fn rejects_corrupted_request() {
        let pem = "-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----\n";
        assert!(parse_csr(pem).is_err());
    }
}

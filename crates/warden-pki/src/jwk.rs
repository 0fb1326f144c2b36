//! Certificate inspection and JWK conversion.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use warden_core::models::certificate_group::UsageType;
use warden_core::models::jwk::Jwk;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::error::{PkiError, PkiResult};
use crate::keys::EcCurve;

/// Facts read back from an issued certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub serial_number: String,
    pub fingerprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    /// Whole days between `not_before` and `not_after`.
    pub fn validity_days(&self) -> i64 {
        (self.not_after - self.not_before).num_days()
    }
}

/// Decode the first PEM block of a certificate into DER.
pub fn pem_to_der(pem: &str) -> PkiResult<Vec<u8>> {
    let (_, block) = parse_x509_pem(pem.as_bytes())
        .map_err(|e| PkiError::Validation(format!("invalid certificate PEM: {e}")))?;
    Ok(block.contents)
}

fn parse(der: &[u8]) -> PkiResult<X509Certificate<'_>> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| PkiError::Validation(format!("invalid certificate: {e}")))
}

fn timestamp(secs: i64) -> PkiResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| PkiError::Validation(format!("certificate time out of range: {secs}")))
}

/// Lower-case hex SHA-256 of the DER encoding.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

pub fn inspect_certificate(der: &[u8]) -> PkiResult<CertificateInfo> {
    let cert = parse(der)?;
    let validity = cert.validity();
    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        serial_number: cert.raw_serial_as_string().replace(':', ""),
        fingerprint: fingerprint(der),
        not_before: timestamp(validity.not_before.timestamp())?,
        not_after: timestamp(validity.not_after.timestamp())?,
    })
}

pub fn inspect_certificate_pem(pem: &str) -> PkiResult<CertificateInfo> {
    inspect_certificate(&pem_to_der(pem)?)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Build the JWK for a certificate's public key.
///
/// RSA keys yield `n`/`e` with `RS256`; EC keys yield `crv`/`x`/`y` with
/// the curve's ES algorithm. `use` is `enc` for encryption certificates
/// and `sig` otherwise.
pub fn certificate_to_jwk(der: &[u8], kid: &str, usage: UsageType) -> PkiResult<Jwk> {
    let cert = parse(der)?;
    let key_use = match usage {
        UsageType::Encryption => "enc",
        UsageType::ServerSigning | UsageType::ClientSigning => "sig",
    };

    let mut jwk = Jwk {
        kid: kid.to_string(),
        key_use: key_use.to_string(),
        x5c: vec![STANDARD.encode(der)],
        x5t_s256: Some(URL_SAFE_NO_PAD.encode(Sha256::digest(der))),
        ..Default::default()
    };

    match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => {
            jwk.kty = "RSA".into();
            jwk.alg = "RS256".into();
            jwk.n = Some(URL_SAFE_NO_PAD.encode(strip_leading_zeros(rsa.modulus)));
            jwk.e = Some(URL_SAFE_NO_PAD.encode(strip_leading_zeros(rsa.exponent)));
        }
        Ok(PublicKey::EC(point)) => {
            let data = point.data();
            let curve = EcCurve::from_point_len(data.len())
                .filter(|_| data.first() == Some(&0x04))
                .ok_or_else(|| {
                    PkiError::Validation(format!(
                        "unsupported EC point encoding ({} bytes)",
                        data.len()
                    ))
                })?;
            let len = curve.coordinate_len();
            jwk.kty = "EC".into();
            jwk.alg = curve.jws_algorithm().into();
            jwk.crv = Some(curve.jwk_name().into());
            jwk.x = Some(URL_SAFE_NO_PAD.encode(&data[1..1 + len]));
            jwk.y = Some(URL_SAFE_NO_PAD.encode(&data[1 + len..]));
        }
        Ok(_) => {
            return Err(PkiError::Validation(
                "certificate public key is neither RSA nor EC".into(),
            ));
        }
        Err(e) => {
            return Err(PkiError::Validation(format!(
                "unreadable certificate public key: {e}"
            )));
        }
    }

    Ok(jwk)
}

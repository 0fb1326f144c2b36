//! Key specifications and private key generation.
//!
//! Only RSA (2048, 3072 or 4096 bits) and the NIST curves P-256, P-384
//! and P-521 are accepted. Curve names are resolved through an explicit
//! allow-list of aliases.

use rcgen::{
    KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_ECDSA_P521_SHA512,
    PKCS_RSA_SHA256, RsaKeySize, SignatureAlgorithm,
};
use warden_core::models::certificate_group::KeyType;

use crate::error::{PkiError, PkiResult};

/// Smallest accepted RSA modulus.
pub const MIN_RSA_BITS: u32 = 2048;

/// RSA modulus used when a group does not specify one.
pub const DEFAULT_RSA_BITS: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    /// Resolve a curve name or alias (`P-256`, `prime256v1`, `secp384r1`, ...).
    pub fn parse(name: &str) -> PkiResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "p-256" | "p256" | "prime256v1" | "secp256r1" => Ok(EcCurve::P256),
            "p-384" | "p384" | "secp384r1" => Ok(EcCurve::P384),
            "p-521" | "p521" | "secp521r1" => Ok(EcCurve::P521),
            _ => Err(PkiError::KeyGeneration(format!(
                "unsupported elliptic curve: {name}"
            ))),
        }
    }

    /// JOSE `crv` value.
    pub fn jwk_name(&self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
            EcCurve::P521 => "P-521",
        }
    }

    /// JOSE signature algorithm bound to the curve.
    pub fn jws_algorithm(&self) -> &'static str {
        match self {
            EcCurve::P256 => "ES256",
            EcCurve::P384 => "ES384",
            EcCurve::P521 => "ES512",
        }
    }

    /// Byte length of one affine coordinate.
    pub fn coordinate_len(&self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
            EcCurve::P521 => 66,
        }
    }

    /// Identify the curve from an uncompressed SEC1 point (`0x04 || x || y`).
    pub fn from_point_len(len: usize) -> Option<Self> {
        match len {
            65 => Some(EcCurve::P256),
            97 => Some(EcCurve::P384),
            133 => Some(EcCurve::P521),
            _ => None,
        }
    }

    fn signature_algorithm(&self) -> &'static SignatureAlgorithm {
        match self {
            EcCurve::P256 => &PKCS_ECDSA_P256_SHA256,
            EcCurve::P384 => &PKCS_ECDSA_P384_SHA384,
            EcCurve::P521 => &PKCS_ECDSA_P521_SHA512,
        }
    }
}

/// Shape of a key to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Rsa { bits: u32 },
    Ec(EcCurve),
}

impl KeySpec {
    pub fn rsa(bits: u32) -> PkiResult<Self> {
        if bits < MIN_RSA_BITS {
            return Err(PkiError::KeyGeneration(format!(
                "RSA keys must be at least {MIN_RSA_BITS} bits, got {bits}"
            )));
        }
        rsa_key_size(bits)?;
        Ok(KeySpec::Rsa { bits })
    }

    /// Resolve the key shape a certificate group asks for.
    ///
    /// RSA groups default to 2048 bits and EC groups to P-256.
    pub fn from_group(
        key_type: KeyType,
        key_size: Option<u32>,
        key_curve: Option<&str>,
    ) -> PkiResult<Self> {
        match key_type {
            KeyType::Rsa => KeySpec::rsa(key_size.unwrap_or(DEFAULT_RSA_BITS)),
            KeyType::Ec => match key_curve {
                Some(curve) => Ok(KeySpec::Ec(EcCurve::parse(curve)?)),
                None => Ok(KeySpec::Ec(EcCurve::P256)),
            },
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            KeySpec::Rsa { .. } => KeyType::Rsa,
            KeySpec::Ec(_) => KeyType::Ec,
        }
    }
}

fn rsa_key_size(bits: u32) -> PkiResult<RsaKeySize> {
    match bits {
        2048 => Ok(RsaKeySize::_2048),
        3072 => Ok(RsaKeySize::_3072),
        4096 => Ok(RsaKeySize::_4096),
        other => Err(PkiError::KeyGeneration(format!(
            "unsupported RSA key size: {other} (expected 2048, 3072 or 4096)"
        ))),
    }
}

/// Generate a fresh private key.
pub fn generate_private_key(spec: &KeySpec) -> PkiResult<KeyPair> {
    let generated = match spec {
        KeySpec::Rsa { bits } => KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, rsa_key_size(*bits)?),
        KeySpec::Ec(curve) => KeyPair::generate_for(curve.signature_algorithm()),
    };
    generated.map_err(|e| PkiError::KeyGeneration(format!("key generation failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_aliases_resolve() {
        assert_eq!(EcCurve::parse("prime256v1").unwrap(), EcCurve::P256);
        assert_eq!(EcCurve::parse("secp256r1").unwrap(), EcCurve::P256);
        assert_eq!(EcCurve::parse("P-384").unwrap(), EcCurve::P384);
        assert_eq!(EcCurve::parse("secp521r1").unwrap(), EcCurve::P521);
    }

    #[test]
    fn unknown_curve_is_rejected() {
        assert!(matches!(
            EcCurve::parse("secp256k1"),
            Err(PkiError::KeyGeneration(_))
        ));
    }

    #[test]
    fn small_rsa_is_rejected() {
        assert!(matches!(KeySpec::rsa(1024), Err(PkiError::KeyGeneration(_))));
        assert!(matches!(KeySpec::rsa(2500), Err(PkiError::KeyGeneration(_))));
        assert_eq!(KeySpec::rsa(3072).unwrap(), KeySpec::Rsa { bits: 3072 });
    }

    #[test]
    fn group_defaults() {
        assert_eq!(
            KeySpec::from_group(KeyType::Rsa, None, None).unwrap(),
            KeySpec::Rsa { bits: 2048 }
        );
        assert_eq!(
            KeySpec::from_group(KeyType::Ec, None, None).unwrap(),
            KeySpec::Ec(EcCurve::P256)
        );
    }

    #[test]
    fn generates_each_curve() {
        for curve in [EcCurve::P256, EcCurve::P384, EcCurve::P521] {
            let key = generate_private_key(&KeySpec::Ec(curve)).unwrap();
            assert!(key.serialize_pem().contains("PRIVATE KEY"));
        }
    }

    #[test]
    fn generates_rsa() {
        let key = generate_private_key(&KeySpec::Rsa { bits: 2048 }).unwrap();
        assert!(key.serialize_pem().contains("PRIVATE KEY"));
    }
}

//! JSON Web Key (RFC 7517) representation of an issued certificate's
//! public key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// `RSA` or `EC`.
    pub kty: String,
    /// `sig` or `enc`.
    #[serde(rename = "use")]
    pub key_use: String,
    /// `RS256`, `ES256`, `ES384` or `ES512`.
    pub alg: String,
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Base64 (standard) DER certificate chain, leaf first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,
    /// Base64url SHA-256 thumbprint of the leaf certificate.
    #[serde(
        rename = "x5t#S256",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub x5t_s256: Option<String>,
    /// Publication metadata, only present on JWKS documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<JwkAttributes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwkAttributes {
    pub enabled: bool,
    /// UTC ISO-8601 with `Z` suffix.
    pub created: String,
    /// UTC ISO-8601 with `Z` suffix.
    pub updated: String,
    pub usage: String,
}

/// A JSON Web Key Set: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_rfc7517_field_names() {
        let jwk = Jwk {
            kty: "EC".into(),
            key_use: "sig".into(),
            alg: "ES256".into(),
            kid: "k1".into(),
            crv: Some("P-256".into()),
            x: Some("xx".into()),
            y: Some("yy".into()),
            x5t_s256: Some("t".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&jwk).unwrap();
        assert_eq!(value["use"], "sig");
        assert_eq!(value["x5t#S256"], "t");
        assert!(value.get("n").is_none());
        assert!(value.get("attributes").is_none());
    }
}

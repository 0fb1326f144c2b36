//! Distinguished-name handling for subject templates.
//!
//! Attribute keys are restricted to a fixed OID map:
//!
//! | key            | OID                    |
//! |----------------|------------------------|
//! | `C`            | 2.5.4.6                |
//! | `ST`           | 2.5.4.8                |
//! | `L`            | 2.5.4.7                |
//! | `O`            | 2.5.4.10               |
//! | `OU`           | 2.5.4.11               |
//! | `CN`           | 2.5.4.3                |
//! | `emailAddress` | 1.2.840.113549.1.9.1   |

use rcgen::{DistinguishedName, DnType, DnValue, Ia5String, PrintableString};
use warden_core::models::certificate_group::SubjectTemplate;

use crate::error::{PkiError, PkiResult};

const EMAIL_ADDRESS_OID: [u64; 7] = [1, 2, 840, 113549, 1, 9, 1];

/// Rendering order for subject strings, most specific first.
const RENDER_ORDER: [&str; 7] = ["CN", "emailAddress", "OU", "O", "L", "ST", "C"];

fn dn_type(key: &str) -> Option<DnType> {
    match key {
        "C" => Some(DnType::CountryName),
        "ST" => Some(DnType::StateOrProvinceName),
        "L" => Some(DnType::LocalityName),
        "O" => Some(DnType::OrganizationName),
        "OU" => Some(DnType::OrganizationalUnitName),
        "CN" => Some(DnType::CommonName),
        "emailAddress" => Some(DnType::CustomDnType(EMAIL_ADDRESS_OID.to_vec())),
        _ => None,
    }
}

/// A validated subject: the normalized template plus its X.509 form.
#[derive(Debug, Clone)]
pub struct Subject {
    pub template: SubjectTemplate,
    pub distinguished_name: DistinguishedName,
}

impl Subject {
    /// `CN=...,OU=...,O=...,C=...` rendering of the template.
    pub fn render(&self) -> String {
        render_subject(&self.template)
    }
}

/// Validate a template and build its distinguished name.
///
/// Unknown keys and blank values fail. `C` must be a two-letter code and
/// is upper-cased.
pub fn build_subject(template: &SubjectTemplate) -> PkiResult<Subject> {
    let mut normalized = SubjectTemplate::new();
    let mut dn = DistinguishedName::new();

    for (key, value) in template {
        let ty = dn_type(key).ok_or_else(|| {
            PkiError::Validation(format!("unsupported subject attribute: {key}"))
        })?;
        let value = value.trim();
        if value.is_empty() {
            return Err(PkiError::Validation(format!(
                "subject attribute {key} must not be empty"
            )));
        }

        if key == "C" {
            if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(PkiError::Validation(format!(
                    "country must be a two-letter code, got {value:?}"
                )));
            }
            let country = value.to_ascii_uppercase();
            let printable = PrintableString::try_from(country.as_str())
                .map_err(|e| PkiError::Validation(format!("invalid country: {e}")))?;
            dn.push(ty, DnValue::PrintableString(printable));
            normalized.insert(key.clone(), country);
        } else if key == "emailAddress" {
            // PKCS#9 emailAddress is an IA5String.
            let email = Ia5String::try_from(value)
                .map_err(|e| PkiError::Validation(format!("invalid emailAddress: {e}")))?;
            dn.push(ty, DnValue::Ia5String(email));
            normalized.insert(key.clone(), value.to_string());
        } else {
            dn.push(ty, value);
            normalized.insert(key.clone(), value.to_string());
        }
    }

    Ok(Subject {
        template: normalized,
        distinguished_name: dn,
    })
}

/// Overlay per-request attributes on a group's template.
///
/// Override keys go through the same validation as the template.
pub fn merge_subject(
    template: &SubjectTemplate,
    overrides: &SubjectTemplate,
) -> PkiResult<Subject> {
    let mut merged = template.clone();
    for (key, value) in overrides {
        if value.trim().is_empty() {
            return Err(PkiError::Validation(format!(
                "subject override {key} must not be empty"
            )));
        }
        merged.insert(key.clone(), value.clone());
    }
    build_subject(&merged)
}

pub fn render_subject(template: &SubjectTemplate) -> String {
    RENDER_ORDER
        .iter()
        .filter_map(|key| template.get(*key).map(|v| format!("{key}={v}")))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(pairs: &[(&str, &str)]) -> SubjectTemplate {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builds_known_attributes() {
        let subject = build_subject(&template(&[
            ("CN", "svc.example.com"),
            ("O", "Example"),
            ("C", "de"),
            ("emailAddress", "ops@example.com"),
        ]))
        .unwrap();
        assert_eq!(subject.template["C"], "DE");
        assert_eq!(
            subject.render(),
            "CN=svc.example.com,emailAddress=ops@example.com,O=Example,C=DE"
        );
    }

    #[test]
    fn email_is_encoded_as_ia5_string() {
        let subject = build_subject(&template(&[("emailAddress", "ops@example.com")])).unwrap();
        let value = subject
            .distinguished_name
            .get(&DnType::CustomDnType(EMAIL_ADDRESS_OID.to_vec()))
            .unwrap();
        assert!(matches!(value, DnValue::Ia5String(s) if s.as_str() == "ops@example.com"));
    }

    #[test]
    fn non_ascii_email_is_rejected() {
        let err = build_subject(&template(&[("emailAddress", "öps@example.com")])).unwrap_err();
        assert!(matches!(err, PkiError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let err = build_subject(&template(&[("CN", "a"), ("DC", "example")])).unwrap_err();
        assert!(matches!(err, PkiError::Validation(_)));
    }

    #[test]
    fn rejects_bad_country() {
        assert!(build_subject(&template(&[("C", "DEU")])).is_err());
        assert!(build_subject(&template(&[("C", "1A")])).is_err());
    }

    #[test]
    fn rejects_blank_value() {
        assert!(build_subject(&template(&[("CN", "  ")])).is_err());
    }

    #[test]
    fn overrides_replace_template_values() {
        let base = template(&[("CN", "base"), ("O", "Example")]);
        let merged = merge_subject(&base, &template(&[("CN", "override")])).unwrap();
        assert_eq!(merged.template["CN"], "override");
        assert_eq!(merged.template["O"], "Example");
    }

    #[test]
    fn empty_override_is_rejected() {
        let base = template(&[("CN", "base")]);
        assert!(merge_subject(&base, &template(&[("OU", "")])).is_err());
    }
}

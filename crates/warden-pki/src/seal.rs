//! AES-256-GCM sealing of server-held private keys.
//!
//! A sealed value is `base64(nonce || ciphertext || tag)` with the key's
//! `kid` as associated data, so a sealed blob only opens under the record
//! it was written for.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use warden_core::models::private_key::PrivateKeyRecord;

use crate::error::{PkiError, PkiResult};

const NONCE_LEN: usize = 12;

/// Seals private key PEM before it is stored and opens it on use.
///
/// Without a key the PEM is stored as-is and records are marked unsealed.
#[derive(Clone, Default)]
pub struct KeySealer {
    key: Option<[u8; 32]>,
}

impl KeySealer {
    pub fn new(key: Option<[u8; 32]>) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Option<Aes256Gcm> {
        self.key
            .as_ref()
            .map(|key| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
    }

    /// Returns the stored form of `pem` for `kid` and whether it is sealed.
    pub fn seal(&self, kid: &str, pem: &str) -> PkiResult<(String, bool)> {
        let Some(cipher) = self.cipher() else {
            return Ok((pem.to_string(), false));
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let payload = Payload {
            msg: pem.as_bytes(),
            aad: kid.as_bytes(),
        };
        let sealed = cipher
            .encrypt(&nonce, payload)
            .map_err(|e| PkiError::Crypto(format!("sealing key {kid}: {e}")))?;

        let blob: Vec<u8> = nonce.iter().copied().chain(sealed).collect();
        Ok((STANDARD.encode(blob), true))
    }

    /// Recover the PEM of a stored record.
    pub fn open(&self, record: &PrivateKeyRecord) -> PkiResult<String> {
        if !record.sealed {
            return Ok(record.private_key.clone());
        }
        let cipher = self.cipher().ok_or_else(|| {
            PkiError::Crypto(format!(
                "private key for {} is sealed but no sealing key is configured",
                record.kid
            ))
        })?;

        let blob = STANDARD
            .decode(&record.private_key)
            .map_err(|e| PkiError::Crypto(format!("sealed key {} is not base64: {e}", record.kid)))?;
        if blob.len() <= NONCE_LEN {
            return Err(PkiError::Crypto(format!(
                "sealed key {} is truncated",
                record.kid
            )));
        }

        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        let payload = Payload {
            msg: sealed,
            aad: record.kid.as_bytes(),
        };
        let pem = cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| PkiError::Crypto(format!("sealed key {} failed to open", record.kid)))?;
        String::from_utf8(pem)
            .map_err(|e| PkiError::Crypto(format!("sealed key {} is not UTF-8: {e}", record.kid)))
    }
}

//! CloudAPI request signing
//!
//! CloudAPI authenticates every request with an HTTP Signature over the
//! `Date` header, produced with the account's SSH private key.

use crate::error::TritonError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use std::fmt;
use std::path::Path;

/// Signs CloudAPI requests with an RSA private key
pub struct RequestSigner {
    key_id: String,
    key_pair: RsaKeyPair,
    rng: SystemRandom,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Load the signing key from a PEM file
    ///
    /// # Arguments
    /// * `account` - CloudAPI login
    /// * `key_fingerprint` - MD5 fingerprint of the public key (e.g. "ba:75:...")
    /// * `path` - Path to the PEM encoded private key
    pub fn from_pem_file(
        account: &str,
        key_fingerprint: &str,
        path: impl AsRef<Path>,
    ) -> Result<Self, TritonError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            TritonError::InvalidKey(format!("failed to read private key {}: {}", path.display(), e))
        })?;
        Self::from_pem(account, key_fingerprint, &pem)
    }

    /// Build a signer from PEM text (PKCS#1 or unencrypted PKCS#8 RSA keys)
    pub fn from_pem(account: &str, key_fingerprint: &str, pem: &str) -> Result<Self, TritonError> {
        let block = PemBlock::parse(pem)?;

        let key_pair = match block.label.as_str() {
            "RSA PRIVATE KEY" => RsaKeyPair::from_der(&block.der),
            "PRIVATE KEY" => RsaKeyPair::from_pkcs8(&block.der),
            "ENCRYPTED PRIVATE KEY" => {
                return Err(TritonError::InvalidKey(
                    "encrypted private keys are not supported, please decrypt the key first".to_string(),
                ))
            }
            other => {
                return Err(TritonError::InvalidKey(format!(
                    "unsupported key type {:?}, expected an RSA key in PEM format",
                    other
                )))
            }
        }
        .map_err(|e| TritonError::InvalidKey(format!("failed to parse RSA key: {}", e)))?;

        Ok(Self {
            key_id: format!("/{}/keys/{}", account, key_fingerprint),
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// The `keyId` presented to CloudAPI
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Raw RSA signature over `date: <date>`
    pub fn sign_date(&self, date: &str) -> Result<Vec<u8>, TritonError> {
        let message = format!("date: {}", date);
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &self.rng, message.as_bytes(), &mut signature)
            .map_err(|_| TritonError::InvalidKey("failed to sign request".to_string()))?;
        Ok(signature)
    }

    /// `Authorization` header value for a request carrying the given `Date`
    pub fn authorization(&self, date: &str) -> Result<String, TritonError> {
        let signature = STANDARD.encode(self.sign_date(date)?);
        Ok(format!(
            "Signature keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"date\",signature=\"{}\"",
            self.key_id, signature
        ))
    }
}

/// One decoded PEM block
struct PemBlock {
    label: String,
    der: Vec<u8>,
}

impl PemBlock {
    fn parse(pem: &str) -> Result<Self, TritonError> {
        let mut lines = pem.lines().map(str::trim);

        let label = lines
            .by_ref()
            .find_map(|line| {
                line.strip_prefix("-----BEGIN ")
                    .and_then(|rest| rest.strip_suffix("-----"))
            })
            .ok_or_else(|| {
                TritonError::InvalidKey("failed to decode PEM block containing private key".to_string())
            })?
            .to_string();

        let end = format!("-----END {}-----", label);
        let mut body = String::new();
        let mut terminated = false;
        for line in lines {
            if line == end {
                terminated = true;
                break;
            }
            if let Some((header, value)) = line.split_once(':') {
                if header.trim() == "Proc-Type" && value.contains("ENCRYPTED") {
                    return Err(TritonError::InvalidKey(
                        "encrypted private keys are not supported, please decrypt the key first".to_string(),
                    ));
                }
                continue;
            }
            body.push_str(line);
        }

        if !terminated {
            return Err(TritonError::InvalidKey(format!("PEM block {} is not terminated", label)));
        }

        let der = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| TritonError::InvalidKey(format!("invalid PEM body: {}", e)))?;

        Ok(Self { label, der })
    }
}

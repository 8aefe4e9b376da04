//! Request canonicalization and RSA-PSS signing.
//!
//! The processor re-derives the canonical string on its side and verifies the
//! signature against the merchant's registered public key, so the output of
//! [`SignParams::canonical_string`] must stay byte-for-byte stable:
//!
//! 1. drop `sign`, `sign_type` and `biz_content`;
//! 2. drop absent values and values that are empty after trimming;
//! 3. sort by key (byte order) and join `key=value` pairs with `&`.
//!
//! The canonical string is signed with RSASSA-PSS (SHA-256, MGF1-SHA-256,
//! 32-byte salt) and the raw signature is base64 encoded.

use crate::payments::error::{PaymentError, PaymentResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::collections::BTreeMap;

/// Value advertised in the `sign_type` field of every signed request.
pub const SIGN_TYPE: &str = "SHA256WithRSA";

const EXCLUDED_KEYS: [&str; 3] = ["sign", "sign_type", "biz_content"];

/// Parameter set for one signed processor call.
///
/// Backed by a `BTreeMap`, so insertion order never affects the canonical
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignParams(BTreeMap<String, Option<String>>);

impl SignParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), Some(value.to_string()));
        self
    }

    pub fn with_opt<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        self.0.insert(key.to_string(), value.map(|v| v.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    /// Builds a parameter set from the top-level fields of a JSON object.
    ///
    /// Strings are taken verbatim, numbers and booleans are stringified,
    /// nulls become absent values and nested values keep their JSON text.
    pub fn from_json_object(value: &JsonValue) -> Self {
        let mut params = Self::new();
        if let Some(object) = value.as_object() {
            for (key, field) in object {
                let rendered = match field {
                    JsonValue::Null => None,
                    JsonValue::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                };
                params.0.insert(key.clone(), rendered);
            }
        }
        params
    }

    pub fn canonical_string(&self) -> String {
        self.0
            .iter()
            .filter(|(key, _)| !EXCLUDED_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| match value {
                Some(v) if !v.trim().is_empty() => Some(format!("{}={}", key, v)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, Option<V>)> for SignParams {
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.map(|v| v.to_string())))
                .collect(),
        )
    }
}

/// Parses a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`)
/// PEM document.
pub fn parse_private_key(pem: &str) -> PaymentResult<RsaPrivateKey> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                format!("not PKCS#8 ({}) nor PKCS#1 ({})", pkcs8_err, pkcs1_err)
            })
        })
        .map_err(|message| PaymentError::KeyError { message })
}

/// Parses an SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`)
/// PEM document.
pub fn parse_public_key(pem: &str) -> PaymentResult<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|spki_err| {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                format!("not SPKI ({}) nor PKCS#1 ({})", spki_err, pkcs1_err)
            })
        })
        .map_err(|message| PaymentError::KeyError { message })
}

/// Signs `params` with the merchant's PEM-encoded private key.
pub fn sign(private_key_pem: &str, params: &SignParams) -> PaymentResult<String> {
    let key = parse_private_key(private_key_pem)?;
    Ok(sign_with_key(key, params))
}

pub fn sign_with_key(key: RsaPrivateKey, params: &SignParams) -> String {
    let signing_key = BlindedSigningKey::<Sha256>::new(key);
    let signature = signing_key.sign_with_rng(&mut OsRng, params.canonical_string().as_bytes());
    STANDARD.encode(signature.to_bytes())
}

/// Checks a base64 signature over `params` against a PEM public key.
///
/// Returns `Ok(false)` for a well-formed key with a non-matching or
/// undecodable signature; only an unusable key is an error.
pub fn verify(public_key_pem: &str, params: &SignParams, signature_b64: &str) -> PaymentResult<bool> {
    let key = parse_public_key(public_key_pem)?;
    let raw = match STANDARD.decode(signature_b64.trim()) {
        Ok(raw) => raw,
        Err(_) => return Ok(false),
    };
    let signature = match Signature::try_from(raw.as_slice()) {
        Ok(signature) => signature,
        Err(_) => return Ok(false),
    };
    let verifying_key = VerifyingKey::<Sha256>::new(key);
    Ok(verifying_key
        .verify(params.canonical_string().as_bytes(), &signature)
        .is_ok())
}

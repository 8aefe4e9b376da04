//! Shared fixtures for unit tests.

use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use std::sync::OnceLock;

struct KeyFixture {
    pkcs8_private: String,
    pkcs1_private: String,
    public: String,
}

fn fixture() -> &'static KeyFixture {
    static FIXTURE: OnceLock<KeyFixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        // 1024 bits keeps key generation fast; PSS with a 32-byte salt still fits.
        let key = RsaPrivateKey::new(&mut OsRng, 1024).expect("generate test key");
        KeyFixture {
            pkcs8_private: key
                .to_pkcs8_pem(LineEnding::LF)
                .expect("encode pkcs8")
                .to_string(),
            pkcs1_private: key
                .to_pkcs1_pem(LineEnding::LF)
                .expect("encode pkcs1")
                .to_string(),
            public: key
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .expect("encode public key"),
        }
    })
}

/// Returns `(private PKCS#8 PEM, public SPKI PEM)`.
pub(crate) fn test_key_pair() -> (&'static str, &'static str) {
    let fixture = fixture();
    (&fixture.pkcs8_private, &fixture.public)
}

pub(crate) fn test_private_key_pkcs1_pem() -> &'static str {
    &fixture().pkcs1_private
}

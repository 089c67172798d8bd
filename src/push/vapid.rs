use base64::{STANDARD_NO_PAD, URL_SAFE_NO_PAD, decode_config, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use p256::ecdsa::SigningKey;
use p256::pkcs8::DecodePrivateKey;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::config::VapidSettings;
use crate::error::ConfigError;

const PRIVATE_KEY_VAR: &str = "VAPID_PRIVATE_KEY";
const PUBLIC_KEY_VAR: &str = "VAPID_PUBLIC_KEY";
const SUBJECT_VAR: &str = "VAPID_SUBJECT";

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

/// The service's validated signing identity.
#[derive(Clone)]
pub struct VapidKeys {
    signing_key: SigningKey,
    public_key: String,
    subject: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    pub fn from_settings(settings: &VapidSettings) -> Result<Self, ConfigError> {
        let private_key = required(settings.private_key.as_deref(), PRIVATE_KEY_VAR)?;
        let public_key = required(settings.public_key.as_deref(), PUBLIC_KEY_VAR)?;
        let subject = required(settings.subject.as_deref(), SUBJECT_VAR)?;

        let secret = parse_private_key(private_key)?;
        let public_bytes = decode_base64url(public_key, PUBLIC_KEY_VAR)?;
        if public_bytes.len() != 65 {
            return Err(ConfigError::InvalidPublicKey);
        }
        let public =
            PublicKey::from_sec1_bytes(&public_bytes).map_err(|_| ConfigError::InvalidPublicKey)?;
        if secret.public_key() != public {
            return Err(ConfigError::KeyMismatch);
        }

        Ok(Self {
            signing_key: SigningKey::from(secret),
            public_key: encode_config(&public_bytes, URL_SAFE_NO_PAD),
            subject: subject.to_string(),
        })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Uncompressed public point, base64url without padding. This is the
    /// `applicationServerKey` browsers subscribe with.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

pub(crate) fn decode_base64url(raw: &str, name: &'static str) -> Result<Vec<u8>, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('=');
    decode_config(trimmed, URL_SAFE_NO_PAD)
        .or_else(|_| decode_config(trimmed, STANDARD_NO_PAD))
        .map_err(|_| ConfigError::InvalidEncoding { name })
}

/// Accepts the raw 32 byte scalar or a PKCS#8 DER document.
fn parse_private_key(raw: &str) -> Result<SecretKey, ConfigError> {
    let bytes = decode_base64url(raw, PRIVATE_KEY_VAR)?;
    if bytes.len() == 32 {
        return SecretKey::from_slice(&bytes).map_err(|_| ConfigError::InvalidPrivateKey);
    }
    SecretKey::from_pkcs8_der(&bytes).map_err(|_| ConfigError::InvalidPrivateKey)
}

pub fn generate_vapid_credentials() -> Result<VapidCredentials, web_push::WebPushError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, web_push::WebPushError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, web_push::URL_SAFE_NO_PAD)?
            .get_public_key();
    let public_key = encode_config(public_key, URL_SAFE_NO_PAD);

    Ok(VapidCredentials {
        private_key,
        public_key,
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

#[cfg(test)]
pub(crate) fn test_settings(seed: u8) -> VapidSettings {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    let mut rng = StdRng::from_seed([seed; 32]);
    let credentials =
        generate_vapid_credentials_with_rng(&mut rng).expect("credentials should generate");
    VapidSettings {
        private_key: Some(credentials.private_key),
        public_key: Some(credentials.public_key),
        subject: Some("mailto:ops@example.com".to_string()),
    }
}

#[cfg(test)]
pub(crate) fn test_keys() -> VapidKeys {
    VapidKeys::from_settings(&test_settings(7)).expect("test keys")
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;

    #[test]
    fn from_settings__should_accept_generated_credentials() {
        // Given
        let settings = test_settings(7);

        // When
        let keys = VapidKeys::from_settings(&settings).expect("load keys");

        // Then
        assert_eq!(Some(keys.public_key()), settings.public_key.as_deref());
        assert_eq!(keys.subject(), "mailto:ops@example.com");
    }

    #[test]
    fn from_settings__should_report_first_missing_value() {
        // Given
        let mut settings = test_settings(7);
        settings.subject = Some("   ".to_string());

        // When
        let err = VapidKeys::from_settings(&settings).expect_err("missing subject");

        // Then
        assert!(matches!(err, ConfigError::Missing("VAPID_SUBJECT")));

        settings.private_key = None;
        let err = VapidKeys::from_settings(&settings).expect_err("missing private key");
        assert!(matches!(err, ConfigError::Missing("VAPID_PRIVATE_KEY")));
    }

    #[test]
    fn from_settings__should_reject_mismatched_public_key() {
        // Given
        let mut settings = test_settings(7);
        settings.public_key = test_settings(9).public_key;

        // When
        let err = VapidKeys::from_settings(&settings).expect_err("mismatch");

        // Then
        assert!(matches!(err, ConfigError::KeyMismatch));
    }

    #[test]
    fn from_settings__should_accept_pkcs8_private_key() {
        // Given
        let mut settings = test_settings(7);
        let raw = decode_base64url(settings.private_key.as_deref().unwrap(), PRIVATE_KEY_VAR)
            .expect("decode raw key");
        let secret = SecretKey::from_slice(&raw).expect("secret");
        let der = secret.to_pkcs8_der().expect("pkcs8");
        settings.private_key = Some(encode_config(der.as_bytes(), URL_SAFE_NO_PAD));

        // When
        let keys = VapidKeys::from_settings(&settings).expect("load pkcs8 keys");

        // Then
        assert_eq!(Some(keys.public_key()), settings.public_key.as_deref());
    }

    #[test]
    fn from_settings__should_tolerate_padding_and_whitespace() {
        // Given
        let mut settings = test_settings(7);
        let public_key = settings.public_key.clone().unwrap();
        settings.public_key = Some(format!("  {public_key}=  "));

        // When
        let keys = VapidKeys::from_settings(&settings).expect("load keys");

        // Then
        assert_eq!(keys.public_key(), public_key);
    }

    #[test]
    fn from_settings__should_reject_garbage_private_key() {
        // Given
        let mut settings = test_settings(7);
        settings.private_key = Some("not*base64".to_string());

        // When
        let err = VapidKeys::from_settings(&settings).expect_err("bad key");

        // Then
        assert!(matches!(
            err,
            ConfigError::InvalidEncoding {
                name: "VAPID_PRIVATE_KEY"
            }
        ));
    }

    #[test]
    fn generate_vapid_credentials_with_rng__should_be_deterministic_for_seed() {
        // When
        let first = test_settings(3);
        let second = test_settings(3);

        // Then
        assert_eq!(first.private_key, second.private_key);
        assert_eq!(first.public_key, second.public_key);
        assert_ne!(first.public_key, test_settings(4).public_key);
    }
}

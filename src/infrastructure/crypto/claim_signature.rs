use crate::application::ports::claim_verifier::{ClaimVerifier, SignatureError};
use crate::domain::value_objects::SiteId;
use crate::shared::config::SiteConfig;
use crate::shared::error::AppError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey, VerifyOnly};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;

fn message_digest(message: &[u8]) -> Message {
    let digest: [u8; 32] = Sha256::digest(message).into();
    Message::from_digest(digest)
}

/// secp256k1 ECDSA（SHA-256）で QR の署名を検証する。
///
/// 署名はコンパクト形式 64 バイトを URL-safe base64（パディングなし）で表現する。
pub struct Secp256k1ClaimVerifier {
    secp: Secp256k1<VerifyOnly>,
    keys: HashMap<SiteId, PublicKey>,
}

impl Secp256k1ClaimVerifier {
    pub fn new(keys: HashMap<SiteId, PublicKey>) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            keys,
        }
    }

    pub fn from_sites(sites: &[SiteConfig]) -> Result<Self, AppError> {
        let mut keys = HashMap::with_capacity(sites.len());
        for site in sites {
            let site_id = SiteId::new(site.id.clone()).map_err(AppError::ConfigurationError)?;
            let key = PublicKey::from_str(site.public_key.trim()).map_err(|err| {
                AppError::ConfigurationError(format!("invalid public key for site {}: {err}", site.id))
            })?;
            keys.insert(site_id, key);
        }
        Ok(Self::new(keys))
    }
}

impl ClaimVerifier for Secp256k1ClaimVerifier {
    fn verify(
        &self,
        site_id: &SiteId,
        message: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        let key = self
            .keys
            .get(site_id)
            .ok_or_else(|| SignatureError::UnknownSite(site_id.clone()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(signature.trim())
            .map_err(|err| SignatureError::Malformed(err.to_string()))?;
        let mut signature =
            Signature::from_compact(&bytes).map_err(|err| SignatureError::Malformed(err.to_string()))?;
        signature.normalize_s();

        self.secp
            .verify_ecdsa(&message_digest(message), &signature, key)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// 現地側で QR を発行するための署名器。
pub struct ClaimSigner {
    secp: Secp256k1<secp256k1::All>,
    secret_key: SecretKey,
}

impl ClaimSigner {
    pub fn new(secret_key: SecretKey) -> Self {
        Self {
            secp: Secp256k1::new(),
            secret_key,
        }
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self, AppError> {
        let secret_key =
            SecretKey::from_str(secret_hex.trim()).map_err(|err| AppError::Crypto(err.to_string()))?;
        Ok(Self::new(secret_key))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, &self.secret_key)
    }

    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self
            .secp
            .sign_ecdsa(&message_digest(message), &self.secret_key);
        URL_SAFE_NO_PAD.encode(signature.serialize_compact())
    }
}

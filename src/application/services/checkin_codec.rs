use crate::application::ports::claim_verifier::{ClaimVerifier, SignatureError};
use crate::domain::entities::CheckinClaim;
use crate::domain::value_objects::SiteId;
use crate::shared::config::CheckinConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// QR に載る JSON の上限。これを超える入力は解析しない。
pub const MAX_PAYLOAD_BYTES: usize = 2048;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed QR payload: {0}")]
    MalformedPayload(String),
    #[error("invalid claim signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("claim for site {site_id} issued at {issued_at} is older than {ttl_secs}s")]
    ExpiredClaim {
        site_id: SiteId,
        issued_at: DateTime<Utc>,
        ttl_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrPayload {
    site_id: String,
    issued_at: i64,
    signature: String,
}

/// QR のテキストを署名付きクレームに復元する。
pub struct CheckinCodec {
    verifier: Arc<dyn ClaimVerifier>,
    ttl: Duration,
    max_clock_skew: Duration,
}

impl CheckinCodec {
    pub fn new(verifier: Arc<dyn ClaimVerifier>, ttl: Duration, max_clock_skew: Duration) -> Self {
        Self {
            verifier,
            ttl,
            max_clock_skew,
        }
    }

    pub fn from_config(verifier: Arc<dyn ClaimVerifier>, config: &CheckinConfig) -> Self {
        Self::new(verifier, config.claim_ttl(), config.max_clock_skew())
    }

    pub fn decode(&self, raw: &str) -> Result<CheckinClaim, DecodeError> {
        self.decode_at(raw, Utc::now())
    }

    pub fn decode_at(&self, raw: &str, now: DateTime<Utc>) -> Result<CheckinClaim, DecodeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DecodeError::MalformedPayload("empty payload".to_string()));
        }
        if raw.len() > MAX_PAYLOAD_BYTES {
            return Err(DecodeError::MalformedPayload(format!(
                "payload exceeds {MAX_PAYLOAD_BYTES} bytes"
            )));
        }

        let payload: QrPayload = serde_json::from_str(raw)
            .map_err(|err| DecodeError::MalformedPayload(err.to_string()))?;
        let site_id =
            SiteId::new(payload.site_id.trim().to_string()).map_err(DecodeError::MalformedPayload)?;
        let signature = payload.signature.trim();
        if signature.is_empty() {
            return Err(DecodeError::MalformedPayload("signature is empty".to_string()));
        }
        let issued_at = DateTime::from_timestamp(payload.issued_at, 0).ok_or_else(|| {
            DecodeError::MalformedPayload(format!("issuedAt out of range: {}", payload.issued_at))
        })?;

        let ahead_ms = issued_at.timestamp_millis() - now.timestamp_millis();
        if i128::from(ahead_ms) > self.max_clock_skew.as_millis() as i128 {
            return Err(DecodeError::MalformedPayload(format!(
                "issuedAt {issued_at} is ahead of the device clock"
            )));
        }

        let claim = CheckinClaim::new(site_id, issued_at, signature.to_string());
        self.verifier
            .verify(&claim.site_id, &claim.signed_message(), &claim.signature)?;

        let age_ms = now.timestamp_millis() - issued_at.timestamp_millis();
        if i128::from(age_ms) > self.ttl.as_millis() as i128 {
            return Err(DecodeError::ExpiredClaim {
                site_id: claim.site_id,
                issued_at,
                ttl_secs: self.ttl.as_secs(),
            });
        }

        Ok(claim)
    }
}

/// クレームを QR 用の JSON に戻す（発行側ツール向け）
pub fn encode_claim(claim: &CheckinClaim) -> Result<String, AppError> {
    let payload = QrPayload {
        site_id: claim.site_id.as_str().to_string(),
        issued_at: claim.issued_at.timestamp(),
        signature: claim.signature.clone(),
    };
    Ok(serde_json::to_string(&payload)?)
}

use crate::domain::value_objects::SiteId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// QR コードから復元した署名付きのチェックイン主張。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinClaim {
    pub site_id: SiteId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    pub signature: String,
}

impl CheckinClaim {
    pub fn new(site_id: SiteId, issued_at: DateTime<Utc>, signature: String) -> Self {
        Self {
            site_id,
            issued_at,
            signature,
        }
    }

    /// 署名対象のバイト列
    pub fn signed_message(&self) -> Vec<u8> {
        signed_message(&self.site_id, self.issued_at.timestamp())
    }
}

pub fn signed_message(site_id: &SiteId, issued_at_secs: i64) -> Vec<u8> {
    format!("{}:{}", site_id.as_str(), issued_at_secs).into_bytes()
}

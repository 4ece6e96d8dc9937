use crate::domain::value_objects::SiteId;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("no key material for site {0}")]
    UnknownSite(SiteId),
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature does not match")]
    Mismatch,
}

/// 現地の鍵で QR の署名を検証する。署名方式はこの実装側の関心事。
pub trait ClaimVerifier: Send + Sync {
    fn verify(&self, site_id: &SiteId, message: &[u8], signature: &str)
        -> Result<(), SignatureError>;
}

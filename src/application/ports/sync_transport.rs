use crate::domain::entities::{BatchAcknowledgement, SyncBatch};
use async_trait::async_trait;
use thiserror::Error;

/// 応答が得られなかった送信失敗。いずれも一時的な失敗として再送対象になる。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connectivity lost: {0}")]
    Connectivity(String),
    #[error("request timed out")]
    Timeout,
    #[error("remote returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// リモートへのバッチ送信（HTTP 実装は外部の協調者）。
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn send_batch(&self, batch: &SyncBatch) -> Result<BatchAcknowledgement, TransportError>;
}

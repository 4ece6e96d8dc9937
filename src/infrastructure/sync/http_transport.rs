use super::wire::{SyncRequestDto, SyncResponseDto};
use crate::application::ports::credential_provider::CredentialProvider;
use crate::application::ports::sync_transport::{SyncTransport, TransportError};
use crate::domain::entities::{BatchAcknowledgement, SyncBatch};
use crate::domain::value_objects::DeviceId;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

/// JSON over HTTPS でバッチを送る同期トランスポート。
pub struct HttpSyncTransport {
    client: reqwest::Client,
    endpoint: String,
    device_id: DeviceId,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpSyncTransport {
    pub fn new(
        config: &SyncConfig,
        device_id: DeviceId,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            device_id,
            credentials,
        })
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::InvalidResponse(err.to_string())
        } else {
            TransportError::Connectivity(err.to_string())
        }
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn send_batch(&self, batch: &SyncBatch) -> Result<BatchAcknowledgement, TransportError> {
        let payload = SyncRequestDto::from_batch(&self.device_id, batch);
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("X-Batch-Id", batch.batch_id.to_string())
            .json(&payload);
        if let Some(token) = self.credentials.bearer_token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Self::map_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body: SyncResponseDto = response.json().await.map_err(Self::map_error)?;
        tracing::debug!(
            target: "sync::http",
            batch_id = %batch.batch_id,
            outcomes = body.outcomes.len(),
            "Received sync response"
        );
        Ok(body.into_acknowledgement(batch))
    }
}

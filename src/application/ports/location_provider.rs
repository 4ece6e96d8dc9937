use crate::domain::entities::LocationSample;
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// 端末の位置情報ソース。開始・停止は購読側（`LocationTracker`）が所有する。
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn start_updates(&self, sink: mpsc::Sender<LocationSample>) -> Result<(), AppError>;
    async fn stop_updates(&self) -> Result<(), AppError>;
}

use crate::application::ports::location_provider::LocationProvider;
use crate::domain::entities::LocationSample;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

const SAMPLE_BUFFER: usize = 16;

/// 位置情報の購読。開始・停止は画面ではなくこの型の所有者が決める。
pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    latest: Arc<watch::Sender<Option<LocationSample>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl LocationTracker {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            provider,
            latest: Arc::new(latest),
            pump: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel(SAMPLE_BUFFER);
        self.provider.start_updates(tx).await?;

        let latest = Arc::clone(&self.latest);
        *pump = Some(tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                latest.send_replace(Some(sample));
            }
        }));
        tracing::debug!(target: "location::tracker", "Location updates started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), AppError> {
        let Some(handle) = self.pump.lock().await.take() else {
            return Ok(());
        };
        let result = self.provider.stop_updates().await;
        handle.abort();
        tracing::debug!(target: "location::tracker", "Location updates stopped");
        result
    }

    pub async fn is_running(&self) -> bool {
        self.pump.lock().await.is_some()
    }

    pub fn latest(&self) -> Option<LocationSample> {
        *self.latest.borrow()
    }

    /// `max_age` 以内に取得したサンプルだけを返す
    pub fn fresh_sample(&self, max_age: Duration, now: DateTime<Utc>) -> Option<LocationSample> {
        self.latest()
            .filter(|sample| sample.age_at(now).num_milliseconds() <= max_age.as_millis() as i64)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LocationSample>> {
        self.latest.subscribe()
    }
}

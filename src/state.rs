use crate::application::ports::{
    ClaimVerifier, CredentialProvider, EventStore, SiteDirectory, StaticCredential, SyncTransport,
};
use crate::application::services::sync_engine::Backoff;
use crate::application::services::{
    CheckinCodec, CheckinCoordinator, EventIdGenerator, ReportAggregator, SyncEngine, SyncOptions,
};
use crate::domain::value_objects::{DeviceId, WorkerId};
use crate::infrastructure::crypto::Secp256k1ClaimVerifier;
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::event_store::SqliteEventStore;
use crate::infrastructure::sync::HttpSyncTransport;
use crate::infrastructure::StaticSiteDirectory;
use crate::shared::config::AppConfig;
use anyhow::anyhow;
use std::sync::Arc;

const REPORT_WINDOW_HOURS: i64 = 1;

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: ConnectionPool,
    pub event_store: Arc<dyn EventStore>,
    pub coordinator: Arc<CheckinCoordinator>,
    pub sync_engine: Arc<SyncEngine>,
    pub reports: Arc<ReportAggregator>,
    pub device_id: DeviceId,
}

impl AppState {
    /// 設定から HTTP トランスポートを含めて組み立てる
    pub async fn initialize(config: AppConfig) -> anyhow::Result<Self> {
        let device_id = DeviceId::new(config.device.device_id.clone()).map_err(anyhow::Error::msg)?;
        let token = std::env::var("FIELDCHECK_SYNC_TOKEN").ok();
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredential::new(token));
        let transport = Arc::new(HttpSyncTransport::new(&config.sync, device_id, credentials)?);
        Self::with_transport(config, transport).await
    }

    pub async fn with_transport(
        config: AppConfig,
        transport: Arc<dyn SyncTransport>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|err| anyhow!("invalid configuration: {err}"))?;

        let device_id = DeviceId::new(config.device.device_id.clone()).map_err(anyhow::Error::msg)?;
        let worker_id = WorkerId::new(config.device.worker_id.clone()).map_err(anyhow::Error::msg)?;

        let db_pool = ConnectionPool::from_config(&config.database).await?;
        db_pool.migrate().await?;
        let event_store: Arc<dyn EventStore> =
            Arc::new(SqliteEventStore::new(db_pool.get_pool().clone()));

        let ids = Arc::new(EventIdGenerator::resume(device_id.clone(), event_store.as_ref()).await?);
        let verifier: Arc<dyn ClaimVerifier> =
            Arc::new(Secp256k1ClaimVerifier::from_sites(&config.sites)?);
        let sites: Arc<dyn SiteDirectory> = Arc::new(StaticSiteDirectory::from_sites(&config.sites)?);

        let coordinator = Arc::new(CheckinCoordinator::new(
            CheckinCodec::from_config(verifier, &config.checkin),
            sites,
            Arc::clone(&event_store),
            ids,
            worker_id,
            &config.checkin,
        ));
        let sync_engine = Arc::new(SyncEngine::new(
            Arc::clone(&event_store),
            transport,
            SyncOptions::from_config(&config.sync, &config.storage),
            Backoff::from_config(&config.sync),
        ));
        let reports = Arc::new(ReportAggregator::new(
            Arc::clone(&event_store),
            chrono::Duration::hours(REPORT_WINDOW_HOURS),
        ));

        tracing::info!(
            device_id = %device_id,
            sites = config.sites.len(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            event_store,
            coordinator,
            sync_engine,
            reports,
            device_id,
        })
    }

    pub async fn shutdown(&self) {
        self.db_pool.close().await;
    }
}

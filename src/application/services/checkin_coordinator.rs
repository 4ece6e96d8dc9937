use super::checkin_codec::{CheckinCodec, DecodeError};
use super::event_id_generator::EventIdGenerator;
use crate::application::ports::event_store::EventStore;
use crate::application::ports::site_directory::SiteDirectory;
use crate::domain::entities::{CheckinEvent, LocationSample};
use crate::domain::services::{GeoValidator, GeofenceVerdict};
use crate::domain::value_objects::{SiteId, WorkerId};
use crate::shared::config::CheckinConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckinError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("site {0} is not configured on this device")]
    UnknownSite(SiteId),
    #[error("outside the site geofence ({distance_m:.1} m from center)")]
    OutsideGeofence { distance_m: f64 },
    #[error("location too imprecise, take a new reading: {0}")]
    LocationImprecise(String),
    #[error("invalid location sample: {0}")]
    InvalidLocation(String),
    #[error("check-in not recorded, retry: {0}")]
    Storage(AppError),
}

impl CheckinError {
    /// 同じ操作をやり直せば通る可能性があるか
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckinError::LocationImprecise(_) | CheckinError::Storage(_)
        )
    }
}

/// チェックイン作成の唯一の経路。同期処理を待たずに保存して返す。
pub struct CheckinCoordinator {
    codec: CheckinCodec,
    sites: Arc<dyn SiteDirectory>,
    store: Arc<dyn EventStore>,
    ids: Arc<EventIdGenerator>,
    worker_id: WorkerId,
    validator: GeoValidator,
    max_accuracy_m: f64,
    max_sample_age: Duration,
}

impl CheckinCoordinator {
    pub fn new(
        codec: CheckinCodec,
        sites: Arc<dyn SiteDirectory>,
        store: Arc<dyn EventStore>,
        ids: Arc<EventIdGenerator>,
        worker_id: WorkerId,
        config: &CheckinConfig,
    ) -> Self {
        Self {
            codec,
            sites,
            store,
            ids,
            worker_id,
            validator: GeoValidator::new(),
            max_accuracy_m: config.max_accuracy_m,
            max_sample_age: config.max_sample_age(),
        }
    }

    pub async fn submit_checkin(
        &self,
        raw_qr_text: &str,
        sample: LocationSample,
    ) -> Result<CheckinEvent, CheckinError> {
        self.submit_checkin_at(raw_qr_text, sample, Utc::now()).await
    }

    pub async fn submit_checkin_at(
        &self,
        raw_qr_text: &str,
        sample: LocationSample,
        now: DateTime<Utc>,
    ) -> Result<CheckinEvent, CheckinError> {
        let claim = self.codec.decode_at(raw_qr_text, now)?;

        // 範囲チェック済みのサンプルに揃える
        let sample = LocationSample::new(
            sample.latitude,
            sample.longitude,
            sample.accuracy_m,
            sample.captured_at,
        )
        .map_err(CheckinError::InvalidLocation)?;

        let geofence = self
            .sites
            .geofence(&claim.site_id)
            .ok_or_else(|| CheckinError::UnknownSite(claim.site_id.clone()))?;

        if sample.accuracy_m > self.max_accuracy_m {
            return Err(CheckinError::LocationImprecise(format!(
                "accuracy {:.1} m exceeds {:.1} m",
                sample.accuracy_m, self.max_accuracy_m
            )));
        }
        let age = sample.age_at(now);
        if age.num_milliseconds() > self.max_sample_age.as_millis() as i64 {
            return Err(CheckinError::LocationImprecise(format!(
                "reading is {}s old",
                age.num_seconds()
            )));
        }

        let check = self.validator.evaluate(&sample, &geofence);
        match check.verdict {
            GeofenceVerdict::Inside => {}
            GeofenceVerdict::Outside => {
                tracing::info!(
                    target: "checkin::coordinator",
                    site_id = %claim.site_id,
                    distance_m = check.distance_m,
                    "Check-in rejected outside geofence"
                );
                return Err(CheckinError::OutsideGeofence {
                    distance_m: check.distance_m,
                });
            }
            GeofenceVerdict::Indeterminate => {
                return Err(CheckinError::LocationImprecise(format!(
                    "accuracy {:.1} m overlaps the geofence boundary",
                    sample.accuracy_m
                )));
            }
        }

        let event = CheckinEvent::new_pending(
            self.ids.next_id(),
            self.worker_id.clone(),
            sample,
            claim,
            now,
        );
        let stored = self.store.append(event).await.map_err(|err| {
            tracing::error!(target: "checkin::coordinator", error = %err, "Failed to persist check-in");
            CheckinError::Storage(err)
        })?;
        if !stored.inserted {
            tracing::warn!(
                target: "checkin::coordinator",
                local_id = %stored.event.id,
                "Local id already stored; returning existing event"
            );
        }

        tracing::info!(
            target: "checkin::coordinator",
            local_id = %stored.event.id,
            site_id = %stored.event.site_id,
            "Check-in recorded"
        );
        Ok(stored.event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::claim_verifier::SignatureError;
    use crate::application::ports::event_store::{AppendResult, StatusUpdate, StoreChange};
    use crate::application::services::test_support::*;
    use crate::domain::value_objects::{CheckinEventId, CheckinSyncStatus, DeviceId};
    use crate::shared::config::AppConfig;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use tokio::sync::broadcast;

    fn checkin_config() -> CheckinConfig {
        AppConfig::default().checkin
    }

    fn coordinator_with(store: Arc<dyn EventStore>) -> CheckinCoordinator {
        let config = checkin_config();
        CheckinCoordinator::new(
            CheckinCodec::from_config(verifier(), &config),
            directory(),
            store,
            Arc::new(EventIdGenerator::new(device_id(), 0)),
            worker_id(),
            &config,
        )
    }

    #[tokio::test]
    async fn records_pending_event_inside_geofence() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();

        let event = coordinator
            .submit_checkin_at(&qr_payload(SITE, now), sample_at(SITE_LAT, SITE_LON, 8.0, now), now)
            .await
            .unwrap();

        assert_eq!(event.status(), CheckinSyncStatus::Pending);
        assert_eq!(event.site_id, site_id());
        assert_eq!(event.worker_id, worker_id());
        let stored = store.get(&event.id).await.unwrap().unwrap();
        assert!(stored.same_business_fields(&event));
    }

    #[tokio::test]
    async fn same_qr_twice_creates_two_events() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();
        let raw = qr_payload(SITE, now);

        let first = coordinator
            .submit_checkin_at(&raw, sample_at(SITE_LAT, SITE_LON, 5.0, now), now)
            .await
            .unwrap();
        let second = coordinator
            .submit_checkin_at(&raw, sample_at(SITE_LAT, SITE_LON, 5.0, now), now)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn outside_geofence_is_not_persisted() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();

        let result = coordinator
            .submit_checkin_at(&qr_payload(SITE, now), sample_at(SITE_LAT + 0.01, SITE_LON, 5.0, now), now)
            .await;

        match result {
            Err(CheckinError::OutsideGeofence { distance_m }) => assert!(distance_m > 1_000.0),
            other => panic!("expected OutsideGeofence, got {other:?}"),
        }
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn boundary_overlap_is_imprecise() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();
        // 中心から約 75 m、精度 10 m（半径 80 m の境界をまたぐ）
        let sample = sample_at(SITE_LAT + 0.000674, SITE_LON, 10.0, now);

        let err = coordinator
            .submit_checkin_at(&qr_payload(SITE, now), sample, now)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckinError::LocationImprecise(_)));
        assert!(err.is_retryable());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn coarse_or_stale_samples_are_imprecise() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();
        let raw = qr_payload(SITE, now);

        let coarse = coordinator
            .submit_checkin_at(&raw, sample_at(SITE_LAT, SITE_LON, 500.0, now), now)
            .await;
        assert!(matches!(coarse, Err(CheckinError::LocationImprecise(_))));

        let stale = coordinator
            .submit_checkin_at(
                &raw,
                sample_at(SITE_LAT, SITE_LON, 5.0, now - ChronoDuration::minutes(10)),
                now,
            )
            .await;
        assert!(matches!(stale, Err(CheckinError::LocationImprecise(_))));
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();
        let mut sample = sample_at(SITE_LAT, SITE_LON, 5.0, now);
        sample.latitude = 123.0;

        let err = coordinator
            .submit_checkin_at(&qr_payload(SITE, now), sample, now)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckinError::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn decode_errors_pass_through() {
        let store = memory_store().await;
        let coordinator = coordinator_with(store.clone());
        let now = Utc::now();
        let sample = sample_at(SITE_LAT, SITE_LON, 5.0, now);

        let expired = coordinator
            .submit_checkin_at(&qr_payload(SITE, now - ChronoDuration::hours(48)), sample, now)
            .await;
        assert!(matches!(
            expired,
            Err(CheckinError::Decode(DecodeError::ExpiredClaim { .. }))
        ));

        let garbage = coordinator.submit_checkin_at("garbage", sample, now).await;
        assert!(matches!(
            garbage,
            Err(CheckinError::Decode(DecodeError::MalformedPayload(_)))
        ));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn signed_claim_for_unconfigured_site_is_unknown_site() {
        let store = memory_store().await;
        let config = checkin_config();
        // 鍵はあるがジオフェンスが未設定のサイト
        let mut keys = HashMap::new();
        keys.insert(SiteId::new("farm-02".to_string()).unwrap(), signer().public_key());
        let verifier = Arc::new(crate::infrastructure::crypto::Secp256k1ClaimVerifier::new(keys));
        let coordinator = CheckinCoordinator::new(
            CheckinCodec::from_config(verifier, &config),
            directory(),
            store,
            Arc::new(EventIdGenerator::new(device_id(), 0)),
            worker_id(),
            &config,
        );
        let now = Utc::now();

        let err = coordinator
            .submit_checkin_at(&qr_payload("farm-02", now), sample_at(SITE_LAT, SITE_LON, 5.0, now), now)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckinError::UnknownSite(_)));

        let forged = coordinator
            .submit_checkin_at(&qr_payload(SITE, now), sample_at(SITE_LAT, SITE_LON, 5.0, now), now)
            .await
            .unwrap_err();
        assert!(matches!(
            forged,
            CheckinError::Decode(DecodeError::InvalidSignature(SignatureError::UnknownSite(_)))
        ));
    }

    struct FailingStore {
        changes: broadcast::Sender<StoreChange>,
    }

    #[async_trait]
    impl EventStore for FailingStore {
        async fn append(&self, _event: CheckinEvent) -> Result<AppendResult, AppError> {
            Err(AppError::Database("disk I/O error".to_string()))
        }
        async fn get(&self, _id: &CheckinEventId) -> Result<Option<CheckinEvent>, AppError> {
            Ok(None)
        }
        async fn update_status(&self, _update: StatusUpdate) -> Result<(), AppError> {
            Ok(())
        }
        async fn update_statuses(&self, _updates: Vec<StatusUpdate>) -> Result<(), AppError> {
            Ok(())
        }
        async fn list_by_status(
            &self,
            _status: CheckinSyncStatus,
            _limit: u32,
        ) -> Result<Vec<CheckinEvent>, AppError> {
            Ok(vec![])
        }
        async fn list_all(&self) -> Result<Vec<CheckinEvent>, AppError> {
            Ok(vec![])
        }
        async fn count_by_status(&self) -> Result<HashMap<CheckinSyncStatus, u64>, AppError> {
            Ok(HashMap::new())
        }
        async fn requeue_in_flight(&self) -> Result<u64, AppError> {
            Ok(0)
        }
        async fn prune_acked_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, AppError> {
            Ok(0)
        }
        async fn max_sequence(&self, _device_id: &DeviceId) -> Result<Option<u64>, AppError> {
            Ok(None)
        }
        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.changes.subscribe()
        }
    }

    #[tokio::test]
    async fn storage_failure_is_surfaced() {
        let (changes, _) = broadcast::channel(4);
        let coordinator = coordinator_with(Arc::new(FailingStore { changes }));
        let now = Utc::now();

        let err = coordinator
            .submit_checkin_at(&qr_payload(SITE, now), sample_at(SITE_LAT, SITE_LON, 5.0, now), now)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckinError::Storage(_)));
        assert!(err.to_string().contains("not recorded"));
    }
}

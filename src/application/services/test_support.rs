//! サービス層テスト用の共通フィクスチャ。

use crate::application::ports::sync_transport::{SyncTransport, TransportError};
use crate::domain::entities::{BatchAcknowledgement, EventOutcome, LocationSample, SiteGeofence, SyncBatch};
use crate::domain::value_objects::{DeviceId, SiteId, WorkerId};
use crate::infrastructure::crypto::{ClaimSigner, Secp256k1ClaimVerifier};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::event_store::SqliteEventStore;
use crate::infrastructure::StaticSiteDirectory;
use crate::domain::entities::checkin_claim::signed_message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secp256k1::SecretKey;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SITE: &str = "farm-01";
pub const SITE_LAT: f64 = 4.711;
pub const SITE_LON: f64 = -74.072;
pub const SITE_RADIUS_M: f64 = 80.0;

pub fn site_id() -> SiteId {
    SiteId::new(SITE.to_string()).unwrap()
}

pub fn device_id() -> DeviceId {
    DeviceId::new("tablet-07".to_string()).unwrap()
}

pub fn worker_id() -> WorkerId {
    WorkerId::new("w-42".to_string()).unwrap()
}

pub fn signer() -> ClaimSigner {
    ClaimSigner::new(SecretKey::from_slice(&[0x11; 32]).unwrap())
}

pub fn verifier() -> Arc<Secp256k1ClaimVerifier> {
    let mut keys = HashMap::new();
    keys.insert(site_id(), signer().public_key());
    Arc::new(Secp256k1ClaimVerifier::new(keys))
}

pub fn directory() -> Arc<StaticSiteDirectory> {
    Arc::new(StaticSiteDirectory::new(vec![SiteGeofence::new(
        site_id(),
        SITE_LAT,
        SITE_LON,
        SITE_RADIUS_M,
    )
    .unwrap()]))
}

/// 指定サイト・発行時刻の QR ペイロード（JSON）
pub fn qr_payload(site: &str, issued_at: DateTime<Utc>) -> String {
    let site = SiteId::new(site.to_string()).unwrap();
    let signature = signer().sign(&signed_message(&site, issued_at.timestamp()));
    serde_json::json!({
        "siteId": site.as_str(),
        "issuedAt": issued_at.timestamp(),
        "signature": signature,
    })
    .to_string()
}

pub fn sample_at(latitude: f64, longitude: f64, accuracy_m: f64, captured_at: DateTime<Utc>) -> LocationSample {
    LocationSample::new(latitude, longitude, accuracy_m, captured_at).unwrap()
}

pub async fn memory_store() -> Arc<SqliteEventStore> {
    let pool = ConnectionPool::from_memory().await.unwrap();
    pool.migrate().await.unwrap();
    Arc::new(SqliteEventStore::new(pool.get_pool().clone()))
}

/// 応答をあらかじめ積んでおくトランスポート。
pub enum Scripted {
    /// 全イベントに同じ判定を返す
    All(EventOutcome),
    /// ID ごとの判定（含まれないものは UNKNOWN）
    PerEvent(Vec<(String, EventOutcome)>),
    Fail(TransportError),
    Hang,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().unwrap().push_back(step);
    }

    /// 送信されたバッチごとのローカル ID
    pub fn sent(&self) -> Vec<Vec<String>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn send_batch(&self, batch: &SyncBatch) -> Result<BatchAcknowledgement, TransportError> {
        self.sent.lock().unwrap().push(
            batch
                .event_ids()
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
        );
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::All(EventOutcome::Accepted));

        match step {
            Scripted::All(outcome) => Ok(batch
                .event_ids()
                .into_iter()
                .fold(BatchAcknowledgement::new(), |ack, id| ack.with_outcome(id, outcome.clone()))),
            Scripted::PerEvent(outcomes) => {
                let mut ack = BatchAcknowledgement::new();
                for (id, outcome) in outcomes {
                    ack.insert(id.parse().unwrap(), outcome);
                }
                Ok(ack)
            }
            Scripted::Fail(err) => Err(err),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Timeout)
            }
        }
    }
}

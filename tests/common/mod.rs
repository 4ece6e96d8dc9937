#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldcheck::application::ports::{SyncTransport, TransportError};
use fieldcheck::domain::entities::checkin_claim::signed_message;
use fieldcheck::domain::entities::{BatchAcknowledgement, EventOutcome, LocationSample, SyncBatch};
use fieldcheck::domain::value_objects::SiteId;
use fieldcheck::infrastructure::crypto::ClaimSigner;
use fieldcheck::shared::config::{AppConfig, SiteConfig};
use secp256k1::SecretKey;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const SITE: &str = "greenhouse-3";
pub const SITE_LAT: f64 = -33.4489;
pub const SITE_LON: f64 = -70.6693;

pub fn signer() -> ClaimSigner {
    ClaimSigner::new(SecretKey::from_slice(&[0x5a; 32]).unwrap())
}

pub fn config_in(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite:{}/fieldcheck.db", dir.display());
    config.device.device_id = "handheld-12".to_string();
    config.device.worker_id = "crew-7".to_string();
    config.sync.base_backoff_ms = 10;
    config.sync.max_backoff_ms = 100;
    config.sync.max_retry = 2;
    config.sync.idle_interval_secs = 60;
    config.sites = vec![SiteConfig {
        id: SITE.to_string(),
        latitude: SITE_LAT,
        longitude: SITE_LON,
        radius_m: 100.0,
        public_key: signer().public_key().to_string(),
    }];
    config
}

pub fn qr_payload(issued_at: DateTime<Utc>) -> String {
    let site = SiteId::new(SITE.to_string()).unwrap();
    let signature = signer().sign(&signed_message(&site, issued_at.timestamp()));
    serde_json::json!({
        "siteId": SITE,
        "issuedAt": issued_at.timestamp(),
        "signature": signature,
    })
    .to_string()
}

pub fn on_site_sample() -> LocationSample {
    LocationSample::new(SITE_LAT, SITE_LON, 6.0, Utc::now()).unwrap()
}

/// 応答を切り替えられる記録付きトランスポート
pub struct RecordingTransport {
    online: Mutex<bool>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl RecordingTransport {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: Mutex::new(online),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn set_online(&self, online: bool) {
        *self.online.lock().unwrap() = online;
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTransport for RecordingTransport {
    async fn send_batch(&self, batch: &SyncBatch) -> Result<BatchAcknowledgement, TransportError> {
        self.batches
            .lock()
            .unwrap()
            .push(batch.event_ids().iter().map(|id| id.to_string()).collect());
        if !*self.online.lock().unwrap() {
            return Err(TransportError::Connectivity("no route to host".to_string()));
        }
        Ok(batch
            .event_ids()
            .into_iter()
            .fold(BatchAcknowledgement::new(), |ack, id| {
                ack.with_outcome(id, EventOutcome::Accepted)
            }))
    }
}

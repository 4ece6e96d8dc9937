use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub device: DeviceConfig,
    pub checkin: CheckinConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinConfig {
    pub claim_ttl_secs: u64,
    pub max_clock_skew_secs: u64,
    pub max_accuracy_m: f64,
    pub max_sample_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub endpoint: String,
    pub batch_size: u32,
    pub max_retry: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ratio: f64,
    pub request_timeout_secs: u64,
    pub idle_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub retention_days: u32,
}

/// 現地のジオフェンスと QR 署名検証鍵。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
    /// secp256k1 公開鍵（圧縮形式の hex）
    pub public_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/fieldcheck.db".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            device: DeviceConfig {
                device_id: uuid::Uuid::new_v4().simple().to_string(),
                worker_id: String::new(),
            },
            checkin: CheckinConfig {
                claim_ttl_secs: 24 * 60 * 60,
                max_clock_skew_secs: 300,
                max_accuracy_m: 50.0,
                max_sample_age_secs: 120,
            },
            sync: SyncConfig {
                auto_sync: true,
                endpoint: "http://localhost:8000/api/v1/checkins/sync".to_string(),
                batch_size: 50,
                max_retry: 8,
                base_backoff_ms: 1_000,
                max_backoff_ms: 5 * 60 * 1_000, // 5 minutes
                jitter_ratio: 0.2,
                request_timeout_secs: 30,
                idle_interval_secs: 60,
            },
            storage: StorageConfig { retention_days: 30 },
            sites: vec![],
        }
    }
}

impl CheckinConfig {
    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }

    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }

    pub fn max_sample_age(&self) -> Duration {
        Duration::from_secs(self.max_sample_age_secs)
    }
}

impl SyncConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

impl StorageConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_toml_str(source: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(source)?)
    }

    /// 設定ファイルを読み込み、環境変数で上書きする
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml_str(&source)?.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("FIELDCHECK_DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FIELDCHECK_DEVICE_ID") {
            if !v.trim().is_empty() {
                self.device.device_id = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FIELDCHECK_WORKER_ID") {
            if !v.trim().is_empty() {
                self.device.worker_id = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FIELDCHECK_SYNC_ENDPOINT") {
            if !v.trim().is_empty() {
                self.sync.endpoint = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FIELDCHECK_SYNC_AUTO") {
            self.sync.auto_sync = parse_bool(&v, self.sync.auto_sync);
        }
        if let Some(value) = env_u64("FIELDCHECK_SYNC_BATCH_SIZE") {
            self.sync.batch_size = value.clamp(1, u64::from(u32::MAX)) as u32;
        }
        if let Some(value) = env_u64("FIELDCHECK_SYNC_MAX_RETRY") {
            self.sync.max_retry = value.min(u64::from(u32::MAX)) as u32;
        }
        if let Some(value) = env_u64("FIELDCHECK_SYNC_TIMEOUT_SECS") {
            self.sync.request_timeout_secs = value.max(1);
        }
        if let Some(value) = env_u64("FIELDCHECK_CLAIM_TTL_SECS") {
            self.checkin.claim_ttl_secs = value;
        }
        if let Ok(v) = std::env::var("FIELDCHECK_MAX_ACCURACY_M") {
            if let Some(value) = parse_f64(&v) {
                self.checkin.max_accuracy_m = value.max(0.0);
            }
        }
        if let Some(value) = env_u64("FIELDCHECK_RETENTION_DAYS") {
            self.storage.retention_days = value.min(u64::from(u32::MAX)) as u32;
        }

        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.device.device_id.trim().is_empty() {
            return Err("Device device_id must not be empty".to_string());
        }
        if self.device.worker_id.trim().is_empty() {
            return Err("Device worker_id must not be empty".to_string());
        }
        if self.checkin.claim_ttl_secs == 0 {
            return Err("Checkin claim_ttl_secs must be greater than 0".to_string());
        }
        if !self.checkin.max_accuracy_m.is_finite() || self.checkin.max_accuracy_m <= 0.0 {
            return Err("Checkin max_accuracy_m must be a positive number".to_string());
        }
        if self.sync.batch_size == 0 {
            return Err("Sync batch_size must be greater than 0".to_string());
        }
        if self.sync.base_backoff_ms == 0 {
            return Err("Sync base_backoff_ms must be greater than 0".to_string());
        }
        if self.sync.max_backoff_ms < self.sync.base_backoff_ms {
            return Err("Sync max_backoff_ms must not be less than base_backoff_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.sync.jitter_ratio) {
            return Err("Sync jitter_ratio must be within 0.0..=1.0".to_string());
        }
        if self.sync.request_timeout_secs == 0 {
            return Err("Sync request_timeout_secs must be greater than 0".to_string());
        }
        for site in &self.sites {
            if site.id.trim().is_empty() {
                return Err("Site id must not be empty".to_string());
            }
            if !site.radius_m.is_finite() || site.radius_m <= 0.0 {
                return Err(format!("Site {} radius_m must be a positive number", site.id));
            }
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_f64(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| parse_u64(&v))
}

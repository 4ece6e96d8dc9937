use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 位置情報の一回分の読み取り値。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// 精度半径（メートル）
    pub accuracy_m: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("Latitude out of range: {latitude}"));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("Longitude out of range: {longitude}"));
        }
        if !accuracy_m.is_finite() || accuracy_m < 0.0 {
            return Err(format!("Accuracy must be a non-negative number: {accuracy_m}"));
        }

        // 永続化はミリ秒精度なので、ここで揃えておく
        let captured_at = DateTime::from_timestamp_millis(captured_at.timestamp_millis())
            .ok_or_else(|| "Capture timestamp out of range".to_string())?;

        Ok(Self {
            latitude,
            longitude,
            accuracy_m,
            captured_at,
        })
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.captured_at)
    }
}

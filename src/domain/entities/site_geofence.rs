use crate::domain::value_objects::SiteId;
use serde::{Deserialize, Serialize};

/// 円形のジオフェンス（中心＋半径）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteGeofence {
    pub site_id: SiteId,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_m: f64,
}

impl SiteGeofence {
    pub fn new(
        site_id: SiteId,
        center_latitude: f64,
        center_longitude: f64,
        radius_m: f64,
    ) -> Result<Self, String> {
        if !(-90.0..=90.0).contains(&center_latitude) || !(-180.0..=180.0).contains(&center_longitude)
        {
            return Err(format!("Geofence center out of range for site {site_id}"));
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(format!("Geofence radius must be positive for site {site_id}"));
        }
        Ok(Self {
            site_id,
            center_latitude,
            center_longitude,
            radius_m,
        })
    }
}

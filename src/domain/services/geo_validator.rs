use crate::domain::entities::{LocationSample, SiteGeofence};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeofenceVerdict {
    Inside,
    Outside,
    /// 精度が足りず判定できない。新しいサンプルが必要。
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub verdict: GeofenceVerdict,
    pub distance_m: f64,
}

/// 位置サンプルがジオフェンスを満たすか判定する（副作用なし）。
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoValidator;

impl GeoValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, sample: &LocationSample, geofence: &SiteGeofence) -> GeofenceVerdict {
        self.evaluate(sample, geofence).verdict
    }

    pub fn evaluate(&self, sample: &LocationSample, geofence: &SiteGeofence) -> GeofenceCheck {
        let distance_m = haversine_distance_m(
            sample.latitude,
            sample.longitude,
            geofence.center_latitude,
            geofence.center_longitude,
        );
        GeofenceCheck {
            verdict: classify(distance_m, sample.accuracy_m, geofence.radius_m),
            distance_m,
        }
    }
}

/// 距離・精度・半径から判定する。精度の分だけ保守的に扱う。
pub fn classify(distance_m: f64, accuracy_m: f64, radius_m: f64) -> GeofenceVerdict {
    if distance_m + accuracy_m <= radius_m {
        GeofenceVerdict::Inside
    } else if distance_m - accuracy_m > radius_m {
        GeofenceVerdict::Outside
    } else {
        GeofenceVerdict::Indeterminate
    }
}

pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::SiteId;
    use chrono::Utc;
    use proptest::prelude::*;

    fn origin_fence(radius_m: f64) -> SiteGeofence {
        SiteGeofence::new(SiteId::new("site-0".into()).unwrap(), 0.0, 0.0, radius_m).unwrap()
    }

    /// 赤道上で原点から東へ distance_m 離れた地点
    fn sample_east_of_origin(distance_m: f64, accuracy_m: f64) -> LocationSample {
        let lon = (distance_m / EARTH_RADIUS_M).to_degrees();
        LocationSample::new(0.0, lon, accuracy_m, Utc::now()).unwrap()
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Bogotá -> Medellín（約 240km）
        let d = haversine_distance_m(4.711, -74.0721, 6.2442, -75.5812);
        assert!((d - 240_000.0).abs() < 5_000.0, "distance was {d}");
        assert_eq!(haversine_distance_m(1.0, 2.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn inside_when_accuracy_fits_within_margin() {
        let validator = GeoValidator::new();
        let verdict = validator.validate(&sample_east_of_origin(40.0, 5.0), &origin_fence(50.0));
        assert_eq!(verdict, GeofenceVerdict::Inside);
    }

    #[test]
    fn indeterminate_when_accuracy_exceeds_margin() {
        let validator = GeoValidator::new();
        let verdict = validator.validate(&sample_east_of_origin(40.0, 20.0), &origin_fence(50.0));
        assert_eq!(verdict, GeofenceVerdict::Indeterminate);
    }

    #[test]
    fn outside_when_even_best_case_is_beyond_radius() {
        let validator = GeoValidator::new();
        let check = validator.evaluate(&sample_east_of_origin(120.0, 10.0), &origin_fence(50.0));
        assert_eq!(check.verdict, GeofenceVerdict::Outside);
        assert!((check.distance_m - 120.0).abs() < 0.01);
    }

    proptest! {
        #[test]
        fn classify_follows_accuracy_rules(
            distance in 0.0f64..5_000.0,
            accuracy in 0.0f64..500.0,
            radius in 1.0f64..2_000.0,
        ) {
            let verdict = classify(distance, accuracy, radius);
            if distance + accuracy <= radius {
                prop_assert_eq!(verdict, GeofenceVerdict::Inside);
            } else if distance - accuracy > radius {
                prop_assert_eq!(verdict, GeofenceVerdict::Outside);
            } else {
                prop_assert_eq!(verdict, GeofenceVerdict::Indeterminate);
            }
        }
    }
}

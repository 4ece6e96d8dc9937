pub mod geo_validator;

pub use geo_validator::{GeoValidator, GeofenceCheck, GeofenceVerdict};

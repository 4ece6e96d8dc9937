use crate::domain::entities::SiteGeofence;
use crate::domain::value_objects::SiteId;

pub trait SiteDirectory: Send + Sync {
    fn geofence(&self, site_id: &SiteId) -> Option<SiteGeofence>;
    fn site_ids(&self) -> Vec<SiteId>;
}

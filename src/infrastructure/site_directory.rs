use crate::application::ports::site_directory::SiteDirectory;
use crate::domain::entities::SiteGeofence;
use crate::domain::value_objects::SiteId;
use crate::shared::config::SiteConfig;
use crate::shared::error::AppError;
use std::collections::HashMap;

/// 設定ファイルから読み込んだ固定の現地一覧。
#[derive(Debug, Clone, Default)]
pub struct StaticSiteDirectory {
    sites: HashMap<SiteId, SiteGeofence>,
}

impl StaticSiteDirectory {
    pub fn new(geofences: Vec<SiteGeofence>) -> Self {
        Self {
            sites: geofences
                .into_iter()
                .map(|fence| (fence.site_id.clone(), fence))
                .collect(),
        }
    }

    pub fn from_sites(sites: &[SiteConfig]) -> Result<Self, AppError> {
        let geofences = sites
            .iter()
            .map(|site| {
                let site_id =
                    SiteId::new(site.id.clone()).map_err(AppError::ConfigurationError)?;
                SiteGeofence::new(site_id, site.latitude, site.longitude, site.radius_m)
                    .map_err(AppError::ConfigurationError)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(geofences))
    }
}

impl SiteDirectory for StaticSiteDirectory {
    fn geofence(&self, site_id: &SiteId) -> Option<SiteGeofence> {
        self.sites.get(site_id).cloned()
    }

    fn site_ids(&self) -> Vec<SiteId> {
        let mut ids: Vec<SiteId> = self.sites.keys().cloned().collect();
        ids.sort();
        ids
    }
}

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

const MAX_SITE_ID_LEN: usize = 128;

/// 現地（QR が掲示されている拠点）の識別子。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Site ID cannot be empty".to_string());
        }
        if value.len() > MAX_SITE_ID_LEN {
            return Err(format!("Site ID exceeds {MAX_SITE_ID_LEN} bytes"));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err("Site ID cannot contain whitespace".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SiteId> for String {
    fn from(id: SiteId) -> Self {
        id.0
    }
}

impl TryFrom<String> for SiteId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for SiteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

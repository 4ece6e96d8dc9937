use super::DeviceId;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// チェックインイベントのローカル識別子（`{device_id}:{sequence}`）。
///
/// 端末内では単調増加し、端末 ID を含むため端末間でも一意になる。
/// 同期時の冪等キーとしてそのままリモートに送信される。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CheckinEventId {
    raw: String,
    sequence: u64,
}

impl CheckinEventId {
    pub fn new(device_id: &DeviceId, sequence: u64) -> Self {
        Self {
            raw: format!("{}:{:012}", device_id.as_str(), sequence),
            sequence,
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        let (device, sequence) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("Checkin event ID is missing a sequence: {value}"))?;
        let device_id = DeviceId::new(device.to_string())?;
        let sequence = sequence
            .parse::<u64>()
            .map_err(|_| format!("Checkin event ID has an invalid sequence: {value}"))?;
        Ok(Self::new(&device_id, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn device_part(&self) -> &str {
        self.raw
            .rsplit_once(':')
            .map(|(device, _)| device)
            .unwrap_or_default()
    }
}

impl fmt::Display for CheckinEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<CheckinEventId> for String {
    fn from(id: CheckinEventId) -> Self {
        id.raw
    }
}

impl TryFrom<String> for CheckinEventId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl FromStr for CheckinEventId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

use super::CheckinEvent;
use crate::domain::value_objects::CheckinEventId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 一度のリクエストで送信するイベント群（作成順）。
#[derive(Debug, Clone, PartialEq)]
pub struct SyncBatch {
    pub batch_id: Uuid,
    pub events: Vec<CheckinEvent>,
}

impl SyncBatch {
    pub fn new(events: Vec<CheckinEvent>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_ids(&self) -> Vec<CheckinEventId> {
        self.events.iter().map(|event| event.id.clone()).collect()
    }
}

/// リモートが返すイベント単位の判定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    Accepted,
    Rejected { reason: String },
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchAcknowledgement {
    outcomes: HashMap<CheckinEventId, EventOutcome>,
}

impl BatchAcknowledgement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, id: CheckinEventId, outcome: EventOutcome) -> Self {
        self.outcomes.insert(id, outcome);
        self
    }

    pub fn insert(&mut self, id: CheckinEventId, outcome: EventOutcome) {
        self.outcomes.insert(id, outcome);
    }

    /// 応答に含まれないイベントは UNKNOWN として扱う
    pub fn outcome_for(&self, id: &CheckinEventId) -> EventOutcome {
        self.outcomes
            .get(id)
            .cloned()
            .unwrap_or(EventOutcome::Unknown)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

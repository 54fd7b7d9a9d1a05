use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::protocol::{EVENT_NEW_ENTRY, EVENT_UPDATE_ENTRY, SENTINEL_IP};

/// One observed public-IP session.
/// This is the canonical record stored by the daemon and pushed to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Assigned at creation, never changes
    pub id: Uuid,

    /// When this ip was first observed (epoch ms)
    pub timestamp: i64,

    /// Observed address, or `"N/A"` when the lookup failed
    pub ip: String,

    /// Gap between this entry's timestamp and the previous entry's (ms),
    /// 0 for the first entry ever recorded
    pub changed_after: i64,

    /// Most recent poll that observed the same ip (epoch ms)
    pub last_updated: i64,
}

impl Entry {
    /// Whether this entry records a failed lookup
    pub fn is_sentinel(&self) -> bool {
        self.ip == SENTINEL_IP
    }

    /// How long this ip has been observed for (ms)
    pub fn span_ms(&self) -> i64 {
        self.last_updated - self.timestamp
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A log mutation pushed to connected viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEvent {
    Created(Entry),
    Updated(Entry),
}

impl EntryEvent {
    /// Event name on the realtime channel
    pub fn name(&self) -> &'static str {
        match self {
            EntryEvent::Created(_) => EVENT_NEW_ENTRY,
            EntryEvent::Updated(_) => EVENT_UPDATE_ENTRY,
        }
    }

    pub fn entry(&self) -> &Entry {
        match self {
            EntryEvent::Created(entry) | EntryEvent::Updated(entry) => entry,
        }
    }

    pub fn to_frame(&self) -> PushFrame<'_> {
        PushFrame {
            event: self.name(),
            data: self.entry(),
        }
    }
}

/// JSON envelope of one realtime message: `{"event": ..., "data": Entry}`
#[derive(Debug, Serialize)]
pub struct PushFrame<'a> {
    pub event: &'a str,
    pub data: &'a Entry,
}

/// Time span covered by the log; both ends are null when it is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Body of a ranged entry listing. Missing bounds are unbounded.
/// Any JSON number is accepted; fractional bounds are rounded inward to whole
/// milliseconds, which keeps the same set of matching entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntriesQuery {
    #[serde(default, deserialize_with = "lower_bound")]
    pub from: Option<i64>,
    #[serde(default, deserialize_with = "upper_bound")]
    pub to: Option<i64>,
}

fn lower_bound<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.map(|ms| ms.ceil() as i64))
}

fn upper_bound<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.map(|ms| ms.floor() as i64))
}

//! Wire format of a schedule transmission.
//!
//! The controller firmware reads one newline-terminated UTF-8 JSON line:
//!
//! ```text
//! {"type":"schedules","data":[{"id":"s1","name":"Period 1","time":"08:15:00",
//!   "date":null,"active":true,"interval":"first","recurring":true}]}
//! ```
//!
//! Field order is fixed. `date` is always present and is `null` for
//! recurring entries.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use bellcast_types::ScheduleEntry;

use crate::error::Result;

/// Envelope tag identifying a schedule upload.
pub const PAYLOAD_TYPE: &str = "schedules";

/// One schedule entry as the controller sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSchedule {
    pub id: String,
    pub name: String,
    /// `HH:MM:SS`.
    pub time: String,
    /// `YYYY-MM-DD`, or `null` for daily entries.
    pub date: Option<String>,
    pub active: bool,
    pub interval: String,
    pub recurring: bool,
}

impl From<&ScheduleEntry> for WireSchedule {
    fn from(entry: &ScheduleEntry) -> Self {
        let date = if entry.is_recurring {
            None
        } else {
            entry.date_string()
        };
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            time: entry.time_string(),
            date,
            active: entry.is_active,
            interval: entry.interval_category.as_tag().to_string(),
            recurring: entry.is_recurring,
        }
    }
}

/// A schedule upload, built fresh for every send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<WireSchedule>,
}

impl TransmissionPayload {
    /// Project `entries` in the order given. Nothing is filtered or sorted.
    pub fn from_entries(entries: &[ScheduleEntry]) -> Self {
        Self {
            kind: PAYLOAD_TYPE.to_string(),
            data: entries.iter().map(WireSchedule::from).collect(),
        }
    }

    /// Number of entries carried.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload carries no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize to the newline-terminated wire bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let json = serde_json::to_vec(self)?;
        let mut buf = BytesMut::with_capacity(json.len() + 1);
        buf.put_slice(&json);
        buf.put_u8(b'\n');
        Ok(buf.freeze())
    }

    /// Parse wire bytes, with or without the trailing newline.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
        Ok(serde_json::from_slice(trimmed)?)
    }
}

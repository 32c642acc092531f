//! Normalized records produced from provider responses.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One Gmail message reduced to what the derived views need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailInsight {
    pub subject: String,
    pub sender: String,
    /// Naive UTC wall-clock time.
    pub date: NaiveDateTime,
    pub snippet: String,
    pub importance_score: u8,
    pub labels: Vec<String>,
    pub is_unread: bool,
}

impl EmailInsight {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub attendees: Vec<String>,
    pub location: String,
    pub status: String,
    pub creator: String,
    pub calendar_id: String,
}

impl CalendarEvent {
    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 3600.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub time_zone: String,
    pub access_role: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyPeriod {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarAvailability {
    pub is_free: bool,
    pub busy_periods: Vec<BusyPeriod>,
}

/// Drive file metadata. Remote fields the API omitted stay `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub size: Option<String>,
    pub created_time: Option<String>,
    pub modified_time: Option<String>,
    pub owners: Vec<String>,
    pub shared: bool,
    pub url: Option<String>,
    pub last_modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    pub editors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveFileRef {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub editors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveActivity {
    #[serde(rename = "type")]
    pub kind: String,
    pub time: Option<String>,
    pub user: Option<String>,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<DriveFileRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotionPage {
    pub id: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub created_time: Option<String>,
    pub last_edited_time: Option<String>,
    pub created_by: String,
    pub last_edited_by: String,
    pub archived: bool,
    pub parent_type: String,
}

//! Issue data model
//!
//! `IssueRecord` is the stored document. Stored documents may predate the
//! current vocabulary or carry malformed fields, so every optional field is
//! read leniently: a value that does not fit its type reads as absent
//! instead of failing the whole document.

use crate::IssueId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Actor recorded on timeline entries (no authenticated identity is threaded through)
pub const SYSTEM_ACTOR: &str = "System";

/// Category used when none is given
pub const DEFAULT_CATEGORY: &str = "Other";

/// Suggested categories; not enforced
pub const SUGGESTED_CATEGORIES: &[&str] =
    &["Roads", "Lighting", "Water", "Waste", "Noise", "Parks", "Other"];

/// Issue status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Status {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    /// Terminal state; first entry sets `resolved_at`
    Resolved,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Pending, Status::InProgress, Status::Resolved];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Resolved)
    }

    /// Human-readable list of accepted values, for error messages
    pub fn allowed_values() -> String {
        Self::ALL
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::str::FromStr for Status {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "in progress" | "in_progress" | "in-progress" | "inprogress" => Ok(Status::InProgress),
            "resolved" => Ok(Status::Resolved),
            _ => Err(crate::Error::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "Pending"),
            Status::InProgress => write!(f, "In Progress"),
            Status::Resolved => write!(f, "Resolved"),
        }
    }
}

/// Retired five-value vocabulary still found in old documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyStatus {
    Open,
    Acknowledged,
    InProgress,
    Resolved,
    Closed,
}

impl LegacyStatus {
    /// Fixed mapping onto the current vocabulary
    pub fn canonical(self) -> Status {
        match self {
            LegacyStatus::Open | LegacyStatus::Acknowledged => Status::Pending,
            LegacyStatus::InProgress => Status::InProgress,
            LegacyStatus::Resolved | LegacyStatus::Closed => Status::Resolved,
        }
    }
}

/// Status value as found in a stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedStatus {
    Current(Status),
    Legacy(LegacyStatus),
    Unknown(String),
}

impl RecordedStatus {
    /// Map onto the current vocabulary; anything unrecognised is `Pending`
    pub fn normalize(&self) -> Status {
        match self {
            RecordedStatus::Current(status) => *status,
            RecordedStatus::Legacy(legacy) => legacy.canonical(),
            RecordedStatus::Unknown(raw) => raw.parse().unwrap_or_default(),
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, RecordedStatus::Current(_))
    }
}

impl From<Status> for RecordedStatus {
    fn from(status: Status) -> Self {
        RecordedStatus::Current(status)
    }
}

/// Issue priority
///
/// Stored lowercase, with Medium stored as `normal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    #[serde(rename = "normal", alias = "medium")]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn allowed_values() -> String {
        Self::ALL
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(crate::Error::InvalidPriority(s.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
            Priority::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where the issue was reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Location {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ward: None,
            coordinates: None,
        }
    }
}

/// One status change in an issue's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordedStatus>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
}

impl TimelineEntry {
    pub fn new(status: Status, note: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status.into()),
            note: Some(note.into()),
            at: Some(at),
            by: Some(SYSTEM_ACTOR.to_string()),
        }
    }

    /// Status normalized onto the current vocabulary
    pub fn status(&self) -> Status {
        self.status
            .as_ref()
            .map(RecordedStatus::normalize)
            .unwrap_or_default()
    }
}

/// A requested status change, ready to be applied to a stored issue
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMutation {
    pub status: Status,
    pub note: String,
    pub at: DateTime<Utc>,
}

impl StatusMutation {
    /// Blank or missing notes fall back to "Status updated to {status}"
    pub fn new(status: Status, note: Option<String>) -> Self {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Status updated to {}", status));
        Self {
            status,
            note,
            at: Utc::now(),
        }
    }
}

/// Stored issue document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    /// Raw identifier; well-formed for everything created by this service
    pub id: String,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordedStatus>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default, deserialize_with = "lenient_or_default")]
    pub photos: Vec<String>,

    /// `None` only on legacy documents; the migration backfills it
    #[serde(
        default,
        deserialize_with = "lenient_timeline",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeline: Option<Vec<TimelineEntry>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Write counter for optimistic concurrency, bumped by the store
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub version: u64,
}

impl IssueRecord {
    /// Create a new `Pending` issue with its "created" timeline entry
    pub fn new(id: &IssueId, title: String, description: String, location: Location) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: Some(title),
            description: Some(description),
            status: Some(Status::Pending.into()),
            priority: Some(Priority::default()),
            category: Some(DEFAULT_CATEGORY.to_string()),
            location: Some(location),
            photos: Vec::new(),
            timeline: Some(vec![TimelineEntry::new(
                Status::Pending,
                "Issue created",
                now,
            )]),
            assigned_to: None,
            created_at: Some(now),
            updated_at: Some(now),
            resolved_at: None,
            version: 0,
        }
    }

    /// Current status, normalized
    pub fn status(&self) -> Status {
        self.status
            .as_ref()
            .map(RecordedStatus::normalize)
            .unwrap_or_default()
    }

    pub fn priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }

    pub fn category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn address(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.address.as_deref())
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        self.timeline.as_deref().unwrap_or_default()
    }

    /// Set the status, append the history entry and stamp `resolved_at`
    /// the first time the terminal state is reached
    pub fn apply_status(&mut self, mutation: &StatusMutation) {
        self.status = Some(mutation.status.into());
        self.timeline
            .get_or_insert_with(Vec::new)
            .push(TimelineEntry::new(
                mutation.status,
                mutation.note.clone(),
                mutation.at,
            ));
        if mutation.status.is_terminal() && self.resolved_at.is_none() {
            self.resolved_at = Some(mutation.at);
        }
    }

    /// Case-insensitive substring match over title, description and address.
    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        [
            self.title.as_deref(),
            self.description.as_deref(),
            self.address(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

impl std::fmt::Display for IssueRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] [{}] {}",
            self.id,
            self.priority(),
            self.status(),
            self.title.as_deref().unwrap_or("Untitled Issue")
        )
    }
}

/// Deserialize an optional field, reading values of the wrong shape as `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Keep every readable entry of a timeline; a non-array reads as missing
fn lenient_timeline<'de, D>(deserializer: D) -> Result<Option<Vec<TimelineEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(entries) => Ok(Some(
            entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IssueRecord {
        IssueRecord::new(
            &IssueId::generate(),
            "Pothole on Main Road".to_string(),
            "Large pothole near the Oak Street intersection".to_string(),
            Location::new("Main Road & Oak Street"),
        )
    }

    #[test]
    fn test_status_parse_accepts_spellings() {
        assert_eq!("Pending".parse::<Status>().unwrap(), Status::Pending);
        assert_eq!("in progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("IN_PROGRESS".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("Resolved".parse::<Status>().unwrap(), Status::Resolved);
        assert!("closed".parse::<Status>().is_err());
        assert!("".parse::<Status>().is_err());
    }

    #[test]
    fn test_invalid_status_names_allowed_set() {
        let err = "Done".parse::<Status>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status 'Done'. Allowed values: Pending, In Progress, Resolved"
        );
    }

    #[test]
    fn test_recorded_status_reads_both_vocabularies() {
        let current: RecordedStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(current, RecordedStatus::Current(Status::InProgress));

        let legacy: RecordedStatus = serde_json::from_str("\"acknowledged\"").unwrap();
        assert_eq!(legacy, RecordedStatus::Legacy(LegacyStatus::Acknowledged));
        assert_eq!(legacy.normalize(), Status::Pending);

        let closed: RecordedStatus = serde_json::from_str("\"closed\"").unwrap();
        assert_eq!(closed.normalize(), Status::Resolved);

        let unknown: RecordedStatus = serde_json::from_str("\"escalated\"").unwrap();
        assert_eq!(unknown, RecordedStatus::Unknown("escalated".to_string()));
        assert_eq!(unknown.normalize(), Status::Pending);
    }

    #[test]
    fn test_priority_storage_form() {
        assert_eq!(serde_json::to_string(&Priority::Medium).unwrap(), "\"normal\"");
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        let alias: Priority = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(alias, Priority::Medium);
        assert_eq!(Priority::Critical.to_string(), "Critical");
        assert_eq!("Medium".parse::<Priority>().unwrap(), Priority::Medium);
    }

    #[test]
    fn test_new_issue_has_created_entry() {
        let issue = sample();
        assert_eq!(issue.status(), Status::Pending);
        assert_eq!(issue.category(), "Other");
        assert_eq!(issue.timeline().len(), 1);
        assert_eq!(issue.timeline()[0].note.as_deref(), Some("Issue created"));
        assert!(issue.resolved_at.is_none());
    }

    #[test]
    fn test_apply_status_sets_resolved_at_once() {
        let mut issue = sample();
        let first = StatusMutation::new(Status::Resolved, None);
        issue.apply_status(&first);
        assert_eq!(issue.resolved_at, Some(first.at));

        let reopen = StatusMutation::new(Status::Pending, Some("Reopened".to_string()));
        issue.apply_status(&reopen);
        assert_eq!(issue.resolved_at, Some(first.at));

        let again = StatusMutation::new(Status::Resolved, None);
        issue.apply_status(&again);
        assert_eq!(issue.resolved_at, Some(first.at));
        assert_eq!(issue.timeline().len(), 4);
    }

    #[test]
    fn test_mutation_default_note() {
        let m = StatusMutation::new(Status::InProgress, Some("   ".to_string()));
        assert_eq!(m.note, "Status updated to In Progress");
    }

    #[test]
    fn test_matches_search_case_insensitive() {
        let issue = sample();
        assert!(issue.matches_search("pothole"));
        assert!(issue.matches_search("main"));
        assert!(issue.matches_search("oak street"));
        assert!(!issue.matches_search("streetlight"));
    }

    #[test]
    fn test_lenient_document_read() {
        let raw = r#"{
            "id": "legacy-1",
            "title": 42,
            "status": "open",
            "priority": "urgent",
            "photos": "not-a-list",
            "timeline": [{"status": "open", "at": "yesterday"}, "garbage"],
            "createdAt": "not a date"
        }"#;
        let issue: IssueRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(issue.title, None);
        assert_eq!(issue.status(), Status::Pending);
        assert_eq!(issue.priority(), Priority::Medium);
        assert!(issue.photos.is_empty());
        assert_eq!(issue.timeline().len(), 1);
        assert_eq!(issue.timeline()[0].at, None);
        assert_eq!(issue.created_at, None);
    }
}

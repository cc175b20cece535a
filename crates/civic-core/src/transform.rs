//! Stored document → external (API) representation
//!
//! Missing or malformed fields degrade to fixed defaults. The only hard
//! failure is a document whose identifier is not well formed; callers
//! iterating a batch substitute [`ExternalIssue::placeholder`] for it.

use crate::{Coordinates, IssueId, IssueRecord, Priority, Status, TimelineEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Whether the issue was reported with media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Image,
    Text,
}

/// Issue as exposed to API consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    #[serde(with = "title_case")]
    pub priority: Priority,
    pub category: String,
    /// Creation date, `YYYY-MM-DD`
    pub date: String,
    pub location: String,
    pub last_update: String,
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub source: Option<String>,
    /// "Assigned" or null; the assignee itself is never disclosed
    pub assigned_to: Option<String>,
    pub reported_by: String,
    pub ward: Option<String>,
    pub photos: Vec<String>,
    pub coordinates: Option<Coordinates>,
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<ExternalTimelineEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTimelineEntry {
    pub status: Status,
    pub note: String,
    pub by: String,
    pub at: String,
}

/// Why a document could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("malformed issue identifier '{0}'")]
    MalformedId(String),
}

/// Normalize a stored document. The timeline is only included on request.
pub fn to_external(
    issue: &IssueRecord,
    include_timeline: bool,
) -> Result<ExternalIssue, TransformError> {
    if !IssueId::is_valid(&issue.id) {
        return Err(TransformError::MalformedId(issue.id.clone()));
    }

    let location = issue.location.clone().unwrap_or_default();
    let timeline = include_timeline.then(|| {
        issue
            .timeline()
            .iter()
            .map(external_entry)
            .collect::<Vec<_>>()
    });

    Ok(ExternalIssue {
        id: issue.id.clone(),
        title: non_blank(issue.title.as_deref())
            .unwrap_or("Untitled Issue")
            .to_string(),
        description: non_blank(issue.description.as_deref())
            .unwrap_or("No description provided")
            .to_string(),
        status: issue.status(),
        priority: issue.priority(),
        category: issue.category().to_string(),
        date: format_date(issue.created_at),
        location: non_blank(location.address.as_deref())
            .unwrap_or("Unknown Location")
            .to_string(),
        last_update: format_date(issue.updated_at),
        kind: if issue.photos.is_empty() {
            IssueKind::Text
        } else {
            IssueKind::Image
        },
        source: issue.photos.first().cloned(),
        assigned_to: issue.assigned_to.as_ref().map(|_| "Assigned".to_string()),
        reported_by: "Citizen".to_string(),
        ward: location.ward,
        photos: issue.photos.clone(),
        coordinates: location.coordinates,
        resolved_at: issue.resolved_at.map(|at| at.format(DATE_FORMAT).to_string()),
        timeline,
    })
}

fn external_entry(entry: &TimelineEntry) -> ExternalTimelineEntry {
    ExternalTimelineEntry {
        status: entry.status(),
        note: non_blank(entry.note.as_deref())
            .unwrap_or("No note")
            .to_string(),
        by: crate::issue::SYSTEM_ACTOR.to_string(),
        at: format_date(entry.at),
    }
}

impl ExternalIssue {
    /// Minimal stand-in for a document that could not be normalized
    pub fn placeholder(id: impl Into<String>) -> Self {
        let today = format_date(None);
        Self {
            id: id.into(),
            title: "Error Loading Issue".to_string(),
            description: "There was an error loading this issue".to_string(),
            status: Status::Pending,
            priority: Priority::Medium,
            category: crate::issue::DEFAULT_CATEGORY.to_string(),
            date: today.clone(),
            location: "Unknown".to_string(),
            last_update: today,
            kind: IssueKind::Text,
            source: None,
            assigned_to: None,
            reported_by: "Unknown".to_string(),
            ward: None,
            photos: Vec::new(),
            coordinates: None,
            resolved_at: None,
            timeline: None,
        }
    }
}

/// `YYYY-MM-DD`, today when the timestamp is missing
pub fn format_date(at: Option<DateTime<Utc>>) -> String {
    at.unwrap_or_else(Utc::now).format(DATE_FORMAT).to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Priorities go over the wire in display form ("Medium"), not storage form
mod title_case {
    use crate::Priority;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(priority: &Priority, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(priority)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Priority, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

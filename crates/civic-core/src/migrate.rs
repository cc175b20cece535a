//! Legacy status migration
//!
//! Rewrites retired status values (`open`, `acknowledged`, `in_progress`,
//! `resolved`, `closed`) and anything unrecognised onto the current
//! vocabulary, and backfills a timeline for documents that have none.
//! Documents that already conform are left alone, so a second run writes
//! nothing.

use crate::{GroupCount, IssueRecord, RecordedStatus, Status, TimelineEntry};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Note on the synthetic entry given to documents without a timeline
pub const BACKFILL_NOTE: &str = "Initial status from migration";

/// Outcome of a migration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub updated_issues: usize,
    pub total_issues: usize,
    /// Status distribution after the run, ordered by status
    pub final_stats: Vec<GroupCount>,
}

fn canonical(recorded: Option<&RecordedStatus>) -> Status {
    recorded.map(RecordedStatus::normalize).unwrap_or_default()
}

fn needs_rewrite(recorded: Option<&RecordedStatus>) -> bool {
    !recorded.is_some_and(RecordedStatus::is_current)
}

/// Migrated copy of `issue`, or `None` when it already conforms
pub fn migrate_record(issue: &IssueRecord) -> Option<IssueRecord> {
    let mut migrated = issue.clone();
    let mut changed = false;

    if needs_rewrite(issue.status.as_ref()) {
        let status = canonical(issue.status.as_ref());
        tracing::debug!(id = %issue.id, from = ?issue.status, to = %status, "Rewriting status");
        migrated.status = Some(status.into());
        changed = true;
    }

    match migrated.timeline.as_mut() {
        Some(entries) => {
            for entry in entries.iter_mut() {
                if needs_rewrite(entry.status.as_ref()) {
                    entry.status = Some(canonical(entry.status.as_ref()).into());
                    changed = true;
                }
            }
        }
        None => {
            let status = migrated.status();
            let at = issue.created_at.unwrap_or_else(Utc::now);
            migrated.timeline = Some(vec![TimelineEntry::new(status, BACKFILL_NOTE, at)]);
            changed = true;
        }
    }

    changed.then_some(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LegacyStatus;

    fn legacy(raw: &str) -> IssueRecord {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_maps_legacy_main_status() {
        for (old, new) in [
            ("open", Status::Pending),
            ("acknowledged", Status::Pending),
            ("in_progress", Status::InProgress),
            ("resolved", Status::Resolved),
            ("closed", Status::Resolved),
            ("escalated", Status::Pending),
        ] {
            let issue = legacy(&format!(
                r#"{{"id": "0123456789abcdefghjkmnpq", "status": "{old}", "timeline": []}}"#
            ));
            let migrated = migrate_record(&issue).unwrap();
            assert_eq!(migrated.status, Some(RecordedStatus::Current(new)), "{old}");
        }
    }

    #[test]
    fn test_missing_status_becomes_pending() {
        let issue = legacy(r#"{"id": "0123456789abcdefghjkmnpq", "timeline": []}"#);
        let migrated = migrate_record(&issue).unwrap();
        assert_eq!(migrated.status(), Status::Pending);
        assert!(migrated.status.as_ref().unwrap().is_current());
    }

    #[test]
    fn test_rewrites_timeline_entries() {
        let issue = legacy(
            r#"{"id": "0123456789abcdefghjkmnpq", "status": "Resolved",
                "timeline": [{"status": "open", "note": "Reported"},
                             {"status": "closed", "note": "Done"}]}"#,
        );
        let migrated = migrate_record(&issue).unwrap();
        let statuses: Vec<_> = migrated.timeline().iter().map(|e| e.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                Some(RecordedStatus::Current(Status::Pending)),
                Some(RecordedStatus::Current(Status::Resolved)),
            ]
        );
        assert_eq!(migrated.timeline()[0].note.as_deref(), Some("Reported"));
    }

    #[test]
    fn test_backfills_missing_timeline() {
        let issue = legacy(
            r#"{"id": "0123456789abcdefghjkmnpq", "status": "in_progress",
                "createdAt": "2024-03-14T10:00:00Z"}"#,
        );
        let migrated = migrate_record(&issue).unwrap();
        let timeline = migrated.timeline();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].status(), Status::InProgress);
        assert_eq!(timeline[0].note.as_deref(), Some(BACKFILL_NOTE));
        assert_eq!(timeline[0].at, issue.created_at);
    }

    #[test]
    fn test_conforming_document_is_untouched() {
        let issue = legacy(
            r#"{"id": "0123456789abcdefghjkmnpq", "status": "In Progress",
                "timeline": [{"status": "Pending"}, {"status": "In Progress"}]}"#,
        );
        assert!(migrate_record(&issue).is_none());
    }

    #[test]
    fn test_migration_is_a_fixed_point() {
        let issue = legacy(
            r#"{"id": "0123456789abcdefghjkmnpq", "status": "acknowledged",
                "timeline": [{"status": "bogus"}]}"#,
        );
        assert_eq!(
            issue.status,
            Some(RecordedStatus::Legacy(LegacyStatus::Acknowledged))
        );
        let once = migrate_record(&issue).unwrap();
        assert!(migrate_record(&once).is_none());
    }
}

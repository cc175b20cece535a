//! Issue lifecycle service
//!
//! Owns the status vocabulary and the boundary between stored documents and
//! their external shape. All request handlers share one service; the store
//! sits behind an async `RwLock`, and every mutation performs its
//! read-modify-write under the write guard.

use crate::migrate::{MigrationReport, migrate_record};
use crate::store::{GroupCount, GroupField, IssueFilters, Pagination, Store};
use crate::transform::{ExternalIssue, to_external};
use crate::{
    Config, Error, IssueId, IssueRecord, ListingConfig, Location, Priority, Result, Status,
    StatusMutation,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared lifecycle service; cheap to clone
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<RwLock<Store>>,
    listing: ListingConfig,
}

/// Creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
}

/// Raw listing parameters as they arrive on the query string
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
}

/// One page of normalized issues
#[derive(Debug, Clone)]
pub struct IssueList {
    pub issues: Vec<ExternalIssue>,
    pub pagination: PageInfo,
}

/// Share of resolved issues
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionRate {
    /// No issues at all; serialized as `0`
    NoIssues,
    /// Percentage; serialized as a one-decimal string ("40.0")
    Percent(f64),
}

impl ResolutionRate {
    pub fn from_counts(resolved: usize, total: usize) -> Self {
        if total == 0 {
            ResolutionRate::NoIssues
        } else {
            ResolutionRate::Percent(resolved as f64 / total as f64 * 100.0)
        }
    }
}

impl std::fmt::Display for ResolutionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionRate::NoIssues => write!(f, "0"),
            ResolutionRate::Percent(pct) => write!(f, "{:.1}", pct),
        }
    }
}

impl Serialize for ResolutionRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ResolutionRate::NoIssues => serializer.serialize_u8(0),
            ResolutionRate::Percent(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for ResolutionRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(f64),
            Text(String),
        }

        // Only the bare number 0 means "no issues"; "0.0" is a real rate
        match Wire::deserialize(deserializer)? {
            Wire::Number(n) if n == 0.0 => Ok(ResolutionRate::NoIssues),
            Wire::Number(n) => Ok(ResolutionRate::Percent(n)),
            Wire::Text(s) => s
                .parse()
                .map(ResolutionRate::Percent)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Top-line statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStats {
    pub total_issues: usize,
    pub pending_issues: usize,
    pub in_progress_issues: usize,
    pub resolved_issues: usize,
    pub resolution_rate: ResolutionRate,
    pub category_stats: Vec<GroupCount>,
    pub priority_stats: Vec<GroupCount>,
}

impl LifecycleService {
    pub fn new(store: Store, listing: ListingConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            listing,
        }
    }

    /// Open the configured store (in memory when no path is set)
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = match &config.store.path {
            Some(path) => {
                let store = Store::open(path)?;
                if let Some(path) = store.path() {
                    tracing::info!(
                        path = %path.display(),
                        issues = store.len(),
                        "Opened issue store"
                    );
                }
                store
            }
            None => {
                tracing::warn!("No store path configured; issues are kept in memory only");
                Store::in_memory()
            }
        };
        Ok(Self::new(store, config.listing.clone()))
    }

    /// Filtered, paginated listing without timelines
    pub async fn list_issues(&self, params: &ListParams) -> Result<IssueList> {
        let filters = IssueFilters {
            status: parse_filter(params.status.as_deref())?,
            priority: parse_filter(params.priority.as_deref())?,
            category: params
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !is_wildcard(c))
                .map(str::to_string),
            search: params.search.clone(),
        };
        let pagination = Pagination::new(
            params.page.unwrap_or(1),
            self.clamp_limit(params.limit, self.listing.default_limit),
        );

        let page = self.store.read().await.find(&filters, pagination);
        tracing::debug!(found = page.items.len(), total = page.total, "Listed issues");

        Ok(IssueList {
            issues: normalize_batch(&page.items, pagination.offset()),
            pagination: PageInfo {
                current_page: pagination.page,
                total_pages: pagination.total_pages(page.total),
                total_items: page.total,
                items_per_page: pagination.limit,
            },
        })
    }

    /// Free-text search, newest first
    pub async fn search_issues(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExternalIssue>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("Search query is required".to_string()));
        }
        let pagination = Pagination::new(1, self.clamp_limit(limit, self.listing.search_limit));
        let page = self
            .store
            .read()
            .await
            .find(&IssueFilters::search(query), pagination);
        Ok(normalize_batch(&page.items, 0))
    }

    /// Single issue with its timeline
    pub async fn get_issue(&self, id: &str) -> Result<ExternalIssue> {
        let id: IssueId = id.parse()?;
        let store = self.store.read().await;
        let issue = store.find_by_id(&id)?;
        Ok(to_external(issue, true)?)
    }

    /// Validate and persist a new issue
    pub async fn create_issue(&self, request: NewIssue) -> Result<ExternalIssue> {
        let title = required(request.title.as_deref());
        let description = required(request.description.as_deref());
        let address = required(
            request
                .location
                .as_ref()
                .and_then(|l| l.address.as_deref()),
        );

        let missing: Vec<&str> = [
            ("title", title.is_none()),
            ("description", description.is_none()),
            ("location.address", address.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();
        let (Some(title), Some(description), Some(address)) = (title, description, address) else {
            return Err(Error::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        };

        let priority = match required(request.priority.as_deref()) {
            Some(raw) => raw.parse::<Priority>()?,
            None => Priority::default(),
        };

        let mut location = request.location.clone().unwrap_or_default();
        location.address = Some(address.to_string());

        let mut issue = IssueRecord::new(
            &IssueId::generate(),
            title.to_string(),
            description.to_string(),
            location,
        );
        issue.priority = Some(priority);
        if let Some(category) = required(request.category.as_deref()) {
            issue.category = Some(category.to_string());
        }
        issue.photos = request
            .photos
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let created = self.store.write().await.create(issue)?;
        tracing::info!(id = %created.id, priority = %priority, "Issue created");
        Ok(to_external(&created, true)?)
    }

    /// Move an issue to `new_status` and record the change in its timeline.
    ///
    /// Any state may move to any other state; repeating the current status
    /// still appends an entry.
    pub async fn apply_status_change(
        &self,
        id: &str,
        new_status: &str,
        note: Option<String>,
    ) -> Result<ExternalIssue> {
        if new_status.trim().is_empty() {
            return Err(Error::Validation(format!(
                "Status is required. Allowed values: {}",
                Status::allowed_values()
            )));
        }
        let status: Status = new_status.parse()?;
        let id: IssueId = id.parse()?;

        let mutation = StatusMutation::new(status, note);
        let updated = self.store.write().await.update_status(&id, &mutation)?;
        tracing::info!(id = %id, status = %status, "Issue status updated");
        Ok(to_external(&updated, true)?)
    }

    /// Top-line counts and breakdowns. The aggregate queries run
    /// concurrently; any failure fails the whole request.
    pub async fn stats(&self) -> Result<IssueStats> {
        let (total, pending, in_progress, resolved, category_stats, priority_stats) =
            tokio::try_join!(
                self.count_where(|_| true),
                self.count_status(Status::Pending),
                self.count_status(Status::InProgress),
                self.count_status(Status::Resolved),
                self.aggregate(GroupField::Category),
                self.aggregate(GroupField::Priority),
            )?;

        Ok(IssueStats {
            total_issues: total,
            pending_issues: pending,
            in_progress_issues: in_progress,
            resolved_issues: resolved,
            resolution_rate: ResolutionRate::from_counts(resolved, total),
            category_stats,
            priority_stats,
        })
    }

    /// Number of readable issue documents
    pub async fn issue_count(&self) -> Result<usize> {
        self.count_where(|_| true).await
    }

    /// Rewrite retired status values and backfill missing timelines.
    /// Holds the write lock for the whole batch.
    pub async fn migrate_legacy_statuses(&self) -> Result<MigrationReport> {
        let mut store = self.store.write().await;
        let total_issues = store.len();
        let changed: Vec<IssueRecord> = store.all().filter_map(migrate_record).collect();
        let updated_issues = changed.len();

        if !changed.is_empty() {
            store.replace_many(changed)?;
        }

        let mut final_stats = store.aggregate_counts(GroupField::Status);
        final_stats.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::info!(total_issues, updated_issues, "Legacy status migration finished");
        Ok(MigrationReport {
            updated_issues,
            total_issues,
            final_stats,
        })
    }

    async fn count_where(&self, predicate: impl Fn(&IssueRecord) -> bool) -> Result<usize> {
        Ok(self.store.read().await.count_where(predicate))
    }

    async fn count_status(&self, status: Status) -> Result<usize> {
        self.count_where(|issue| issue.status() == status).await
    }

    async fn aggregate(&self, field: GroupField) -> Result<Vec<GroupCount>> {
        Ok(self.store.read().await.aggregate_counts(field))
    }

    fn clamp_limit(&self, requested: Option<usize>, default: usize) -> usize {
        requested
            .unwrap_or(default)
            .clamp(1, self.listing.max_limit.max(1))
    }
}

/// Normalize a batch; a document that fails is replaced by a placeholder
fn normalize_batch(records: &[IssueRecord], offset: usize) -> Vec<ExternalIssue> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| match to_external(record, false) {
            Ok(issue) => issue,
            Err(e) => {
                tracing::warn!(
                    id = %record.id,
                    error = %e,
                    "Substituting placeholder for unreadable issue"
                );
                let id = if record.id.is_empty() {
                    format!("fallback-{}", offset + index)
                } else {
                    record.id.clone()
                };
                ExternalIssue::placeholder(id)
            }
        })
        .collect()
}

/// "All" and blank filter values mean no filter
fn is_wildcard(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("all")
}

fn parse_filter<T: FromStr<Err = Error>>(raw: Option<&str>) -> Result<Option<T>> {
    raw.map(str::trim)
        .filter(|v| !is_wildcard(v))
        .map(|v| v.parse::<T>())
        .transpose()
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

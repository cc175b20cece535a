//! civic-core: core library for the civic issue tracker
//!
//! Issue data model, JSON-lines document store, and the lifecycle service
//! that owns status transitions, timelines and the external issue shape.

pub mod config;
pub mod error;
pub mod id;
pub mod issue;
pub mod migrate;
pub mod service;
pub mod store;
pub mod transform;

pub use config::{Config, ListingConfig, ServerConfig, StoreConfig};
pub use error::Error;
pub use id::IssueId;
pub use issue::{
    Coordinates, IssueRecord, LegacyStatus, Location, Priority, RecordedStatus, Status,
    StatusMutation, TimelineEntry,
};
pub use migrate::MigrationReport;
pub use service::{
    IssueList, IssueStats, LifecycleService, ListParams, NewIssue, PageInfo, ResolutionRate,
};
pub use store::{GroupCount, GroupField, IssueFilters, Page, Pagination, Store};
pub use transform::{ExternalIssue, ExternalTimelineEntry, IssueKind, TransformError};

/// Result type for civic operations
pub type Result<T> = std::result::Result<T, Error>;

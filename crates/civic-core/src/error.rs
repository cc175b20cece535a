//! Error types for the civic issue tracker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Issue not found: {0}")]
    NotFound(String),

    #[error("Issue already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid issue ID: {0}")]
    InvalidId(String),

    #[error(
        "Invalid status '{0}'. Allowed values: {allowed}",
        allowed = crate::Status::allowed_values()
    )]
    InvalidStatus(String),

    #[error(
        "Invalid priority '{0}'. Allowed values: {allowed}",
        allowed = crate::Priority::allowed_values()
    )]
    InvalidPriority(String),

    #[error("{0}")]
    Validation(String),

    /// Optimistic write lost against a concurrent writer
    #[error("Issue {id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("Corrupt issue document: {0}")]
    Corrupt(#[from] crate::transform::TransformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),
}

impl Error {
    /// Whether the caller can fix the request (bad input rather than a server fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidId(_)
                | Error::InvalidStatus(_)
                | Error::InvalidPriority(_)
                | Error::Validation(_)
        )
    }
}

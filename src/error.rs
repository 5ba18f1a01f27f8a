//! Error types shared across the feed, forms and role checks.

use thiserror::Error;

/// Failure of a page fetch against the job source.
///
/// The feed does not subdivide failures: no retry policy depends on the kind,
/// and a retry is always a user-initiated `load_more`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("backend error: {0}")]
    Backend(String),
}

impl FeedError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        FeedError::Backend(err.to_string())
    }

    /// Short message for the presentation layer.
    pub fn user_message(&self) -> &str {
        match self {
            FeedError::Backend(_) => "Could not load jobs. Press m to retry.",
        }
    }
}

impl From<rusqlite::Error> for FeedError {
    fn from(err: rusqlite::Error) -> Self {
        FeedError::backend(err)
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::backend(err)
    }
}

/// A form field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("{field} is not a valid email address")]
    InvalidEmail { field: &'static str },

    #[error("unknown {field}: {value}")]
    UnknownValue { field: &'static str, value: String },

    #[error("salary minimum {min} exceeds maximum {max}")]
    SalaryOrder { min: i64, max: i64 },

    #[error("page size must be at least 1")]
    PageSize,
}

/// The signed-in viewer may not perform an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("not signed in. Run 'jobboard login <email>' first.")]
    SignedOut,

    #[error("only employers can {0}")]
    EmployerOnly(&'static str),

    #[error("only job seekers can {0}")]
    SeekerOnly(&'static str),

    #[error("access denied or job not found")]
    NotOwner,

    #[error("you have already applied to job #{0}")]
    AlreadyApplied(i64),
}

//! Repository error taxonomy.
//!
//! # Invariants
//! - `InvalidArgument` is raised before any store interaction.
//! - `ConcurrentModification` is only produced by paged iteration, after the
//!   owning repository signalled a mutation.
//! - Nothing in this crate retries; every error reaches the immediate caller.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

type BoxedCause = Box<dyn Error + Send + Sync + 'static>;

/// A store rejected a write, delete or query.
#[derive(Debug)]
pub struct PersistenceFailure {
    /// Store operation that failed, e.g. `persist` or `query_page`.
    pub operation: &'static str,
    /// Debug rendering of the offending entity or identifier, when known.
    pub subject: Option<String>,
    pub cause: BoxedCause,
}

impl PersistenceFailure {
    pub fn new(operation: &'static str, cause: impl Into<BoxedCause>) -> Self {
        Self {
            operation,
            subject: None,
            cause: cause.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl Display for PersistenceFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{} failed for {subject}: {}", self.operation, self.cause),
            None => write!(f, "{} failed: {}", self.operation, self.cause),
        }
    }
}

impl Error for PersistenceFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Generic repository error for every store adapter.
#[derive(Debug)]
pub enum RepoError {
    InvalidArgument(String),
    Persistence(PersistenceFailure),
    /// The repository changed structurally while an iterator was live.
    ConcurrentModification {
        consumed: u64,
        total: u64,
    },
    NotFound(String),
    InvalidData(String),
    /// A bulk operation stopped early; `completed` elements stay applied.
    Bulk {
        completed: usize,
        source: Box<RepoError>,
    },
}

impl RepoError {
    /// Shorthand for a `PersistenceFailure` without subject.
    pub fn persistence(operation: &'static str, cause: impl Into<BoxedCause>) -> Self {
        Self::Persistence(PersistenceFailure::new(operation, cause))
    }

    /// Number of elements a failed operation still applied.
    pub fn completed(&self) -> usize {
        match self {
            Self::Bulk { completed, .. } => *completed,
            _ => 0,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Persistence(failure) => write!(f, "{failure}"),
            Self::ConcurrentModification { consumed, total } => write!(
                f,
                "repository modified during iteration after {consumed} of {total} elements"
            ),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Bulk { completed, source } => {
                write!(f, "bulk operation stopped after {completed} elements: {source}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(failure) => Some(failure),
            Self::Bulk { source, .. } => Some(source.as_ref()),
            Self::InvalidArgument(_) => None,
            Self::ConcurrentModification { .. } => None,
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<PersistenceFailure> for RepoError {
    fn from(value: PersistenceFailure) -> Self {
        Self::Persistence(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::persistence("bootstrap", value)
    }
}

//! Repository tuning options.
//!
//! # Invariants
//! - `page_size` is within `1..=MAX_PAGE_SIZE` once validated.
//! - Nothing here reads environment variables or files implicitly.

use crate::repo::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};

/// Default rows fetched per paged-iterator round trip.
pub const DEFAULT_PAGE_SIZE: usize = 32;
/// Upper bound on rows fetched per round trip.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Options shared by every repository built over a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Rows per page; bounds iterator memory to O(page_size).
    pub page_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RepositoryConfig {
    /// Returns a validated config with the given page size.
    pub fn with_page_size(page_size: usize) -> RepoResult<Self> {
        let config = Self { page_size };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document such as `{"page_size": 128}`.
    ///
    /// Missing keys fall back to defaults; unknown keys are rejected.
    pub fn from_json_str(json: &str) -> RepoResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|err| {
            RepoError::InvalidArgument(format!("invalid repository config: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RepoResult<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(RepoError::InvalidArgument(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

//! Generic repository and specification toolkit.
//!
//! Entities register a static field table ([`Entity`]); queries are built as
//! [`Specification`]s and compiled by each store adapter. Iteration is paged
//! and fails fast when the owning repository changes underneath it.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod spec;

pub use config::{RepositoryConfig, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use db::{open_db, open_db_in_memory, DbError, Migration};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, Field, FromRecord, Record};
pub use model::value::Value;
pub use repo::contract::{Repository, SequenceRepository};
pub use repo::engine::StoreRepository;
pub use repo::error::{PersistenceFailure, RepoError, RepoResult};
pub use repo::memory_store::{MemoryStore, SharedCollection};
pub use repo::paged_iter::{IterState, PagedIterator};
pub use repo::sqlite_store::SqliteStore;
pub use repo::store::Store;
pub use repo::{MemoryRepository, SqliteRepository};
pub use spec::criterion::{Criterion, Operator};
pub use spec::predicate::PredicateBuilder;
pub use spec::specification::Specification;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

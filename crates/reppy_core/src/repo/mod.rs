//! Repository contracts, the generic engine and store adapters.
//!
//! # Responsibility
//! - Define the caller-facing `Repository` and `SequenceRepository` contracts.
//! - Implement both once in `StoreRepository`, over any `Store` adapter.
//! - Provide the in-memory and SQLite adapters.
//!
//! # Invariants
//! - Mutations go through the engine so live iterators are invalidated.
//! - Adapters never retry; failures surface as `RepoError`.

pub mod contract;
pub mod engine;
pub mod error;
pub mod memory_store;
pub mod paged_iter;
pub mod signal;
pub mod sqlite_store;
pub mod store;

use memory_store::MemoryStore;
use sqlite_store::SqliteStore;

/// Repository over a [`MemoryStore`].
pub type MemoryRepository<T> = engine::StoreRepository<T, MemoryStore<T>>;

/// Repository over a [`SqliteStore`] borrowing one connection.
pub type SqliteRepository<'conn, T> = engine::StoreRepository<T, SqliteStore<'conn, T>>;

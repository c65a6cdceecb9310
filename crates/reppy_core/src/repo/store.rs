//! Store capability contract.
//!
//! # Responsibility
//! - Name the minimal operations a backing store must offer so that the
//!   generic repository engine can run over it.
//!
//! # Invariants
//! - `query_page` returns rows in one deterministic order (e.g. by
//!   identifier) so that consecutive pages neither skip nor repeat rows.
//! - `compile` rejects unknown keys with `InvalidArgument` before touching
//!   the store.

use crate::model::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::spec::specification::Specification;

/// Capability table of one backing store for entities of type `T`.
pub trait Store<T: Entity> {
    /// Store-native filter produced by `compile`.
    type Predicate;

    fn compile(&self, specification: &Specification) -> RepoResult<Self::Predicate>;

    fn persist(&self, entity: &T) -> RepoResult<()>;

    /// Inserts every entity and returns how many were inserted.
    ///
    /// The default is best effort: elements before a failure stay applied and
    /// the failure is reported as `RepoError::Bulk { completed, .. }`.
    fn persist_all(&self, entities: &[T]) -> RepoResult<usize> {
        for (completed, entity) in entities.iter().enumerate() {
            if let Err(source) = self.persist(entity) {
                return Err(RepoError::Bulk {
                    completed,
                    source: Box::new(source),
                });
            }
        }
        Ok(entities.len())
    }

    /// Deletes the stored entity with the same identifier, if any.
    fn delete(&self, entity: &T) -> RepoResult<bool>;

    /// Deletes each entity and returns how many were actually present.
    fn delete_all(&self, entities: &[T]) -> RepoResult<usize> {
        let mut removed = 0;
        for entity in entities {
            match self.delete(entity) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(source) => {
                    return Err(RepoError::Bulk {
                        completed: removed,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(removed)
    }

    fn find_by_id(&self, id: &T::Id) -> RepoResult<Option<T>>;

    /// Counts entities matching `filter`, or all entities for `None`.
    fn count(&self, filter: Option<&Self::Predicate>) -> RepoResult<u64>;

    /// Returns at most `limit` matching entities starting at `offset`.
    fn query_page(
        &self,
        filter: Option<&Self::Predicate>,
        offset: u64,
        limit: usize,
    ) -> RepoResult<Vec<T>>;

    /// Deletes every entity and returns how many were removed.
    fn clear(&self) -> RepoResult<u64>;
}

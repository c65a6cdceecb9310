//! Repository contracts seen by callers.
//!
//! # Invariants
//! - Every successful structural mutation (`add`, `add_all`, `remove`,
//!   `remove_all`, `clear`) invalidates live iterators of the same repository.
//! - `remove` never fails just because the subject is absent.
//! - `get_matching` and `get_all` share one filtering path.

use crate::repo::error::RepoResult;
use crate::spec::specification::Specification;

/// CRUD and iteration over a store of `T`.
pub trait Repository<T> {
    /// Lazy, fail-fast sequence over stored entities.
    type Iter<'a>: Iterator<Item = RepoResult<T>>
    where
        Self: 'a;

    fn add(&self, subject: &T) -> RepoResult<()>;

    /// Inserts all subjects and returns how many were inserted.
    ///
    /// Atomicity is adapter-defined; a failure reports how many elements
    /// remain applied through `RepoError::Bulk`.
    fn add_all(&self, subjects: &[T]) -> RepoResult<usize>;

    /// Removes `subject` if present and reports whether it was.
    fn remove(&self, subject: &T) -> RepoResult<bool>;

    /// Removes each subject and returns the exact number removed.
    fn remove_all(&self, subjects: &[T]) -> RepoResult<usize>;

    fn contains(&self, subject: &T) -> RepoResult<bool>;

    fn contains_all(&self, subjects: &[T]) -> RepoResult<bool> {
        for subject in subjects {
            if !self.contains(subject)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn size(&self) -> RepoResult<u64>;

    fn is_empty(&self) -> RepoResult<bool> {
        Ok(self.size()? == 0)
    }

    fn clear(&self) -> RepoResult<()>;

    fn iter(&self) -> RepoResult<Self::Iter<'_>>;
}

/// Repository whose entities carry an identifier and can be queried.
pub trait SequenceRepository<T, Id>: Repository<T> {
    /// Point lookup; an absent id yields `Ok(None)`.
    fn get(&self, id: &Id) -> RepoResult<Option<T>>;

    /// First entity matching `specification`, in iteration order.
    fn get_matching(&self, specification: &Specification) -> RepoResult<Option<T>> {
        self.get_all(specification)?.next().transpose()
    }

    /// Lazy sequence of every entity matching `specification`.
    fn get_all(&self, specification: &Specification) -> RepoResult<Self::Iter<'_>>;

    /// Removes the entity with `id`; an absent id yields `Ok(false)`.
    fn remove_by_id(&self, id: &Id) -> RepoResult<bool>;
}

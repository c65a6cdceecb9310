//! Store-native predicate construction seam.

use crate::repo::error::RepoResult;
use crate::spec::criterion::Criterion;

/// Query-building context a store exposes to specifications.
///
/// A specification walks its own structure and calls back into one builder
/// instance, so every operand of `and`/`or`/`not` is built against the same
/// binding (table, field table, bind list).
pub trait PredicateBuilder {
    type Predicate;

    /// Builds the predicate for one criterion.
    ///
    /// Adapters reject keys they do not know with `InvalidArgument`.
    fn criterion(&mut self, criterion: &Criterion) -> RepoResult<Self::Predicate>;

    /// Predicate that matches every entity.
    fn always(&mut self) -> Self::Predicate;

    fn and(&mut self, left: Self::Predicate, right: Self::Predicate) -> Self::Predicate;

    fn or(&mut self, left: Self::Predicate, right: Self::Predicate) -> Self::Predicate;

    fn not(&mut self, inner: Self::Predicate) -> Self::Predicate;
}

mod common;

use common::{blank, xs, Sample};
use reppy_core::{
    MemoryStore, RepoError, RepoResult, Repository, RepositoryConfig, SequenceRepository,
    Specification, Store, StoreRepository,
};
use std::cell::Cell;

/// Best-effort store that fails the n-th single-element write.
struct FlakyStore {
    inner: MemoryStore<Sample>,
    writes: Cell<usize>,
    fail_write_at: usize,
}

impl FlakyStore {
    fn failing_at(fail_write_at: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            writes: Cell::new(0),
            fail_write_at,
        }
    }

    fn tick(&self, operation: &'static str) -> RepoResult<()> {
        let write = self.writes.get();
        self.writes.set(write + 1);
        if write == self.fail_write_at {
            return Err(RepoError::persistence(operation, "disk full"));
        }
        Ok(())
    }
}

impl Store<Sample> for FlakyStore {
    type Predicate = <MemoryStore<Sample> as Store<Sample>>::Predicate;

    fn compile(&self, specification: &Specification) -> RepoResult<Self::Predicate> {
        self.inner.compile(specification)
    }

    fn persist(&self, entity: &Sample) -> RepoResult<()> {
        self.tick("persist")?;
        self.inner.persist(entity)
    }

    fn delete(&self, entity: &Sample) -> RepoResult<bool> {
        self.tick("delete")?;
        self.inner.delete(entity)
    }

    fn find_by_id(&self, id: &i64) -> RepoResult<Option<Sample>> {
        self.inner.find_by_id(id)
    }

    fn count(&self, filter: Option<&Self::Predicate>) -> RepoResult<u64> {
        self.inner.count(filter)
    }

    fn query_page(
        &self,
        filter: Option<&Self::Predicate>,
        offset: u64,
        limit: usize,
    ) -> RepoResult<Vec<Sample>> {
        self.inner.query_page(filter, offset, limit)
    }

    fn clear(&self) -> RepoResult<u64> {
        self.inner.clear()
    }
}

fn flaky_repo(fail_write_at: usize) -> StoreRepository<Sample, FlakyStore> {
    let config = RepositoryConfig::with_page_size(2).unwrap();
    StoreRepository::with_config(FlakyStore::failing_at(fail_write_at), config).unwrap()
}

#[test]
fn partial_add_all_reports_completed_and_keeps_applied_rows() {
    let repo = flaky_repo(4);
    repo.add(&blank(1)).unwrap();
    repo.add(&blank(10)).unwrap();

    let mut iter = repo.iter().unwrap();
    assert_eq!(iter.next().unwrap().unwrap().x, 1);

    let err = repo
        .add_all(&[blank(2), blank(3), blank(4), blank(5)])
        .unwrap_err();
    match &err {
        RepoError::Bulk { completed, source } => {
            assert_eq!(*completed, 2);
            assert!(matches!(&**source, RepoError::Persistence(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.completed(), 2);
    assert_eq!(xs(repo.iter().unwrap()), vec![1, 2, 3, 10]);
    assert!(repo.get(&4).unwrap().is_none());

    let (consumed, total) = match iter.next() {
        Some(Err(RepoError::ConcurrentModification { consumed, total })) => (consumed, total),
        other => panic!("expected a concurrent modification, got {other:?}"),
    };
    assert_eq!((consumed, total), (1, 2));
}

#[test]
fn partial_remove_all_reports_only_present_rows() {
    let repo = flaky_repo(5);
    assert_eq!(repo.add_all(&[blank(1), blank(2), blank(3)]).unwrap(), 3);

    let mut iter = repo.iter().unwrap();
    assert!(iter.next().unwrap().is_ok());

    let err = repo
        .remove_all(&[blank(1), blank(9), blank(2)])
        .unwrap_err();
    assert!(matches!(err, RepoError::Bulk { completed: 1, .. }), "{err}");
    assert_eq!(xs(repo.iter().unwrap()), vec![2, 3]);
    assert!(matches!(
        iter.next(),
        Some(Err(RepoError::ConcurrentModification { .. }))
    ));
}

#[test]
fn bulk_failure_before_any_write_keeps_iterators_valid() {
    let repo = flaky_repo(1);
    repo.add(&blank(1)).unwrap();

    let mut iter = repo.iter().unwrap();
    let err = repo.add_all(&[blank(2), blank(3)]).unwrap_err();
    assert!(matches!(err, RepoError::Bulk { completed: 0, .. }), "{err}");
    assert_eq!(iter.next().unwrap().unwrap().x, 1);
    assert!(iter.next().is_none());
}

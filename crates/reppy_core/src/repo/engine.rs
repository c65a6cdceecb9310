//! Generic repository engine over any [`Store`].
//!
//! # Responsibility
//! - Implement `Repository` and `SequenceRepository` once, for every store.
//! - Own the per-repository mutation signal and paging config.
//!
//! # Invariants
//! - The signal is notified only after the store reports success, or after a
//!   bulk failure that still left elements applied.
//! - Specifications are compiled before any store read, so unknown keys fail
//!   with `InvalidArgument` without side effects.

use crate::config::RepositoryConfig;
use crate::model::entity::{fields_equal, Entity};
use crate::repo::contract::{Repository, SequenceRepository};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::paged_iter::PagedIterator;
use crate::repo::signal::MutationSignal;
use crate::repo::store::Store;
use crate::spec::specification::Specification;
use log::{debug, error, warn};
use std::marker::PhantomData;

/// Repository built by composing a store with paging and mutation tracking.
pub struct StoreRepository<T: Entity, S: Store<T>> {
    store: S,
    signal: MutationSignal,
    config: RepositoryConfig,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, S: Store<T>> StoreRepository<T, S> {
    /// Creates a repository with the default config.
    pub fn new(store: S) -> Self {
        Self {
            store,
            signal: MutationSignal::new(),
            config: RepositoryConfig::default(),
            _entity: PhantomData,
        }
    }

    /// Creates a repository with a validated config.
    pub fn with_config(store: S, config: RepositoryConfig) -> RepoResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(store)
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Number of iterators still subscribed to this repository's mutations.
    pub fn live_iterators(&self) -> usize {
        self.signal.live_subscribers()
    }

    fn open_iter(&self, filter: Option<S::Predicate>) -> RepoResult<PagedIterator<'_, T, S>> {
        PagedIterator::open(&self.store, &self.signal, filter, self.config.page_size)
    }

    /// Point lookup that treats an absent id as an error.
    ///
    /// # Errors
    /// - `NotFound` when no entity has `id`.
    pub fn require(&self, id: &T::Id) -> RepoResult<T> {
        self.store
            .find_by_id(id)?
            .ok_or_else(|| RepoError::NotFound(format!("{} {id:?}", T::NAME)))
    }

    fn settle<R>(
        &self,
        operation: &'static str,
        result: RepoResult<R>,
        changed: impl Fn(&R) -> bool,
    ) -> RepoResult<R> {
        match &result {
            Ok(value) if changed(value) => {
                self.signal.notify();
                debug!(
                    "event={operation} module=repo status=ok entity={} generation={}",
                    T::NAME,
                    self.signal.generation()
                );
            }
            Ok(_) => {
                debug!("event={operation} module=repo status=noop entity={}", T::NAME);
            }
            Err(err) => {
                if err.completed() > 0 {
                    self.signal.notify();
                }
                error!(
                    "event={operation} module=repo status=error entity={} completed={} error={err}",
                    T::NAME,
                    err.completed()
                );
            }
        }
        result
    }
}

impl<T: Entity, S: Store<T>> Repository<T> for StoreRepository<T, S> {
    type Iter<'a>
        = PagedIterator<'a, T, S>
    where
        Self: 'a;

    fn add(&self, subject: &T) -> RepoResult<()> {
        let result = self.store.persist(subject);
        self.settle("repo_add", result, |_| true)
    }

    fn add_all(&self, subjects: &[T]) -> RepoResult<usize> {
        if subjects.is_empty() {
            return Ok(0);
        }
        let result = self.store.persist_all(subjects);
        self.settle("repo_add_all", result, |added| *added > 0)
    }

    fn remove(&self, subject: &T) -> RepoResult<bool> {
        let result = self.store.delete(subject);
        self.settle("repo_remove", result, |removed| *removed)
    }

    fn remove_all(&self, subjects: &[T]) -> RepoResult<usize> {
        if subjects.is_empty() {
            return Ok(0);
        }
        let result = self.store.delete_all(subjects);
        self.settle("repo_remove_all", result, |removed| *removed > 0)
    }

    fn contains(&self, subject: &T) -> RepoResult<bool> {
        Ok(self
            .store
            .find_by_id(&subject.id())?
            .is_some_and(|stored| fields_equal(&stored, subject)))
    }

    fn size(&self) -> RepoResult<u64> {
        self.store.count(None)
    }

    fn clear(&self) -> RepoResult<()> {
        // Clearing always counts as a mutation, even on an empty store.
        let result = self.store.clear();
        self.settle("repo_clear", result, |_| true).map(|_| ())
    }

    fn iter(&self) -> RepoResult<Self::Iter<'_>> {
        self.open_iter(None)
    }
}

impl<T: Entity, S: Store<T>> SequenceRepository<T, T::Id> for StoreRepository<T, S> {
    fn get(&self, id: &T::Id) -> RepoResult<Option<T>> {
        self.store.find_by_id(id)
    }

    fn get_all(&self, specification: &Specification) -> RepoResult<Self::Iter<'_>> {
        let filter = self.store.compile(specification).inspect_err(|err| {
            warn!(
                "event=spec_compile module=repo status=error entity={} spec={specification} error={err}",
                T::NAME
            );
        })?;
        debug!(
            "event=spec_compile module=repo status=ok entity={} spec={specification}",
            T::NAME
        );
        self.open_iter(Some(filter))
    }

    fn remove_by_id(&self, id: &T::Id) -> RepoResult<bool> {
        let Some(stored) = self.store.find_by_id(id)? else {
            debug!(
                "event=repo_remove_by_id module=repo status=noop entity={} id={id:?}",
                T::NAME
            );
            return Ok(false);
        };
        self.remove(&stored)
    }
}

impl<T: Entity, S: Store<T>> std::fmt::Debug for StoreRepository<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRepository")
            .field("entity", &T::NAME)
            .field("config", &self.config)
            .field("generation", &self.signal.generation())
            .finish_non_exhaustive()
    }
}

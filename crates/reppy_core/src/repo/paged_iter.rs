//! Paged, fail-fast iteration over a store.
//!
//! # Responsibility
//! - Stream entities page by page so that memory stays O(page size).
//! - Fail with `ConcurrentModification` on the first `next()` after the owning
//!   repository mutated.
//!
//! # Invariants
//! - `total` is snapshotted once at creation and never re-queried.
//! - `page_index * page_size + row_in_page` only grows and never passes
//!   `total`.
//! - The mutation subscription is released as soon as the iterator is
//!   exhausted, invalidated, failed or closed. Exhaustion happens on yielding
//!   the `total`-th row, so later mutations cannot fail a finished iterator.
//! - Rows already yielded are never withdrawn; nothing is yielded after a
//!   mutation was detected.

use crate::model::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::signal::{MutationSignal, Subscription};
use crate::repo::store::Store;
use log::{debug, trace, warn};
use std::iter::FusedIterator;

/// Lifecycle of a [`PagedIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// Constructed, first page not loaded yet.
    Fresh,
    /// Rows of the current page remain.
    Paging,
    /// Current page consumed; the next `next()` fetches another page.
    PageExhausted,
    /// Exhausted, failed or closed.
    Done,
    /// A repository mutation was observed; terminal.
    Invalidated,
}

/// Lazy sequence of entities fetched in fixed-size pages.
pub struct PagedIterator<'r, T: Entity, S: Store<T>> {
    store: &'r S,
    filter: Option<S::Predicate>,
    page_size: usize,
    page: std::vec::IntoIter<T>,
    page_len: usize,
    page_index: u64,
    row_in_page: usize,
    total: u64,
    subscription: Option<Subscription<'r>>,
    state: IterState,
}

impl<'r, T: Entity, S: Store<T>> PagedIterator<'r, T, S> {
    /// Subscribes to `signal`, snapshots the matching count and eagerly
    /// fetches the first page.
    ///
    /// # Errors
    /// - Store failures while counting or fetching the first page.
    pub(crate) fn open(
        store: &'r S,
        signal: &'r MutationSignal,
        filter: Option<S::Predicate>,
        page_size: usize,
    ) -> RepoResult<Self> {
        let subscription = signal.subscribe();
        let total = store.count(filter.as_ref())?;

        let mut iter = Self {
            store,
            filter,
            page_size,
            page: Vec::new().into_iter(),
            page_len: 0,
            page_index: 0,
            row_in_page: 0,
            total,
            subscription: Some(subscription),
            state: IterState::Fresh,
        };
        debug!(
            "event=iter_open module=paged_iter status=ok entity={} total={} page_size={}",
            T::NAME,
            total,
            page_size
        );

        if total == 0 {
            iter.finish();
            return Ok(iter);
        }

        iter.load_page(0)?;
        Ok(iter)
    }

    /// Number of entities this iterator will yield at most.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of entities yielded so far.
    pub fn consumed(&self) -> u64 {
        self.page_index * self.page_size as u64 + self.row_in_page as u64
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current lifecycle state, reporting a pending mutation as `Invalidated`.
    pub fn state(&self) -> IterState {
        match self.state {
            IterState::Fresh | IterState::Paging | IterState::PageExhausted
                if self.mutation_observed() =>
            {
                IterState::Invalidated
            }
            state => state,
        }
    }

    /// Whether the snapshot says more entities remain.
    ///
    /// Releases the mutation subscription once this turns `false`.
    pub fn has_next(&mut self) -> bool {
        match self.state {
            IterState::Done | IterState::Invalidated => false,
            _ if self.consumed() < self.total => true,
            _ => {
                self.finish();
                false
            }
        }
    }

    /// Stops iterating and releases the subscription; safe to call repeatedly.
    pub fn close(&mut self) {
        if !matches!(self.state, IterState::Done | IterState::Invalidated) {
            debug!(
                "event=iter_close module=paged_iter status=ok entity={} consumed={} total={}",
                T::NAME,
                self.consumed(),
                self.total
            );
            self.finish();
        }
    }

    fn mutation_observed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(Subscription::is_invalidated)
    }

    fn load_page(&mut self, page_index: u64) -> RepoResult<()> {
        let offset = page_index * self.page_size as u64;
        let rows = self
            .store
            .query_page(self.filter.as_ref(), offset, self.page_size)?;
        trace!(
            "event=page_fetch module=paged_iter status=ok entity={} page={} offset={} rows={}",
            T::NAME,
            page_index,
            offset,
            rows.len()
        );

        self.page_index = page_index;
        self.row_in_page = 0;
        self.page_len = rows.len();
        self.page = rows.into_iter();
        self.state = IterState::Paging;
        Ok(())
    }

    fn finish(&mut self) {
        self.state = IterState::Done;
        self.release();
    }

    fn invalidate(&mut self) -> RepoError {
        let err = RepoError::ConcurrentModification {
            consumed: self.consumed(),
            total: self.total,
        };
        warn!(
            "event=iter_invalidated module=paged_iter status=error entity={} consumed={} total={}",
            T::NAME,
            self.consumed(),
            self.total
        );
        self.state = IterState::Invalidated;
        self.release();
        err
    }

    fn release(&mut self) {
        self.subscription = None;
        self.page = Vec::new().into_iter();
        self.page_len = 0;
    }
}

impl<T: Entity, S: Store<T>> Iterator for PagedIterator<'_, T, S> {
    type Item = RepoResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, IterState::Done | IterState::Invalidated) {
            return None;
        }
        if !self.has_next() {
            return None;
        }
        if self.mutation_observed() {
            return Some(Err(self.invalidate()));
        }

        if self.state == IterState::PageExhausted {
            let next_page = self.page_index + 1;
            if let Err(err) = self.load_page(next_page) {
                self.finish();
                return Some(Err(err));
            }
            // The page may already reflect a mutation that landed mid-fetch.
            if self.mutation_observed() {
                return Some(Err(self.invalidate()));
            }
        }

        match self.page.next() {
            Some(entity) => {
                self.row_in_page += 1;
                if self.consumed() >= self.total {
                    self.finish();
                } else if self.row_in_page >= self.page_len {
                    self.state = IterState::PageExhausted;
                }
                Some(Ok(entity))
            }
            // The store holds fewer rows than the snapshot: it changed
            // without going through this repository.
            None => Some(Err(self.invalidate())),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            IterState::Done | IterState::Invalidated => (0, Some(0)),
            _ => {
                let remaining = self.total.saturating_sub(self.consumed());
                (0, usize::try_from(remaining).ok().map(|n| n + 1))
            }
        }
    }
}

impl<T: Entity, S: Store<T>> FusedIterator for PagedIterator<'_, T, S> {}

#[cfg(test)]
mod tests {
    use super::{IterState, PagedIterator};
    use crate::model::entity::{Entity, Field};
    use crate::model::value::Value;
    use crate::repo::error::{RepoError, RepoResult};
    use crate::repo::signal::MutationSignal;
    use crate::repo::store::Store;
    use crate::spec::specification::Specification;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(i64);

    const ROW_FIELDS: &[Field<Row>] = &[Field {
        name: "n",
        read: |row| Value::from(row.0),
    }];

    impl Entity for Row {
        type Id = i64;
        const NAME: &'static str = "rows";
        const ID_FIELD: &'static str = "n";

        fn id(&self) -> i64 {
            self.0
        }

        fn fields() -> &'static [Field<Self>] {
            ROW_FIELDS
        }
    }

    /// Vec-backed store that records page requests and can fail on demand.
    #[derive(Default)]
    struct ScriptedStore {
        rows: RefCell<Vec<Row>>,
        fetches: Cell<usize>,
        fail_fetch_at: Option<usize>,
        mutate_during_fetch: Option<(usize, Rc<MutationSignal>)>,
    }

    impl ScriptedStore {
        fn with_rows(n: i64) -> Self {
            Self {
                rows: RefCell::new((1..=n).map(Row).collect()),
                ..Self::default()
            }
        }
    }

    impl Store<Row> for ScriptedStore {
        type Predicate = ();

        fn compile(&self, _specification: &Specification) -> RepoResult<()> {
            Ok(())
        }

        fn persist(&self, entity: &Row) -> RepoResult<()> {
            self.rows.borrow_mut().push(entity.clone());
            Ok(())
        }

        fn delete(&self, entity: &Row) -> RepoResult<bool> {
            let mut rows = self.rows.borrow_mut();
            let before = rows.len();
            rows.retain(|row| row != entity);
            Ok(rows.len() != before)
        }

        fn find_by_id(&self, id: &i64) -> RepoResult<Option<Row>> {
            Ok(self.rows.borrow().iter().find(|row| row.0 == *id).cloned())
        }

        fn count(&self, _filter: Option<&()>) -> RepoResult<u64> {
            Ok(self.rows.borrow().len() as u64)
        }

        fn query_page(&self, _filter: Option<&()>, offset: u64, limit: usize) -> RepoResult<Vec<Row>> {
            let fetch = self.fetches.get();
            self.fetches.set(fetch + 1);
            if self.fail_fetch_at == Some(fetch) {
                return Err(RepoError::persistence("query_page", "connection lost"));
            }
            if let Some((at, signal)) = &self.mutate_during_fetch {
                if *at == fetch {
                    signal.notify();
                }
            }
            Ok(self
                .rows
                .borrow()
                .iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .collect())
        }

        fn clear(&self) -> RepoResult<u64> {
            let removed = self.rows.borrow().len() as u64;
            self.rows.borrow_mut().clear();
            Ok(removed)
        }
    }

    fn collect_ids(iter: PagedIterator<'_, Row, ScriptedStore>) -> Vec<i64> {
        iter.map(|row| row.unwrap().0).collect()
    }

    #[test]
    fn yields_every_row_for_any_page_size() {
        for page_size in [1, 2, 3, 7, 10, 64] {
            let store = ScriptedStore::with_rows(7);
            let signal = MutationSignal::new();
            let iter = PagedIterator::open(&store, &signal, None, page_size).unwrap();
            assert_eq!(collect_ids(iter), vec![1, 2, 3, 4, 5, 6, 7]);
            assert_eq!(store.fetches.get(), 7usize.div_ceil(page_size));
            assert_eq!(signal.live_subscribers(), 0);
        }
    }

    #[test]
    fn empty_store_is_done_without_fetching() {
        let store = ScriptedStore::default();
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 4).unwrap();
        assert_eq!(iter.state(), IterState::Done);
        assert!(!iter.has_next());
        assert!(iter.next().is_none());
        assert_eq!(store.fetches.get(), 0);
        assert_eq!(signal.live_subscribers(), 0);
    }

    #[test]
    fn mutation_fails_the_next_call_only_once() {
        let store = ScriptedStore::with_rows(5);
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 2).unwrap();

        assert_eq!(iter.next().unwrap().unwrap(), Row(1));
        signal.notify();
        assert_eq!(iter.state(), IterState::Invalidated);
        assert!(iter.has_next());

        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            RepoError::ConcurrentModification {
                consumed: 1,
                total: 5
            }
        ));
        assert!(iter.next().is_none());
        assert_eq!(signal.live_subscribers(), 0);
    }

    #[test]
    fn mutation_after_exhaustion_is_ignored() {
        let store = ScriptedStore::with_rows(2);
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 8).unwrap();
        iter.next();
        iter.next();
        assert!(!iter.has_next());
        assert_eq!(signal.live_subscribers(), 0);

        signal.notify();
        assert!(iter.next().is_none());
        assert_eq!(iter.state(), IterState::Done);
    }

    #[test]
    fn snapshot_caps_iteration_when_store_grows_externally() {
        let store = ScriptedStore::with_rows(3);
        let signal = MutationSignal::new();
        let iter = PagedIterator::open(&store, &signal, None, 2).unwrap();
        store.rows.borrow_mut().push(Row(4));
        assert_eq!(collect_ids(iter), vec![1, 2, 3]);
    }

    #[test]
    fn short_page_after_external_shrink_is_reported() {
        let store = ScriptedStore::with_rows(4);
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 2).unwrap();
        iter.next();
        iter.next();
        store.rows.borrow_mut().truncate(2);

        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, RepoError::ConcurrentModification { .. }));
        assert!(iter.next().is_none());
    }

    #[test]
    fn page_fetch_failure_is_yielded_and_terminal() {
        let store = ScriptedStore {
            fail_fetch_at: Some(1),
            ..ScriptedStore::with_rows(4)
        };
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 2).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next().unwrap().unwrap_err(),
            RepoError::Persistence(_)
        ));
        assert!(iter.next().is_none());
        assert_eq!(signal.live_subscribers(), 0);
    }

    #[test]
    fn close_is_idempotent_and_releases_subscription() {
        let store = ScriptedStore::with_rows(4);
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 2).unwrap();
        assert_eq!(signal.live_subscribers(), 1);

        iter.close();
        iter.close();
        assert_eq!(iter.state(), IterState::Done);
        assert_eq!(signal.live_subscribers(), 0);
        assert!(iter.next().is_none());
    }

    #[test]
    fn mutation_while_handling_the_last_row_does_not_fail() {
        let store = ScriptedStore::with_rows(3);
        let signal = MutationSignal::new();
        let iter = PagedIterator::open(&store, &signal, None, 2).unwrap();

        let mut seen = Vec::new();
        for row in iter {
            let row = row.unwrap();
            if row.0 == 3 {
                signal.notify();
            }
            seen.push(row.0);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn yielding_the_last_row_releases_the_subscription() {
        let store = ScriptedStore::with_rows(4);
        let signal = MutationSignal::new();
        let mut iter = PagedIterator::open(&store, &signal, None, 3).unwrap();

        let taken = iter.by_ref().take(4).count();
        assert_eq!(taken, 4);
        assert_eq!(iter.consumed(), 4);
        assert_eq!(iter.state(), IterState::Done);
        assert_eq!(signal.live_subscribers(), 0);
    }

    #[test]
    fn mutation_during_a_page_fetch_discards_that_page() {
        let signal = Rc::new(MutationSignal::new());
        let store = ScriptedStore {
            mutate_during_fetch: Some((1, Rc::clone(&signal))),
            ..ScriptedStore::with_rows(4)
        };
        let mut iter = PagedIterator::open(&store, &signal, None, 2).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), Row(1));
        assert_eq!(iter.next().unwrap().unwrap(), Row(2));

        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            RepoError::ConcurrentModification {
                consumed: 2,
                total: 4
            }
        ));
        assert_eq!(store.fetches.get(), 2);
        assert!(iter.next().is_none());
    }
}

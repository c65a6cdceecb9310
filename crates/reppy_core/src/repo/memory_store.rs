//! In-process store over a shared collection.
//!
//! # Responsibility
//! - Back a repository with a `Vec<T>` that callers may share and inspect.
//! - Evaluate specifications in memory with the same NULL and `LIKE`
//!   semantics as the SQLite adapter.
//!
//! # Invariants
//! - At most one stored entity per identifier.
//! - Pages are ordered by identifier, independent of insertion order.
//! - `LIKE` is case-sensitive; `%` matches any run and `_` one character.

use crate::model::entity::{field_named, Entity, Field};
use crate::model::value::Value;
use crate::repo::error::{PersistenceFailure, RepoError, RepoResult};
use crate::repo::store::Store;
use crate::spec::criterion::{Criterion, Operator};
use crate::spec::predicate::PredicateBuilder;
use crate::spec::specification::Specification;
use regex::Regex;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Collection shared between a [`MemoryStore`] and its creator.
pub type SharedCollection<T> = Arc<RwLock<Vec<T>>>;

/// Store adapter over a shared in-memory collection.
#[derive(Debug)]
pub struct MemoryStore<T> {
    entries: SharedCollection<T>,
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self::from_shared(Arc::default())
    }

    /// Wraps an existing collection; changes show up on both sides.
    pub fn from_shared(entries: SharedCollection<T>) -> Self {
        Self { entries }
    }

    /// Handle to the underlying collection.
    pub fn shared(&self) -> SharedCollection<T> {
        Arc::clone(&self.entries)
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, Vec<T>>> {
        self.entries.read().map_err(|_| poisoned())
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, Vec<T>>> {
        self.entries.write().map_err(|_| poisoned())
    }

    fn matching<'a>(
        entries: &'a [T],
        filter: Option<&'a MemoryPredicate<T>>,
    ) -> impl Iterator<Item = &'a T> + 'a {
        entries
            .iter()
            .filter(move |entity| filter.map_or(true, |predicate| predicate.matches(entity)))
    }
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self::from_shared(self.shared())
    }
}

impl<T: Entity> Store<T> for MemoryStore<T> {
    type Predicate = MemoryPredicate<T>;

    fn compile(&self, specification: &Specification) -> RepoResult<MemoryPredicate<T>> {
        specification.to_predicate(&mut MemoryPredicateBuilder::<T>::new())
    }

    fn persist(&self, entity: &T) -> RepoResult<()> {
        let mut entries = self.write()?;
        let key = id_key(entity);
        if entries.iter().any(|stored| id_key(stored) == key) {
            return Err(duplicate(entity));
        }
        entries.push(entity.clone());
        Ok(())
    }

    /// All-or-nothing: duplicates are checked before anything is inserted.
    fn persist_all(&self, entities: &[T]) -> RepoResult<usize> {
        let mut entries = self.write()?;
        let mut seen = entries.iter().map(id_key).collect::<BTreeSet<_>>();
        for entity in entities {
            if !seen.insert(id_key(entity)) {
                return Err(RepoError::Bulk {
                    completed: 0,
                    source: Box::new(duplicate(entity)),
                });
            }
        }
        entries.extend(entities.iter().cloned());
        Ok(entities.len())
    }

    fn delete(&self, entity: &T) -> RepoResult<bool> {
        let mut entries = self.write()?;
        let key = id_key(entity);
        match entries.iter().position(|stored| id_key(stored) == key) {
            Some(index) => {
                entries.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_by_id(&self, id: &T::Id) -> RepoResult<Option<T>> {
        let key: Value = id.clone().into();
        Ok(self
            .read()?
            .iter()
            .find(|stored| id_key(*stored) == key)
            .cloned())
    }

    fn count(&self, filter: Option<&MemoryPredicate<T>>) -> RepoResult<u64> {
        let entries = self.read()?;
        Ok(Self::matching(&entries, filter).count() as u64)
    }

    fn query_page(
        &self,
        filter: Option<&MemoryPredicate<T>>,
        offset: u64,
        limit: usize,
    ) -> RepoResult<Vec<T>> {
        let entries = self.read()?;
        let mut keyed = Self::matching(&entries, filter)
            .map(|entity| (id_key(entity), entity))
            .collect::<Vec<_>>();

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(keyed.len());
        let end = start.saturating_add(limit).min(keyed.len());
        if start == end {
            return Ok(Vec::new());
        }
        // Only the window needs full ordering: partition around its bounds.
        let by_id = |left: &(Value, &T), right: &(Value, &T)| left.0.cmp(&right.0);
        if end < keyed.len() {
            keyed.select_nth_unstable_by(end, by_id);
        }
        let head = &mut keyed[..end];
        if start > 0 {
            head.select_nth_unstable_by(start, by_id);
        }
        let window = &mut head[start..];
        window.sort_unstable_by(by_id);

        Ok(window.iter().map(|(_, entity)| (*entity).clone()).collect())
    }

    fn clear(&self) -> RepoResult<u64> {
        let mut entries = self.write()?;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }
}

/// Compiled in-memory filter, evaluated with SQL three-valued logic.
#[derive(Debug, Clone)]
pub enum MemoryPredicate<T: 'static> {
    Always,
    Test {
        field: &'static Field<T>,
        criterion: Criterion,
        pattern: Option<Regex>,
    },
    And(Box<MemoryPredicate<T>>, Box<MemoryPredicate<T>>),
    Or(Box<MemoryPredicate<T>>, Box<MemoryPredicate<T>>),
    Not(Box<MemoryPredicate<T>>),
}

impl<T: 'static> MemoryPredicate<T> {
    /// Whether `entity` definitely matches; unknown counts as no match.
    pub fn matches(&self, entity: &T) -> bool {
        self.eval(entity) == Some(true)
    }

    /// `Some(true)`, `Some(false)` or `None` for unknown.
    pub fn eval(&self, entity: &T) -> Option<bool> {
        match self {
            Self::Always => Some(true),
            Self::Test {
                field,
                criterion,
                pattern,
            } => {
                let value = field.value_of(entity);
                match pattern {
                    Some(pattern) => like_text(&value).map(|text| pattern.is_match(&text)),
                    None => criterion.test(&value),
                }
            }
            Self::And(left, right) => match (left.eval(entity), right.eval(entity)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Self::Or(left, right) => match (left.eval(entity), right.eval(entity)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Self::Not(inner) => inner.eval(entity).map(|matched| !matched),
        }
    }
}

/// Builds [`MemoryPredicate`]s against the field table of `T`.
pub struct MemoryPredicateBuilder<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> MemoryPredicateBuilder<T> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Default for MemoryPredicateBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> PredicateBuilder for MemoryPredicateBuilder<T> {
    type Predicate = MemoryPredicate<T>;

    fn criterion(&mut self, criterion: &Criterion) -> RepoResult<MemoryPredicate<T>> {
        let field = field_named::<T>(criterion.key()).ok_or_else(|| {
            RepoError::InvalidArgument(format!(
                "unknown field `{}` for entity `{}`",
                criterion.key(),
                T::NAME
            ))
        })?;
        let pattern = match (criterion.operator(), criterion.value()) {
            (Operator::Like, Value::Text(pattern)) => Some(like_regex(pattern)?),
            _ => None,
        };
        Ok(MemoryPredicate::Test {
            field,
            criterion: criterion.clone(),
            pattern,
        })
    }

    fn always(&mut self) -> MemoryPredicate<T> {
        MemoryPredicate::Always
    }

    fn and(&mut self, left: MemoryPredicate<T>, right: MemoryPredicate<T>) -> MemoryPredicate<T> {
        MemoryPredicate::And(Box::new(left), Box::new(right))
    }

    fn or(&mut self, left: MemoryPredicate<T>, right: MemoryPredicate<T>) -> MemoryPredicate<T> {
        MemoryPredicate::Or(Box::new(left), Box::new(right))
    }

    fn not(&mut self, inner: MemoryPredicate<T>) -> MemoryPredicate<T> {
        MemoryPredicate::Not(Box::new(inner))
    }
}

/// Translates a `LIKE` pattern into an anchored regex.
fn like_regex(pattern: &str) -> RepoResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|err| {
        RepoError::InvalidArgument(format!("unsupported like pattern `{pattern}`: {err}"))
    })
}

/// Text a SQL `LIKE` would compare for `value`; NULL and lists are unknown.
fn like_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text.clone()),
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(format!("{number:?}")),
        Value::Bool(flag) => Some(i64::from(*flag).to_string()),
        Value::Null | Value::List(_) => None,
    }
}

fn id_key<T: Entity>(entity: &T) -> Value {
    entity.id().into()
}

fn duplicate<T: Entity>(entity: &T) -> RepoError {
    RepoError::Persistence(
        PersistenceFailure::new("persist", "duplicate identifier")
            .with_subject(format!("{entity:?}")),
    )
}

fn poisoned() -> RepoError {
    RepoError::persistence("lock", "memory store lock poisoned")
}

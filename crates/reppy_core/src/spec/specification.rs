//! Composable query specifications.
//!
//! # Responsibility
//! - Hold either a flat criteria set (implicit AND) or a boolean tree.
//! - Compose without mutating operands; every combinator returns a new value.
//!
//! # Invariants
//! - A built `Specification` is immutable and cheap to clone; sub-trees are
//!   shared, never copied or changed.
//! - Flat criteria use set semantics: equal `(key, operator, value)` triples
//!   collapse.
//! - Flat and tree forms compile through the same `PredicateBuilder`, so an
//!   adapter gives both the same meaning.

use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use crate::spec::criterion::{Criterion, Operator};
use crate::spec::predicate::PredicateBuilder;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static NO_CRITERIA: BTreeSet<Criterion> = BTreeSet::new();

/// A composable predicate over entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specification {
    node: Arc<Node>,
}

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Criteria(BTreeSet<Criterion>),
    And(Specification, Specification),
    Or(Specification, Specification),
    Not(Specification),
}

impl Specification {
    fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    /// Flat specification with no criteria; matches every entity.
    pub fn all() -> Self {
        Self::from_node(Node::Criteria(BTreeSet::new()))
    }

    /// Flat specification over the given criteria.
    pub fn from_criteria(criteria: impl IntoIterator<Item = Criterion>) -> Self {
        Self::from_node(Node::Criteria(criteria.into_iter().collect()))
    }

    /// Single-criterion flat specification.
    pub fn of(
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> RepoResult<Self> {
        Ok(Self::from_criteria([Criterion::new(key, operator, value)?]))
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> RepoResult<Self> {
        Self::of(key, Operator::Eq, value)
    }

    pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> RepoResult<Self> {
        Self::of(key, Operator::Ne, value)
    }

    pub fn le(key: impl Into<String>, value: impl Into<Value>) -> RepoResult<Self> {
        Self::of(key, Operator::Le, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> RepoResult<Self> {
        Self::of(key, Operator::Lt, value)
    }

    pub fn ge(key: impl Into<String>, value: impl Into<Value>) -> RepoResult<Self> {
        Self::of(key, Operator::Ge, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> RepoResult<Self> {
        Self::of(key, Operator::Gt, value)
    }

    /// Inclusive range. Reversed bounds are rejected, not swapped.
    pub fn between(
        key: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> RepoResult<Self> {
        Self::of(key, Operator::Between, Value::List(vec![low.into(), high.into()]))
    }

    pub fn is_in<V: Into<Value>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> RepoResult<Self> {
        let members = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::of(key, Operator::In, Value::List(members))
    }

    pub fn like(key: impl Into<String>, pattern: impl Into<String>) -> RepoResult<Self> {
        Self::of(key, Operator::Like, Value::Text(pattern.into()))
    }

    /// Whether this specification is a flat criteria set.
    pub fn is_flat(&self) -> bool {
        matches!(self.node.as_ref(), Node::Criteria(_))
    }

    /// Criteria of a flat specification; empty for tree nodes.
    pub fn criteria(&self) -> &BTreeSet<Criterion> {
        match self.node.as_ref() {
            Node::Criteria(criteria) => criteria,
            _ => &NO_CRITERIA,
        }
    }

    /// Union of two flat criteria sets.
    ///
    /// # Errors
    /// - `InvalidArgument` when either side is a tree node: a tree has no flat
    ///   view to merge without changing its meaning.
    pub fn merge(&self, other: &Specification) -> RepoResult<Self> {
        if !self.is_flat() || !other.is_flat() {
            return Err(RepoError::InvalidArgument(
                "merge requires flat specifications; use `and` for trees".to_string(),
            ));
        }

        let merged = self
            .criteria()
            .iter()
            .chain(other.criteria())
            .cloned()
            .collect::<BTreeSet<_>>();
        Ok(Self::from_node(Node::Criteria(merged)))
    }

    pub fn and(&self, other: &Specification) -> Self {
        Self::from_node(Node::And(self.clone(), other.clone()))
    }

    pub fn or(&self, other: &Specification) -> Self {
        Self::from_node(Node::Or(self.clone(), other.clone()))
    }

    pub fn not(&self) -> Self {
        Self::from_node(Node::Not(self.clone()))
    }

    /// Builds the store-native predicate for this specification.
    pub fn to_predicate<B: PredicateBuilder>(&self, builder: &mut B) -> RepoResult<B::Predicate> {
        match self.node.as_ref() {
            Node::Criteria(criteria) => {
                let mut built = criteria.iter();
                let Some(first) = built.next() else {
                    return Ok(builder.always());
                };
                let mut predicate = builder.criterion(first)?;
                for criterion in built {
                    let next = builder.criterion(criterion)?;
                    predicate = builder.and(predicate, next);
                }
                Ok(predicate)
            }
            Node::And(left, right) => {
                let left = left.to_predicate(builder)?;
                let right = right.to_predicate(builder)?;
                Ok(builder.and(left, right))
            }
            Node::Or(left, right) => {
                let left = left.to_predicate(builder)?;
                let right = right.to_predicate(builder)?;
                Ok(builder.or(left, right))
            }
            Node::Not(inner) => {
                let inner = inner.to_predicate(builder)?;
                Ok(builder.not(inner))
            }
        }
    }
}

impl Display for Specification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.node.as_ref() {
            Node::Criteria(criteria) if criteria.is_empty() => write!(f, "*"),
            Node::Criteria(criteria) => {
                write!(f, "{{")?;
                for (index, criterion) in criteria.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{criterion}")?;
                }
                write!(f, "}}")
            }
            Node::And(left, right) => write!(f, "({left} AND {right})"),
            Node::Or(left, right) => write!(f, "({left} OR {right})"),
            Node::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

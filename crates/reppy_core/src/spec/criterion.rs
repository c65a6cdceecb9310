//! Comparison operators and single-field criteria.
//!
//! A [`Criterion`] is the atomic predicate: a field key, an [`Operator`] and
//! an operand. Construction validates the operand shape so that every store
//! adapter can compile a criterion without re-checking it.

use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Comparison operator of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    /// Inclusive range; operand is a two-element list `[low, high]`.
    Between,
    /// Set membership; operand is a list of scalars.
    In,
    /// SQL `LIKE` pattern with `%` and `_` wildcards.
    Like,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Self::Eq,
        Self::Ne,
        Self::Le,
        Self::Lt,
        Self::Ge,
        Self::Gt,
        Self::Between,
        Self::In,
        Self::Like,
    ];

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Le => "le",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Gt => "gt",
            Self::Between => "between",
            Self::In => "in",
            Self::Like => "like",
        }
    }

    /// SQL spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::Like => "LIKE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|operator| operator.as_str() == value.trim())
    }

    /// Maps an ordering of `field` against operand to a match result.
    ///
    /// Only meaningful for the six scalar comparison operators.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Le => ordering != Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Ge => ordering != Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
            Self::Between | Self::In | Self::Like => false,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable `(key, operator, value)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "CriterionParts")]
pub struct Criterion {
    key: String,
    operator: Operator,
    value: Value,
}

#[derive(Deserialize)]
struct CriterionParts {
    key: String,
    operator: Operator,
    value: Value,
}

impl TryFrom<CriterionParts> for Criterion {
    type Error = RepoError;

    fn try_from(parts: CriterionParts) -> Result<Self, Self::Error> {
        Criterion::new(parts.key, parts.operator, parts.value)
    }
}

impl Criterion {
    /// Validates and builds one criterion.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty key or a NULL operand.
    /// - `InvalidArgument` when `between` is not given exactly two comparable
    ///   scalars in ascending order.
    /// - `InvalidArgument` when `in` is not given a list of scalars, or `like`
    ///   is not given text.
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> RepoResult<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(RepoError::InvalidArgument(
                "criterion key must not be empty".to_string(),
            ));
        }

        let value = value.into();
        validate_operand(&key, operator, &value)?;
        Ok(Self {
            key,
            operator,
            value,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns `(low, high)` for a `between` criterion.
    pub fn bounds(&self) -> Option<(&Value, &Value)> {
        match (self.operator, self.value.as_list()) {
            (Operator::Between, Some([low, high])) => Some((low, high)),
            _ => None,
        }
    }

    /// Tests a field value, using SQL three-valued logic.
    ///
    /// Returns `None` (unknown) when the field is NULL or not comparable with
    /// the operand. `like` criteria need a compiled pattern and always report
    /// unknown here; see the in-memory store for pattern matching.
    pub fn test(&self, field: &Value) -> Option<bool> {
        // `x IN ()` is false even for NULL `x`, as in SQLite.
        if self.operator == Operator::In && self.value.as_list().is_some_and(<[Value]>::is_empty) {
            return Some(false);
        }
        if field.is_null() {
            return None;
        }

        match self.operator {
            Operator::Between => {
                let (low, high) = self.bounds()?;
                let above = field.compare(low)?;
                let below = field.compare(high)?;
                Some(above != Ordering::Less && below != Ordering::Greater)
            }
            Operator::In => {
                let members = self.value.as_list()?;
                let mut unknown = false;
                for member in members {
                    match field.compare(member) {
                        Some(Ordering::Equal) => return Some(true),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
            Operator::Like => None,
            scalar => field
                .compare(&self.value)
                .map(|ordering| scalar.accepts(ordering)),
        }
    }
}

impl Display for Criterion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.key, self.operator, self.value)
    }
}

fn validate_operand(key: &str, operator: Operator, value: &Value) -> RepoResult<()> {
    match operator {
        Operator::Between => {
            let Some(items) = value.as_list() else {
                return Err(invalid(key, operator, "expects a [low, high] pair"));
            };
            let [low, high] = items else {
                return Err(invalid(
                    key,
                    operator,
                    &format!("expects exactly 2 values, got {}", items.len()),
                ));
            };
            if !low.is_scalar() || !high.is_scalar() {
                return Err(invalid(key, operator, "bounds must be non-null scalars"));
            }
            match low.compare(high) {
                Some(Ordering::Greater) => Err(invalid(
                    key,
                    operator,
                    &format!("lower bound {low} is greater than upper bound {high}"),
                )),
                Some(_) => Ok(()),
                None => Err(invalid(
                    key,
                    operator,
                    &format!("bounds {} and {} are not comparable", low.kind(), high.kind()),
                )),
            }
        }
        Operator::In => {
            let Some(items) = value.as_list() else {
                return Err(invalid(key, operator, "expects a list of values"));
            };
            if items.iter().any(|item| !item.is_scalar()) {
                return Err(invalid(key, operator, "members must be non-null scalars"));
            }
            Ok(())
        }
        Operator::Like => match value {
            Value::Text(_) => Ok(()),
            other => Err(invalid(
                key,
                operator,
                &format!("expects a text pattern, got {}", other.kind()),
            )),
        },
        _ => {
            if value.is_scalar() {
                Ok(())
            } else {
                Err(invalid(
                    key,
                    operator,
                    &format!("expects a non-null scalar, got {}", value.kind()),
                ))
            }
        }
    }
}

fn invalid(key: &str, operator: Operator, message: &str) -> RepoError {
    RepoError::InvalidArgument(format!("`{key} {operator}` {message}"))
}

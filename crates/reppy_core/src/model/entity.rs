//! Entity capability table.
//!
//! # Responsibility
//! - Describe, per entity type, which fields a store may filter and compare.
//! - Decode store rows back into entities without runtime reflection.
//!
//! # Invariants
//! - `fields()` is a static table decided when the entity type is written.
//! - `ID_FIELD` names one entry of `fields()`.
//! - Field names double as store column names and criterion keys.

use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use std::fmt::Debug;
use uuid::Uuid;

/// One registered field: its name and a plain-function accessor.
pub struct Field<T> {
    pub name: &'static str,
    pub read: fn(&T) -> Value,
}

impl<T> Field<T> {
    /// Reads this field from `entity`.
    pub fn value_of(&self, entity: &T) -> Value {
        (self.read)(entity)
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// A type managed by a repository.
///
/// Implementations register every persisted field once, in a `const` table:
///
/// ```
/// use reppy_core::{Entity, Field, Value};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Point {
///     x: i64,
///     label: Option<String>,
/// }
///
/// const POINT_FIELDS: &[Field<Point>] = &[
///     Field { name: "x", read: |p| Value::from(p.x) },
///     Field { name: "label", read: |p| Value::from(p.label.clone()) },
/// ];
///
/// impl Entity for Point {
///     type Id = i64;
///     const NAME: &'static str = "points";
///     const ID_FIELD: &'static str = "x";
///
///     fn id(&self) -> i64 {
///         self.x
///     }
///
///     fn fields() -> &'static [Field<Self>] {
///         POINT_FIELDS
///     }
/// }
/// ```
pub trait Entity: Clone + Debug + 'static {
    type Id: Clone + Debug + Into<Value>;

    /// Logical collection name; the SQLite adapter uses it as table name.
    const NAME: &'static str;
    /// Name of the identifier field inside `fields()`.
    const ID_FIELD: &'static str;

    fn id(&self) -> Self::Id;

    fn fields() -> &'static [Field<Self>];
}

/// Returns the registered field called `name`.
pub fn field_named<T: Entity>(name: &str) -> Option<&'static Field<T>> {
    T::fields().iter().find(|field| field.name == name)
}

/// Returns whether two entities agree on every registered field.
pub fn fields_equal<T: Entity>(left: &T, right: &T) -> bool {
    T::fields()
        .iter()
        .all(|field| field.value_of(left) == field.value_of(right))
}

/// Field values of one stored row, keyed by registered field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new(values: Vec<(&'static str, Value)>) -> Self {
        Self { values }
    }

    /// Builds a record by reading every registered field of `entity`.
    pub fn of<T: Entity>(entity: &T) -> Self {
        Self::new(
            T::fields()
                .iter()
                .map(|field| (field.name, field.value_of(entity)))
                .collect(),
        )
    }

    pub fn values(&self) -> &[(&'static str, Value)] {
        &self.values
    }

    pub fn get(&self, name: &str) -> RepoResult<&Value> {
        self.values
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
            .ok_or_else(|| RepoError::InvalidData(format!("record has no field `{name}`")))
    }

    pub fn integer(&self, name: &str) -> RepoResult<i64> {
        self.optional_integer(name)?
            .ok_or_else(|| unexpected_null(name))
    }

    pub fn optional_integer(&self, name: &str) -> RepoResult<Option<i64>> {
        match self.get(name)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            Value::Bool(value) => Ok(Some(i64::from(*value))),
            other => Err(unexpected_kind(name, "integer", other)),
        }
    }

    pub fn real(&self, name: &str) -> RepoResult<f64> {
        match self.get(name)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            Value::Null => Err(unexpected_null(name)),
            other => Err(unexpected_kind(name, "real", other)),
        }
    }

    pub fn text(&self, name: &str) -> RepoResult<String> {
        self.optional_text(name)?.ok_or_else(|| unexpected_null(name))
    }

    pub fn optional_text(&self, name: &str) -> RepoResult<Option<String>> {
        match self.get(name)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            other => Err(unexpected_kind(name, "text", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> RepoResult<bool> {
        match self.get(name)? {
            Value::Bool(value) => Ok(*value),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Null => Err(unexpected_null(name)),
            other => Err(unexpected_kind(name, "bool", other)),
        }
    }

    pub fn uuid(&self, name: &str) -> RepoResult<Uuid> {
        let text = self.text(name)?;
        Uuid::parse_str(&text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{text}` in field `{name}`"))
        })
    }
}

/// Entities that can be rebuilt from a stored row.
pub trait FromRecord: Entity {
    fn from_record(record: &Record) -> RepoResult<Self>;
}

fn unexpected_null(name: &str) -> RepoError {
    RepoError::InvalidData(format!("field `{name}` is unexpectedly NULL"))
}

fn unexpected_kind(name: &str, expected: &str, actual: &Value) -> RepoError {
    RepoError::InvalidData(format!(
        "field `{name}` expected {expected}, got {}",
        actual.kind()
    ))
}

//! SQLite store adapter.
//!
//! # Responsibility
//! - Persist entities of one type in the table named by `Entity::NAME`, one
//!   column per registered field.
//! - Compile specifications into parameterized `WHERE` clauses.
//!
//! # Invariants
//! - Every operand is bound as a parameter; only validated field names are
//!   spliced into SQL, always quoted.
//! - Pages are ordered by the identifier column.
//! - `persist_all` and `delete_all` run in one immediate transaction and are
//!   all-or-nothing.

use crate::db::DbError;
use crate::model::entity::{field_named, Entity, FromRecord, Record};
use crate::model::value::Value;
use crate::repo::error::{PersistenceFailure, RepoError, RepoResult};
use crate::repo::store::Store;
use crate::spec::criterion::{Criterion, Operator};
use crate::spec::predicate::PredicateBuilder;
use crate::spec::specification::Specification;
use log::{info, trace};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::marker::PhantomData;

/// Store adapter over a borrowed, migrated SQLite connection.
pub struct SqliteStore<'conn, T> {
    conn: &'conn Connection,
    table: String,
    columns: String,
    id_column: String,
    _entity: PhantomData<fn() -> T>,
}

impl<'conn, T: FromRecord> SqliteStore<'conn, T> {
    /// Creates the adapter after checking that the entity table and every
    /// registered column exist.
    ///
    /// # Errors
    /// - `InvalidArgument` when `T::ID_FIELD` is not a registered field.
    /// - `Persistence` wrapping `DbError::MissingRequiredTable` or
    ///   `DbError::MissingRequiredColumn` when the schema does not fit.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        if field_named::<T>(T::ID_FIELD).is_none() {
            return Err(RepoError::InvalidArgument(format!(
                "identifier field `{}` is not registered for entity `{}`",
                T::ID_FIELD,
                T::NAME
            )));
        }
        ensure_entity_table_ready::<T>(conn)?;

        let columns = T::fields()
            .iter()
            .map(|field| quote_identifier(field.name))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "event=store_open module=sqlite_store status=ok entity={} columns={}",
            T::NAME,
            T::fields().len()
        );
        Ok(Self {
            conn,
            table: quote_identifier(T::NAME),
            columns,
            id_column: quote_identifier(T::ID_FIELD),
            _entity: PhantomData,
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; T::fields().len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            self.table, self.columns
        )
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?1;", self.table, self.id_column)
    }

    fn insert_with(&self, conn: &Connection, entity: &T) -> RepoResult<()> {
        let values = T::fields()
            .iter()
            .map(|field| to_sql_value(&field.value_of(entity)))
            .collect::<RepoResult<Vec<_>>>()?;
        conn.execute(&self.insert_sql(), params_from_iter(values.iter()))
            .map_err(|err| failure("persist", err).with_subject(format!("{entity:?}")))?;
        Ok(())
    }

    fn delete_with(&self, conn: &Connection, entity: &T) -> RepoResult<bool> {
        let id = to_sql_value(&entity.id().into())?;
        let changed = conn
            .execute(&self.delete_sql(), [id])
            .map_err(|err| failure("delete", err).with_subject(format!("{entity:?}")))?;
        Ok(changed > 0)
    }

    fn where_clause(filter: Option<&SqlPredicate>) -> String {
        match filter {
            Some(predicate) => format!(" WHERE {}", predicate.sql),
            None => String::new(),
        }
    }
}

impl<T: FromRecord> Store<T> for SqliteStore<'_, T> {
    type Predicate = SqlPredicate;

    fn compile(&self, specification: &Specification) -> RepoResult<SqlPredicate> {
        let predicate = specification.to_predicate(&mut SqlPredicateBuilder::<T>::new())?;
        trace!(
            "event=spec_compile module=sqlite_store status=ok entity={} sql={:?} params={}",
            T::NAME,
            predicate.sql,
            predicate.params.len()
        );
        Ok(predicate)
    }

    fn persist(&self, entity: &T) -> RepoResult<()> {
        self.insert_with(self.conn, entity)
    }

    fn persist_all(&self, entities: &[T]) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| bulk(failure("persist_all", err).into()))?;
        for entity in entities {
            self.insert_with(&tx, entity).map_err(bulk)?;
        }
        tx.commit()
            .map_err(|err| bulk(failure("persist_all", err).into()))?;
        Ok(entities.len())
    }

    fn delete(&self, entity: &T) -> RepoResult<bool> {
        self.delete_with(self.conn, entity)
    }

    fn delete_all(&self, entities: &[T]) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| bulk(failure("delete_all", err).into()))?;
        let mut removed = 0;
        for entity in entities {
            if self.delete_with(&tx, entity).map_err(bulk)? {
                removed += 1;
            }
        }
        tx.commit()
            .map_err(|err| bulk(failure("delete_all", err).into()))?;
        Ok(removed)
    }

    fn find_by_id(&self, id: &T::Id) -> RepoResult<Option<T>> {
        let key = to_sql_value(&id.clone().into())?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1;",
            self.columns, self.table, self.id_column
        );
        let record = self
            .conn
            .query_row(&sql, [key], |row| Ok(decode_row::<T>(row)))
            .optional()
            .map_err(|err| failure("find_by_id", err).with_subject(format!("{id:?}")))?;
        record.transpose()
    }

    fn count(&self, filter: Option<&SqlPredicate>) -> RepoResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{};",
            self.table,
            Self::where_clause(filter)
        );
        let params = filter.map_or(&[][..], |predicate| predicate.params.as_slice());
        let total: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(|err| RepoError::from(failure("count", err)))?;
        Ok(total.max(0) as u64)
    }

    fn query_page(
        &self,
        filter: Option<&SqlPredicate>,
        offset: u64,
        limit: usize,
    ) -> RepoResult<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} ASC LIMIT ? OFFSET ?;",
            self.columns,
            self.table,
            Self::where_clause(filter),
            self.id_column
        );
        let mut params = filter
            .map(|predicate| predicate.params.clone())
            .unwrap_or_default();
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        params.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let read_failure = |err| RepoError::from(failure("query_page", err));
        let mut stmt = self.conn.prepare(&sql).map_err(read_failure)?;
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(read_failure)?;
        let mut page = Vec::with_capacity(limit.min(1024));
        while let Some(row) = rows.next().map_err(read_failure)? {
            page.push(decode_row::<T>(row)?);
        }
        Ok(page)
    }

    fn clear(&self) -> RepoResult<u64> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {};", self.table), [])
            .map_err(|err| RepoError::from(failure("clear", err)))?;
        Ok(removed as u64)
    }
}

/// Parameterized SQL boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    /// Positional parameters in the order their `?` appear in `sql`.
    pub params: Vec<SqlValue>,
}

impl SqlPredicate {
    fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Builds [`SqlPredicate`]s against the columns of `T`.
pub struct SqlPredicateBuilder<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqlPredicateBuilder<T> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Default for SqlPredicateBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> PredicateBuilder for SqlPredicateBuilder<T> {
    type Predicate = SqlPredicate;

    fn criterion(&mut self, criterion: &Criterion) -> RepoResult<SqlPredicate> {
        let field = field_named::<T>(criterion.key()).ok_or_else(|| {
            RepoError::InvalidArgument(format!(
                "unknown field `{}` for entity `{}`",
                criterion.key(),
                T::NAME
            ))
        })?;
        let column = quote_identifier(field.name);

        match criterion.operator() {
            Operator::Between => {
                let (low, high) = criterion.bounds().ok_or_else(|| {
                    RepoError::InvalidArgument(format!("malformed range in `{criterion}`"))
                })?;
                Ok(SqlPredicate::new(
                    format!("{column} BETWEEN ? AND ?"),
                    vec![to_sql_value(low)?, to_sql_value(high)?],
                ))
            }
            Operator::In => {
                let members = criterion.value().as_list().unwrap_or_default();
                if members.is_empty() {
                    return Ok(SqlPredicate::new("0 = 1", Vec::new()));
                }
                let placeholders = vec!["?"; members.len()].join(", ");
                Ok(SqlPredicate::new(
                    format!("{column} IN ({placeholders})"),
                    members.iter().map(to_sql_value).collect::<RepoResult<_>>()?,
                ))
            }
            operator => Ok(SqlPredicate::new(
                format!("{column} {} ?", operator.symbol()),
                vec![to_sql_value(criterion.value())?],
            )),
        }
    }

    fn always(&mut self) -> SqlPredicate {
        SqlPredicate::new("1 = 1", Vec::new())
    }

    fn and(&mut self, left: SqlPredicate, right: SqlPredicate) -> SqlPredicate {
        join("AND", left, right)
    }

    fn or(&mut self, left: SqlPredicate, right: SqlPredicate) -> SqlPredicate {
        join("OR", left, right)
    }

    fn not(&mut self, inner: SqlPredicate) -> SqlPredicate {
        SqlPredicate::new(format!("NOT ({})", inner.sql), inner.params)
    }
}

fn join(keyword: &str, left: SqlPredicate, right: SqlPredicate) -> SqlPredicate {
    let mut params = left.params;
    params.extend(right.params);
    SqlPredicate::new(format!("({}) {keyword} ({})", left.sql, right.sql), params)
}

fn to_sql_value(value: &Value) -> RepoResult<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Integer(number) => Ok(SqlValue::Integer(*number)),
        Value::Real(number) => Ok(SqlValue::Real(*number)),
        Value::Text(text) => Ok(SqlValue::Text(text.clone())),
        Value::List(_) => Err(RepoError::InvalidArgument(
            "list values cannot be bound as a single SQL parameter".to_string(),
        )),
    }
}

fn decode_row<T: FromRecord>(row: &Row<'_>) -> RepoResult<T> {
    let mut values = Vec::with_capacity(T::fields().len());
    for (index, field) in T::fields().iter().enumerate() {
        let raw = row
            .get_ref(index)
            .map_err(|err| RepoError::from(failure("decode", err)))?;
        let value = match raw {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(number) => Value::Integer(number),
            ValueRef::Real(number) => Value::Real(number),
            ValueRef::Text(bytes) => Value::Text(
                std::str::from_utf8(bytes)
                    .map_err(|_| {
                        RepoError::InvalidData(format!(
                            "column `{}` of `{}` is not valid UTF-8",
                            field.name,
                            T::NAME
                        ))
                    })?
                    .to_string(),
            ),
            ValueRef::Blob(_) => {
                return Err(RepoError::InvalidData(format!(
                    "column `{}` of `{}` holds a blob",
                    field.name,
                    T::NAME
                )));
            }
        };
        values.push((field.name, value));
    }
    T::from_record(&Record::new(values))
}

fn ensure_entity_table_ready<T: Entity>(conn: &Connection) -> RepoResult<()> {
    if !table_exists(conn, T::NAME)? {
        return Err(DbError::MissingRequiredTable(T::NAME.to_string()).into());
    }
    for field in T::fields() {
        if !table_has_column(conn, T::NAME, field.name)? {
            return Err(DbError::MissingRequiredColumn {
                table: T::NAME.to_string(),
                column: field.name.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )
        .map_err(DbError::from)?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({});", quote_identifier(table)))
        .map_err(DbError::from)?;
    let mut rows = stmt.query([]).map_err(DbError::from)?;
    while let Some(row) = rows.next().map_err(DbError::from)? {
        let current: String = row.get(1).map_err(DbError::from)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn failure(operation: &'static str, err: rusqlite::Error) -> PersistenceFailure {
    PersistenceFailure::new(operation, err)
}

fn bulk(source: RepoError) -> RepoError {
    RepoError::Bulk {
        completed: 0,
        source: Box::new(source),
    }
}

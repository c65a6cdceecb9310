//! SQLite migration executor.
//!
//! # Responsibility
//! - Apply caller-registered schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// One schema step owned by the application that defines its entities.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

/// Returns the latest version in `migrations`, or `0` when empty.
pub fn latest_version(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    ensure_ordered(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version(migrations);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn ensure_ordered(migrations: &[Migration]) -> DbResult<()> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(DbError::UnorderedMigrations {
                previous: pair[0].version,
                next: pair[1].version,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, Migration};
    use crate::db::DbError;
    use rusqlite::Connection;

    const STEPS: &[Migration] = &[
        Migration {
            version: 1,
            sql: "CREATE TABLE a (id INTEGER PRIMARY KEY);",
        },
        Migration {
            version: 2,
            sql: "CREATE TABLE b (id INTEGER PRIMARY KEY);",
        },
    ];

    #[test]
    fn applies_pending_steps_and_records_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, &STEPS[..1]).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), 1);

        apply_migrations(&mut conn, STEPS).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), latest_version(STEPS));
    }

    #[test]
    fn rejects_unordered_steps() {
        let mut conn = Connection::open_in_memory().unwrap();
        let reversed = [STEPS[1], STEPS[0]];
        let err = apply_migrations(&mut conn, &reversed).unwrap_err();
        assert!(matches!(
            err,
            DbError::UnorderedMigrations {
                previous: 2,
                next: 1
            }
        ));
    }

    #[test]
    fn empty_list_has_version_zero() {
        assert_eq!(latest_version(&[]), 0);
    }
}

mod common;

use common::{sample, seed, xs, Sample, SAMPLE_MIGRATIONS};
use reppy_core::{
    open_db, open_db_in_memory, Entity, Field, FromRecord, Migration, Record, RepoError,
    RepoResult, Repository, SequenceRepository, Specification, SqliteRepository, SqliteStore,
    Value,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct Ticket {
    id: Uuid,
    priority: i64,
    score: f64,
    done: bool,
}

const TICKET_FIELDS: &[Field<Ticket>] = &[
    Field {
        name: "id",
        read: |ticket| Value::from(ticket.id),
    },
    Field {
        name: "priority",
        read: |ticket| Value::from(ticket.priority),
    },
    Field {
        name: "score",
        read: |ticket| Value::from(ticket.score),
    },
    Field {
        name: "done",
        read: |ticket| Value::from(ticket.done),
    },
];

impl Entity for Ticket {
    type Id = Uuid;
    const NAME: &'static str = "tickets";
    const ID_FIELD: &'static str = "id";

    fn id(&self) -> Uuid {
        self.id
    }

    fn fields() -> &'static [Field<Self>] {
        TICKET_FIELDS
    }
}

impl FromRecord for Ticket {
    fn from_record(record: &Record) -> RepoResult<Self> {
        Ok(Self {
            id: record.uuid("id")?,
            priority: record.integer("priority")?,
            score: record.real("score")?,
            done: record.boolean("done")?,
        })
    }
}

const TICKET_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "CREATE TABLE tickets (
        id TEXT PRIMARY KEY NOT NULL,
        priority INTEGER NOT NULL,
        score REAL NOT NULL,
        done INTEGER NOT NULL CHECK (done IN (0, 1))
    );",
}];

fn ticket(priority: i64, score: f64, done: bool) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        priority,
        score,
        done,
    }
}

#[test]
fn data_survives_reopening_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reppy.db");

    {
        let conn = open_db(&path, SAMPLE_MIGRATIONS).unwrap();
        let repo = SqliteRepository::<Sample>::new(SqliteStore::try_new(&conn).unwrap());
        repo.add_all(&seed()).unwrap();
    }

    let conn = open_db(&path, SAMPLE_MIGRATIONS).unwrap();
    let repo = SqliteRepository::<Sample>::new(SqliteStore::try_new(&conn).unwrap());
    assert_eq!(repo.size().unwrap(), 5);
    assert_eq!(repo.get(&1).unwrap(), Some(sample(1, "test")));
}

#[test]
fn like_is_case_sensitive() {
    let conn = open_db_in_memory(SAMPLE_MIGRATIONS).unwrap();
    let repo = SqliteRepository::<Sample>::new(SqliteStore::try_new(&conn).unwrap());
    repo.add_all(&seed()).unwrap();

    let upper = Specification::like("s", "Te%").unwrap();
    assert_eq!(xs(repo.get_all(&upper).unwrap()), vec![3]);
}

#[test]
fn failed_bulk_insert_rolls_back_everything() {
    let conn = open_db_in_memory(SAMPLE_MIGRATIONS).unwrap();
    let repo = SqliteRepository::<Sample>::new(SqliteStore::try_new(&conn).unwrap());

    let err = repo
        .add_all(&[sample(1, "a"), sample(2, "b"), sample(1, "c")])
        .unwrap_err();
    assert_eq!(err.completed(), 0);
    assert!(matches!(err, RepoError::Bulk { .. }));
    assert!(repo.is_empty().unwrap());
}

#[test]
fn missing_table_or_column_is_rejected_on_construction() {
    let conn = open_db_in_memory(&[]).unwrap();
    assert!(matches!(
        SqliteStore::<Sample>::try_new(&conn).err(),
        Some(RepoError::Persistence(_))
    ));

    let conn = open_db_in_memory(&[Migration {
        version: 1,
        sql: "CREATE TABLE samples (x INTEGER PRIMARY KEY NOT NULL);",
    }])
    .unwrap();
    let err = SqliteStore::<Sample>::try_new(&conn).err().unwrap();
    assert!(err.to_string().contains("`s`"), "{err}");
}

#[test]
fn undecodable_rows_surface_as_invalid_data() {
    let conn = open_db_in_memory(SAMPLE_MIGRATIONS).unwrap();
    conn.execute("INSERT INTO samples (x, s) VALUES (1, x'00ff');", [])
        .unwrap();
    let repo = SqliteRepository::<Sample>::new(SqliteStore::try_new(&conn).unwrap());

    assert!(matches!(
        repo.get(&1).unwrap_err(),
        RepoError::InvalidData(_)
    ));
    assert!(matches!(repo.iter().err(), Some(RepoError::InvalidData(_))));
}

#[test]
fn uuid_keyed_entities_round_trip_every_column_kind() {
    let conn = open_db_in_memory(TICKET_MIGRATIONS).unwrap();
    let repo = SqliteRepository::<Ticket>::new(SqliteStore::try_new(&conn).unwrap());

    let urgent = ticket(1, 0.5, false);
    let closed = ticket(2, 2.0, true);
    let later = ticket(3, 1.25, false);
    repo.add_all(&[urgent.clone(), closed.clone(), later.clone()])
        .unwrap();

    assert_eq!(repo.get(&closed.id).unwrap(), Some(closed.clone()));
    assert!(repo.contains(&urgent).unwrap());

    let open = Specification::eq("done", false).unwrap();
    let mut open_ids = repo
        .get_all(&open)
        .unwrap()
        .map(|ticket| ticket.unwrap().id)
        .collect::<Vec<_>>();
    open_ids.sort();
    let mut expected = vec![urgent.id, later.id];
    expected.sort();
    assert_eq!(open_ids, expected);

    let scored = Specification::between("score", 1, 2.5).unwrap();
    let mut priorities = repo
        .get_all(&scored)
        .unwrap()
        .map(|ticket| ticket.unwrap().priority)
        .collect::<Vec<_>>();
    priorities.sort();
    assert_eq!(priorities, vec![2, 3]);

    assert!(repo.remove_by_id(&later.id).unwrap());
    assert!(matches!(
        repo.require(&later.id).unwrap_err(),
        RepoError::NotFound(_)
    ));
    assert_eq!(repo.require(&urgent.id).unwrap(), urgent);
}

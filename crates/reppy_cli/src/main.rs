//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `reppy_core` end to end against an in-memory SQLite database.
//! - Keep output deterministic apart from generated task ids.
//!
//! Usage: `reppy [--log-dir <absolute dir>]`

use log::info;
use reppy_core::{
    open_db_in_memory, Entity, Field, FromRecord, Migration, Record, RepoResult, Repository,
    SequenceRepository, Specification, SqliteRepository, SqliteStore, Value,
};
use std::error::Error;
use uuid::Uuid;

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "CREATE TABLE tasks (
        id TEXT PRIMARY KEY NOT NULL,
        rank INTEGER NOT NULL,
        title TEXT
    );",
}];

#[derive(Debug, Clone)]
struct Task {
    id: Uuid,
    rank: i64,
    title: Option<String>,
}

const TASK_FIELDS: &[Field<Task>] = &[
    Field {
        name: "id",
        read: |task| Value::from(task.id),
    },
    Field {
        name: "rank",
        read: |task| Value::from(task.rank),
    },
    Field {
        name: "title",
        read: |task| Value::from(task.title.clone()),
    },
];

impl Entity for Task {
    type Id = Uuid;
    const NAME: &'static str = "tasks";
    const ID_FIELD: &'static str = "id";

    fn id(&self) -> Uuid {
        self.id
    }

    fn fields() -> &'static [Field<Self>] {
        TASK_FIELDS
    }
}

impl FromRecord for Task {
    fn from_record(record: &Record) -> RepoResult<Self> {
        Ok(Self {
            id: record.uuid("id")?,
            rank: record.integer("rank")?,
            title: record.optional_text("title")?,
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--log-dir" => {
                let dir = args.next().ok_or("--log-dir expects a directory")?;
                reppy_core::init_logging(reppy_core::default_log_level(), dir)?;
            }
            other => return Err(format!("unknown argument `{other}`").into()),
        }
    }

    let conn = open_db_in_memory(MIGRATIONS)?;
    let tasks: SqliteRepository<'_, Task> = SqliteRepository::new(SqliteStore::try_new(&conn)?);

    let titles = [Some("test the pager"), Some("Tea"), None, Some("teardown")];
    let seed = titles
        .iter()
        .zip(1..)
        .map(|(title, rank)| Task {
            id: Uuid::new_v4(),
            rank,
            title: title.map(str::to_string),
        })
        .collect::<Vec<_>>();
    tasks.add_all(&seed)?;
    info!("event=cli_seed module=cli status=ok tasks={}", seed.len());

    let spec = Specification::between("rank", 1, 3)?.and(&Specification::like("title", "te%")?);
    println!("reppy_core version={}", reppy_core::core_version());
    println!("tasks size={}", tasks.size()?);
    println!("query {spec}");
    for task in tasks.get_all(&spec)? {
        let task = task?;
        println!(
            "  rank={} title={}",
            task.rank,
            task.title.as_deref().unwrap_or("-")
        );
    }

    let removed = tasks.remove_by_id(&seed[0].id)?;
    println!("remove_by_id first={removed} size={}", tasks.size()?);
    Ok(())
}

#![allow(dead_code)]

use reppy_core::{Entity, Field, FromRecord, Migration, Record, RepoResult, Value};

pub const SAMPLE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: "CREATE TABLE samples (
            x INTEGER PRIMARY KEY NOT NULL,
            s TEXT
        );",
    },
    Migration {
        version: 2,
        sql: "CREATE INDEX samples_s_idx ON samples (s);",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub x: i64,
    pub s: Option<String>,
}

pub const SAMPLE_FIELDS: &[Field<Sample>] = &[
    Field {
        name: "x",
        read: |sample| Value::from(sample.x),
    },
    Field {
        name: "s",
        read: |sample| Value::from(sample.s.clone()),
    },
];

impl Entity for Sample {
    type Id = i64;
    const NAME: &'static str = "samples";
    const ID_FIELD: &'static str = "x";

    fn id(&self) -> i64 {
        self.x
    }

    fn fields() -> &'static [Field<Self>] {
        SAMPLE_FIELDS
    }
}

impl FromRecord for Sample {
    fn from_record(record: &Record) -> RepoResult<Self> {
        Ok(Self {
            x: record.integer("x")?,
            s: record.optional_text("s")?,
        })
    }
}

pub fn sample(x: i64, s: &str) -> Sample {
    Sample {
        x,
        s: Some(s.to_string()),
    }
}

pub fn blank(x: i64) -> Sample {
    Sample { x, s: None }
}

/// `x` from 1 to 5 with `s` in `test`, `temp`, `Team`, `tea`, NULL.
pub fn seed() -> Vec<Sample> {
    vec![
        sample(1, "test"),
        sample(2, "temp"),
        sample(3, "Team"),
        sample(4, "tea"),
        blank(5),
    ]
}

pub fn xs(items: impl IntoIterator<Item = RepoResult<Sample>>) -> Vec<i64> {
    items
        .into_iter()
        .map(|item| item.unwrap().x)
        .collect()
}

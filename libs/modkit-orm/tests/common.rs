#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]
#![cfg(feature = "sqlite")]

use std::sync::Arc;

use modkit_orm::sqlite::SqliteConnection;
use modkit_orm::{
    ColumnFormat, Connection, DbEngine, Entity, EntityMeta, OrmResult, Row, Statement, Value,
};

pub const SCHEMA: &str = r"
CREATE TABLE teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT,
    email TEXT,
    status TEXT,
    team_id INTEGER REFERENCES teams (id),
    is_admin INTEGER NOT NULL DEFAULT 0,
    password TEXT,
    created TEXT,
    updated TEXT
);
CREATE TABLE memberships (
    user_id INTEGER NOT NULL,
    team_id INTEGER NOT NULL,
    role TEXT,
    PRIMARY KEY (user_id, team_id)
);
CREATE TABLE user_teams (
    user_id INTEGER NOT NULL,
    team_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, team_id)
);
";

/// `SQLite` connection that records every statement it is asked to run.
pub struct RecordingConnection {
    inner: SqliteConnection,
    pub log: Vec<String>,
}

impl RecordingConnection {
    /// In-memory database with [`SCHEMA`] applied.
    pub fn new() -> Self {
        let inner = SqliteConnection::open_in_memory().unwrap();
        inner.execute_batch(SCHEMA).unwrap();
        Self {
            inner,
            log: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.log.iter().filter(|sql| sql.starts_with(prefix)).count()
    }
}

impl Connection for RecordingConnection {
    fn engine(&self) -> DbEngine {
        self.inner.engine()
    }

    fn execute(&mut self, stmt: &Statement) -> OrmResult<u64> {
        self.log.push(stmt.sql.clone());
        self.inner.execute(stmt)
    }

    fn query(&mut self, stmt: &Statement) -> OrmResult<Vec<Row>> {
        self.log.push(stmt.sql.clone());
        self.inner.query(stmt)
    }

    fn last_insert_id(&mut self, sequence: Option<&str>) -> OrmResult<Value> {
        self.inner.last_insert_id(sequence)
    }

    fn begin(&mut self) -> OrmResult<()> {
        self.log.push("BEGIN".to_owned());
        self.inner.begin()
    }

    fn commit(&mut self) -> OrmResult<()> {
        self.log.push("COMMIT".to_owned());
        self.inner.commit()
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.log.push("ROLLBACK".to_owned());
        self.inner.rollback()
    }
}

pub fn users_meta() -> Arc<EntityMeta> {
    EntityMeta::builder("users")
        .primary_key("id")
        .field("first_name", "firstName")
        .field("is_admin", "isAdmin")
        .field("team_id", "teamId")
        .format("is_admin", ColumnFormat::Bool)
        .format("created", ColumnFormat::DateTime)
        .format("updated", ColumnFormat::DateTime)
        .hidden("password")
        .build()
        .unwrap()
}

pub fn stamped_users_meta() -> Arc<EntityMeta> {
    EntityMeta::builder("users")
        .primary_key("id")
        .field("first_name", "firstName")
        .format("created", ColumnFormat::DateTime)
        .format("updated", ColumnFormat::DateTime)
        .track_timestamps()
        .build()
        .unwrap()
}

pub fn memberships_meta() -> Arc<EntityMeta> {
    EntityMeta::builder("memberships")
        .compound_key(["user_id", "team_id"])
        .build()
        .unwrap()
}

/// Inserts `n` users named `user-1..=n`, cycling status through `a`, `b`, `c`.
pub fn seed_users(conn: &mut RecordingConnection, n: usize) {
    let meta = users_meta();
    for i in 1..=n {
        let mut user = Entity::new(&meta);
        user.set("firstName", format!("user-{i}")).unwrap();
        user.set("status", ["a", "b", "c"][(i - 1) % 3]).unwrap();
        user.set("password", "secret").unwrap();
        user.save(conn).unwrap();
    }
    conn.clear();
}

pub fn seed_team(conn: &mut RecordingConnection, name: &str) -> Value {
    let meta = EntityMeta::builder("teams").primary_key("id").build().unwrap();
    let mut team = Entity::new(&meta);
    team.set("name", name).unwrap();
    team.save(conn).unwrap();
    conn.clear();
    team.id_value().unwrap()
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;

use serde_json::json;

use crate::DbEngine;
use crate::connection::{Connection, Statement};
use crate::error::OrmResult;
use crate::value::{Row, Value};

/// In-memory connection that records statements and replays canned results.
pub struct ScriptedConnection {
    engine: DbEngine,
    statements: Vec<Statement>,
    results: VecDeque<Vec<Row>>,
    affected: u64,
    next_id: Value,
    pub id_reads: Vec<Option<String>>,
}

impl ScriptedConnection {
    pub fn new(engine: DbEngine) -> Self {
        Self {
            engine,
            statements: Vec::new(),
            results: VecDeque::new(),
            affected: 1,
            next_id: json!(1),
            id_reads: Vec::new(),
        }
    }

    /// Queues the rows returned by the next `query` call.
    pub fn push_rows(&mut self, rows: Vec<Row>) -> &mut Self {
        self.results.push_back(rows);
        self
    }

    /// Queues a single-value result, as returned by `COUNT(1)` or `FOUND_ROWS()`.
    pub fn push_scalar(&mut self, value: Value) -> &mut Self {
        let mut row = Row::new();
        row.insert("value".to_owned(), value);
        self.push_rows(vec![row])
    }

    pub fn with_next_id(mut self, id: Value) -> Self {
        self.next_id = id;
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.sql.clone()).collect()
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

impl Connection for ScriptedConnection {
    fn engine(&self) -> DbEngine {
        self.engine
    }

    fn execute(&mut self, stmt: &Statement) -> OrmResult<u64> {
        self.statements.push(stmt.clone());
        Ok(self.affected)
    }

    fn query(&mut self, stmt: &Statement) -> OrmResult<Vec<Row>> {
        self.statements.push(stmt.clone());
        Ok(self.results.pop_front().unwrap_or_default())
    }

    fn last_insert_id(&mut self, sequence: Option<&str>) -> OrmResult<Value> {
        self.id_reads.push(sequence.map(str::to_owned));
        Ok(self.next_id.clone())
    }

    fn begin(&mut self) -> OrmResult<()> {
        self.statements.push(Statement::raw("BEGIN"));
        Ok(())
    }

    fn commit(&mut self) -> OrmResult<()> {
        self.statements.push(Statement::raw("COMMIT"));
        Ok(())
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.statements.push(Statement::raw("ROLLBACK"));
        Ok(())
    }
}

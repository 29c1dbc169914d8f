//! `SQLite` connection adapter backed by `rusqlite`.

use std::path::Path;
use std::time::Duration;

use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};
use tracing::{debug, trace};

use crate::DbEngine;
use crate::config::SqliteConfig;
use crate::connection::{Connection, Statement};
use crate::error::OrmResult;
use crate::value::{Row, Value};

/// A single `SQLite` connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

fn to_sql_value(value: &sea_query::Value) -> SqlValue {
    use sea_query::Value as V;
    match value {
        V::Bool(Some(b)) => SqlValue::Integer(i64::from(*b)),
        V::TinyInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
        V::SmallInt(Some(i)) => SqlValue::Integer(i64::from(*i)),
        V::Int(Some(i)) => SqlValue::Integer(i64::from(*i)),
        V::BigInt(Some(i)) => SqlValue::Integer(*i),
        V::TinyUnsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        V::SmallUnsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        V::Unsigned(Some(u)) => SqlValue::Integer(i64::from(*u)),
        V::BigUnsigned(Some(u)) => {
            i64::try_from(*u).map_or_else(|_| SqlValue::Text(u.to_string()), SqlValue::Integer)
        }
        V::Float(Some(f)) => SqlValue::Real(f64::from(*f)),
        V::Double(Some(f)) => SqlValue::Real(*f),
        V::String(Some(s)) => SqlValue::Text(s.as_ref().clone()),
        V::Char(Some(c)) => SqlValue::Text(c.to_string()),
        V::Bytes(Some(b)) => SqlValue::Blob(b.as_ref().clone()),
        _ => SqlValue::Null,
    }
}

/// Text must be valid UTF-8; BLOBs come back as an array of byte values.
fn from_sql_ref(value: ValueRef<'_>) -> OrmResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(rusqlite::Error::Utf8Error)?
                .to_owned(),
        ),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().copied().map(Value::from).collect()),
    })
}

impl SqliteConnection {
    /// Opens (creating if needed) the database file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::OrmError::Sqlite`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite database");
        Ok(Self {
            conn: rusqlite::Connection::open(path)?,
        })
    }

    /// # Errors
    /// Returns [`crate::OrmError::Sqlite`] if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> OrmResult<Self> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    /// Opens the configured database and applies its pragmas.
    ///
    /// # Errors
    /// Returns [`crate::OrmError::Sqlite`] if opening or configuring fails.
    pub fn from_config(config: &SqliteConfig) -> OrmResult<Self> {
        let conn = match &config.path {
            Some(path) => Self::open(path)?,
            None => Self::open_in_memory()?,
        };
        conn.conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.conn
            .pragma_update(None, "foreign_keys", config.foreign_keys)?;
        Ok(conn)
    }

    /// Runs several `;`-separated statements, e.g. a schema script.
    ///
    /// # Errors
    /// Returns [`crate::OrmError::Sqlite`] on the first failing statement.
    pub fn execute_batch(&self, sql: &str) -> OrmResult<()> {
        trace!(sql, "sqlite batch");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    #[must_use]
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Connection for SqliteConnection {
    fn engine(&self) -> DbEngine {
        DbEngine::Sqlite
    }

    fn execute(&mut self, stmt: &Statement) -> OrmResult<u64> {
        trace!(sql = %stmt.sql, params = stmt.values.len(), "sqlite execute");
        let affected = self
            .conn
            .execute(&stmt.sql, params_from_iter(stmt.values.iter().map(to_sql_value)))?;
        Ok(affected as u64)
    }

    fn query(&mut self, stmt: &Statement) -> OrmResult<Vec<Row>> {
        trace!(sql = %stmt.sql, params = stmt.values.len(), "sqlite query");
        let mut prepared = self.conn.prepare(&stmt.sql)?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();

        let mut rows = prepared.query(params_from_iter(stmt.values.iter().map(to_sql_value)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), from_sql_ref(row.get_ref(i)?)?);
            }
            out.push(record);
        }
        Ok(out)
    }

    fn last_insert_id(&mut self, _sequence: Option<&str>) -> OrmResult<Value> {
        Ok(Value::from(self.conn.last_insert_rowid()))
    }

    fn begin(&mut self) -> OrmResult<()> {
        self.execute_batch("BEGIN")
    }

    fn commit(&mut self) -> OrmResult<()> {
        self.execute_batch("COMMIT")
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.execute_batch("ROLLBACK")
    }
}

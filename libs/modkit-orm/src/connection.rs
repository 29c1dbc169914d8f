//! The connection collaborator: raw statement execution plus helpers.
//!
//! The mapping layer never owns a connection. Every operation borrows one as
//! `&mut dyn Connection` for the duration of the call; pooling, closing and
//! transaction scoping stay with the caller.

use sea_query::{
    Alias, ConditionalStatement, Expr, MysqlQueryBuilder, PostgresQueryBuilder, Query,
    QueryStatementWriter, SimpleExpr, SqliteQueryBuilder,
};
use tracing::{debug, warn};

use crate::DbEngine;
use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value, describe_pairs, to_sea_value};

/// A rendered SQL statement with its bound values.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<sea_query::Value>,
}

impl Statement {
    /// Renders a `sea-query` statement for `engine`.
    pub fn build<S: QueryStatementWriter>(engine: DbEngine, stmt: &S) -> Self {
        let (sql, values) = match engine {
            DbEngine::Postgres => stmt.build(PostgresQueryBuilder),
            DbEngine::MySql => stmt.build(MysqlQueryBuilder),
            DbEngine::Sqlite => stmt.build(SqliteQueryBuilder),
        };
        Self {
            sql,
            values: values.0,
        }
    }

    /// Renders a statement with its values inlined, for logs and result metadata.
    pub fn render<S: QueryStatementWriter>(engine: DbEngine, stmt: &S) -> String {
        match engine {
            DbEngine::Postgres => stmt.to_string(PostgresQueryBuilder),
            DbEngine::MySql => stmt.to_string(MysqlQueryBuilder),
            DbEngine::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }

    /// A statement without bound values.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }
}

fn key_filter(key: &[(String, Value)]) -> OrmResult<SimpleExpr> {
    key.iter()
        .map(|(column, value)| Expr::col(Alias::new(column)).eq(to_sea_value(value)))
        .reduce(SimpleExpr::and)
        .ok_or_else(|| OrmError::invalid_argument("refusing to write without a row key"))
}

/// Synchronous raw-SQL access used by every persistence and search operation.
pub trait Connection {
    fn engine(&self) -> DbEngine;

    /// Runs a statement, returning the number of affected rows.
    ///
    /// # Errors
    /// Any failure reported by the underlying driver.
    fn execute(&mut self, stmt: &Statement) -> OrmResult<u64>;

    /// Runs a query, returning every row in column order.
    ///
    /// # Errors
    /// Any failure reported by the underlying driver.
    fn query(&mut self, stmt: &Statement) -> OrmResult<Vec<Row>>;

    /// The key generated by the last insert, optionally read from `sequence`.
    ///
    /// # Errors
    /// Any failure reported by the underlying driver.
    fn last_insert_id(&mut self, sequence: Option<&str>) -> OrmResult<Value>;

    /// # Errors
    /// Any failure reported by the underlying driver.
    fn begin(&mut self) -> OrmResult<()>;

    /// # Errors
    /// Any failure reported by the underlying driver.
    fn commit(&mut self) -> OrmResult<()>;

    /// # Errors
    /// Any failure reported by the underlying driver.
    fn rollback(&mut self) -> OrmResult<()>;

    fn quote_identifier(&self, ident: &str) -> String {
        match self.engine() {
            DbEngine::MySql => format!("`{}`", ident.replace('`', "``")),
            DbEngine::Postgres | DbEngine::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    fn quote_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_owned(),
            Value::Bool(b) => match self.engine() {
                DbEngine::Postgres => (if *b { "TRUE" } else { "FALSE" }).to_owned(),
                DbEngine::MySql | DbEngine::Sqlite => u8::from(*b).to_string(),
            },
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Array(_) | Value::Object(_) => {
                format!("'{}'", value.to_string().replace('\'', "''"))
            }
        }
    }

    /// Inserts one row into `table`.
    ///
    /// # Errors
    /// Driver failures, or [`OrmError::InvalidArgument`] for an empty row.
    fn insert(&mut self, table: &str, values: &Row) -> OrmResult<u64> {
        if values.is_empty() {
            return Err(OrmError::invalid_argument(format!(
                "nothing to insert into '{table}'"
            )));
        }
        let mut query = Query::insert();
        query
            .into_table(Alias::new(table))
            .columns(values.keys().map(Alias::new))
            .values(values.values().map(|v| SimpleExpr::Value(to_sea_value(v))))
            .map_err(|e| OrmError::invalid_argument(e.to_string()))?;

        let stmt = Statement::build(self.engine(), &query);
        debug!(table, sql = %stmt.sql, "insert");
        self.execute(&stmt)
    }

    /// Updates the row of `table` identified by `key`.
    ///
    /// # Errors
    /// Driver failures, or [`OrmError::InvalidArgument`] for an empty key.
    fn update(&mut self, table: &str, values: &Row, key: &[(String, Value)]) -> OrmResult<u64> {
        let filter = key_filter(key)?;
        let mut query = Query::update();
        query
            .table(Alias::new(table))
            .values(
                values
                    .iter()
                    .map(|(c, v)| (Alias::new(c), SimpleExpr::Value(to_sea_value(v)))),
            )
            .and_where(filter);

        let stmt = Statement::build(self.engine(), &query);
        debug!(table, key = %describe_pairs(key), sql = %stmt.sql, "update");
        self.execute(&stmt)
    }

    /// Deletes the row of `table` identified by `key`.
    ///
    /// # Errors
    /// Driver failures, or [`OrmError::InvalidArgument`] for an empty key.
    fn delete(&mut self, table: &str, key: &[(String, Value)]) -> OrmResult<u64> {
        let filter = key_filter(key)?;
        let mut query = Query::delete();
        query.from_table(Alias::new(table)).and_where(filter);

        let stmt = Statement::build(self.engine(), &query);
        debug!(table, key = %describe_pairs(key), sql = %stmt.sql, "delete");
        self.execute(&stmt)
    }

    /// # Errors
    /// Any failure reported by the underlying driver.
    fn fetch_one(&mut self, stmt: &Statement) -> OrmResult<Option<Row>> {
        Ok(self.query(stmt)?.into_iter().next())
    }

    /// # Errors
    /// Any failure reported by the underlying driver.
    fn fetch_all(&mut self, stmt: &Statement) -> OrmResult<Vec<Row>> {
        self.query(stmt)
    }

    /// First column of every row.
    ///
    /// # Errors
    /// Any failure reported by the underlying driver.
    fn fetch_column(&mut self, stmt: &Statement) -> OrmResult<Vec<Value>> {
        Ok(self
            .query(stmt)?
            .into_iter()
            .filter_map(|row| row.into_iter().next().map(|(_, v)| v))
            .collect())
    }

    /// First column of the first row.
    ///
    /// # Errors
    /// Any failure reported by the underlying driver.
    fn fetch_scalar(&mut self, stmt: &Statement) -> OrmResult<Option<Value>> {
        Ok(self.fetch_column(stmt)?.into_iter().next())
    }
}

/// Runs `f` inside a transaction on `conn`.
///
/// Commits when `f` succeeds. When `f` fails the transaction is rolled back
/// and the original error returned; a failing rollback is only logged.
///
/// # Errors
/// Returns the error of `begin`, of `f` or of `commit`.
pub fn transaction<T, F>(conn: &mut dyn Connection, f: F) -> OrmResult<T>
where
    F: FnOnce(&mut dyn Connection) -> OrmResult<T>,
{
    conn.begin()?;
    match f(&mut *conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

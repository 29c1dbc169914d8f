//! Many-to-many join table maintenance.

use sea_query::{Alias, ConditionalStatement, Expr, Query};
use tracing::debug;

use crate::connection::{Connection, Statement};
use crate::error::{OrmError, OrmResult};
use crate::value::{Value, to_sea_value};

/// What a [`RelationTable::sync`] changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationDiff {
    pub inserted: Vec<Value>,
    pub deleted: Vec<Value>,
}

impl RelationDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }
}

/// A join table keyed by `(owner_column, foreign_column)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationTable {
    table: String,
    owner_column: String,
    foreign_column: String,
}

fn dedup(values: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

impl RelationTable {
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            owner_column: owner_column.into(),
            foreign_column: foreign_column.into(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Computes the rows to insert and delete, without touching the database.
    #[must_use]
    pub fn diff(existing: &[Value], updated: &[Value]) -> RelationDiff {
        let existing = dedup(existing);
        let updated = dedup(updated);
        RelationDiff {
            inserted: updated
                .iter()
                .filter(|v| !existing.contains(v))
                .cloned()
                .collect(),
            deleted: existing
                .iter()
                .filter(|v| !updated.contains(v))
                .cloned()
                .collect(),
        }
    }

    /// Brings the rows of `owner` from `existing` to `updated`.
    ///
    /// Issues at most one INSERT and one DELETE; identical sets issue nothing.
    ///
    /// # Errors
    /// Connection failures, or [`OrmError::InvalidArgument`] for a null owner.
    pub fn sync(
        &self,
        conn: &mut dyn Connection,
        owner: &Value,
        existing: &[Value],
        updated: &[Value],
    ) -> OrmResult<RelationDiff> {
        if owner.is_null() {
            return Err(OrmError::invalid_argument(format!(
                "relation '{}' needs a non-null owner id",
                self.table
            )));
        }
        let diff = Self::diff(existing, updated);
        let engine = conn.engine();

        if !diff.inserted.is_empty() {
            let mut query = Query::insert();
            query
                .into_table(Alias::new(&self.table))
                .columns([Alias::new(&self.owner_column), Alias::new(&self.foreign_column)]);
            for foreign in &diff.inserted {
                query
                    .values([to_sea_value(owner).into(), to_sea_value(foreign).into()])
                    .map_err(|e| OrmError::invalid_argument(e.to_string()))?;
            }
            conn.execute(&Statement::build(engine, &query))?;
        }

        if !diff.deleted.is_empty() {
            let mut query = Query::delete();
            query
                .from_table(Alias::new(&self.table))
                .and_where(Expr::col(Alias::new(&self.owner_column)).eq(to_sea_value(owner)))
                .and_where(
                    Expr::col(Alias::new(&self.foreign_column))
                        .is_in(diff.deleted.iter().map(to_sea_value)),
                );
            conn.execute(&Statement::build(engine, &query))?;
        }

        debug!(
            table = %self.table,
            owner = %owner,
            inserted = diff.inserted.len(),
            deleted = diff.deleted.len(),
            "relation sync"
        );
        Ok(diff)
    }

    /// Current foreign ids of `owner`.
    ///
    /// # Errors
    /// Connection failures.
    pub fn fetch_ids(&self, conn: &mut dyn Connection, owner: &Value) -> OrmResult<Vec<Value>> {
        let mut query = Query::select();
        query
            .column(Alias::new(&self.foreign_column))
            .from(Alias::new(&self.table))
            .and_where(Expr::col(Alias::new(&self.owner_column)).eq(to_sea_value(owner)));
        conn.fetch_column(&Statement::build(conn.engine(), &query))
    }

    /// Loads the current foreign ids of `owner`, then syncs them to `updated`.
    ///
    /// # Errors
    /// Same as [`RelationTable::sync`].
    pub fn replace(
        &self,
        conn: &mut dyn Connection,
        owner: &Value,
        updated: &[Value],
    ) -> OrmResult<RelationDiff> {
        let existing = self.fetch_ids(conn, owner)?;
        self.sync(conn, owner, &existing, updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbEngine;
    use crate::test_support::{ScriptedConnection, row};
    use serde_json::json;

    fn user_groups() -> RelationTable {
        RelationTable::new("user_groups", "user_id", "group_id")
    }

    #[test]
    fn sync_inserts_and_deletes_the_difference() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let diff = user_groups()
            .sync(
                &mut conn,
                &json!(7),
                &[json!(1), json!(2), json!(3)],
                &[json!(2), json!(3), json!(4)],
            )
            .unwrap();

        assert_eq!(diff.inserted, vec![json!(4)]);
        assert_eq!(diff.deleted, vec![json!(1)]);
        assert_eq!(
            conn.sql_log(),
            vec![
                r#"INSERT INTO "user_groups" ("user_id", "group_id") VALUES (?, ?)"#,
                r#"DELETE FROM "user_groups" WHERE "user_id" = ? AND "group_id" IN (?)"#,
            ]
        );
    }

    #[test]
    fn identical_sets_issue_nothing() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let diff = user_groups()
            .sync(&mut conn, &json!(7), &[json!(1), json!(2)], &[json!(2), json!(1), json!(1)])
            .unwrap();
        assert!(diff.is_empty());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn replace_reads_current_ids_first() {
        let mut conn = ScriptedConnection::new(DbEngine::Postgres);
        conn.push_rows(vec![row(&[("group_id", json!(1))])]);
        let diff = user_groups()
            .replace(&mut conn, &json!(7), &[json!(1), json!(5), json!(6)])
            .unwrap();
        assert_eq!(diff.inserted, vec![json!(5), json!(6)]);
        assert!(diff.deleted.is_empty());

        let log = conn.sql_log();
        assert_eq!(
            log[0],
            r#"SELECT "group_id" FROM "user_groups" WHERE "user_id" = $1"#
        );
        assert_eq!(
            log[1],
            r#"INSERT INTO "user_groups" ("user_id", "group_id") VALUES ($1, $2), ($3, $4)"#
        );
    }

    #[test]
    fn null_owner_is_rejected() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        assert!(user_groups()
            .sync(&mut conn, &Value::Null, &[], &[json!(1)])
            .is_err());
    }
}

//! Load, save, update and delete operations for entities.
//!
//! Every operation borrows the connection for one call. `save`, `update`
//! and `delete` each issue exactly one statement (plus the generated-key
//! read on `save`); transaction scoping is the caller's.

use std::sync::Arc;

use sea_query::{Alias, Asterisk, Cond, Condition, ConditionalStatement, Expr, Query};
use tracing::debug;

use crate::cond::{Conditions, build_condition};
use crate::connection::{Connection, Statement};
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::key::{Identity, PrimaryKey};
use crate::meta::EntityMeta;
use crate::value::{Row, Value, describe_pairs, to_sea_value};

/// What `find` and `exists` look up.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    /// Matched against the scalar primary key.
    Id(Value),
    /// Column (or property) → value; every pair must match.
    Columns(Row),
}

impl From<Value> for Lookup {
    fn from(value: Value) -> Self {
        Lookup::Id(value)
    }
}

impl From<i32> for Lookup {
    fn from(value: i32) -> Self {
        Lookup::Id(Value::from(value))
    }
}

impl From<i64> for Lookup {
    fn from(value: i64) -> Self {
        Lookup::Id(Value::from(value))
    }
}

impl From<u64> for Lookup {
    fn from(value: u64) -> Self {
        Lookup::Id(Value::from(value))
    }
}

impl From<&str> for Lookup {
    fn from(value: &str) -> Self {
        Lookup::Id(Value::from(value))
    }
}

impl From<Row> for Lookup {
    fn from(columns: Row) -> Self {
        Lookup::Columns(columns)
    }
}

impl From<Identity> for Lookup {
    fn from(id: Identity) -> Self {
        match id {
            Identity::Scalar(value) => Lookup::Id(value),
            Identity::Compound(columns) => Lookup::Columns(columns),
        }
    }
}

/// Result of [`Entity::find_all`].
#[derive(Debug)]
pub enum FoundRows {
    Entities(Vec<Entity>),
    Rows(Vec<Row>),
}

impl FoundRows {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            FoundRows::Entities(e) => e.len(),
            FoundRows::Rows(r) => r.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw rows, unwrapping entities back into their data.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            FoundRows::Entities(entities) => {
                entities.into_iter().map(|e| e.data().clone()).collect()
            }
            FoundRows::Rows(rows) => rows,
        }
    }

    /// Wrapped entities; `None` when the rows were fetched unwrapped.
    #[must_use]
    pub fn into_entities(self) -> Option<Vec<Entity>> {
        match self {
            FoundRows::Entities(entities) => Some(entities),
            FoundRows::Rows(_) => None,
        }
    }
}

fn lookup_filter(meta: &EntityMeta, lookup: &Lookup) -> OrmResult<(Condition, String)> {
    match lookup {
        Lookup::Id(value) => {
            let pk = match meta.require_primary_key()? {
                PrimaryKey::Scalar(column) => column,
                PrimaryKey::Compound(_) => {
                    return Err(OrmError::invalid_argument(
                        "scalar lookup on a compound primary key",
                    ));
                }
            };
            let encoded = meta.encode(pk, value.clone())?;
            let cond = Cond::all().add(Expr::col(Alias::new(pk)).eq(to_sea_value(&encoded)));
            Ok((cond, format!("{pk} = {value}")))
        }
        Lookup::Columns(columns) => {
            if columns.is_empty() {
                return Err(OrmError::invalid_argument("empty lookup"));
            }
            let mut cond = Cond::all();
            let mut pairs = Vec::with_capacity(columns.len());
            for (name, value) in columns {
                let column = meta.column_for(name);
                let encoded = meta.encode(column, value.clone())?;
                let expr = Expr::col(Alias::new(column));
                cond = cond.add(if encoded.is_null() {
                    expr.is_null()
                } else {
                    expr.eq(to_sea_value(&encoded))
                });
                pairs.push((column.to_owned(), value.clone()));
            }
            Ok((cond, describe_pairs(&pairs)))
        }
    }
}

fn fetch_lookup(
    conn: &mut dyn Connection,
    meta: &EntityMeta,
    lookup: &Lookup,
) -> OrmResult<Option<Row>> {
    let table = meta.require_table()?;
    let (cond, _) = lookup_filter(meta, lookup)?;
    let mut query = Query::select();
    query
        .column(Asterisk)
        .from(Alias::new(table))
        .cond_where(cond)
        .limit(1);

    let stmt = Statement::build(conn.engine(), &query);
    debug!(table, sql = %stmt.sql, "find");
    conn.fetch_one(&stmt)
}

impl Entity {
    /// Loads the row matching `lookup`, replacing data and snapshot.
    ///
    /// # Errors
    /// - [`OrmError::NotFound`] if no row matches
    /// - [`OrmError::InvalidArgument`] for a scalar lookup on a compound key,
    ///   or an empty column lookup
    /// - connection failures
    pub fn find(&mut self, conn: &mut dyn Connection, lookup: impl Into<Lookup>) -> OrmResult<()> {
        let meta = Arc::clone(self.meta());
        let lookup = lookup.into();
        match fetch_lookup(conn, &meta, &lookup)? {
            Some(row) => {
                self.set_data(row);
                Ok(())
            }
            None => {
                let (_, described) = lookup_filter(&meta, &lookup)?;
                Err(OrmError::not_found(meta.table(), described))
            }
        }
    }

    /// Creates an entity of type `meta` loaded from the row matching `lookup`.
    ///
    /// # Errors
    /// Same as [`Entity::find`].
    pub fn load(
        conn: &mut dyn Connection,
        meta: &Arc<EntityMeta>,
        lookup: impl Into<Lookup>,
    ) -> OrmResult<Self> {
        let mut entity = Entity::new(meta);
        entity.find(conn, lookup)?;
        Ok(entity)
    }

    /// Whether a row matches `lookup`.
    ///
    /// Only "no matching row" maps to `false`; every other failure propagates.
    ///
    /// # Errors
    /// Same as [`Entity::find`], except that a missing row is `Ok(false)`.
    pub fn exists(&self, conn: &mut dyn Connection, lookup: impl Into<Lookup>) -> OrmResult<bool> {
        let lookup = lookup.into();
        Ok(fetch_lookup(conn, self.meta(), &lookup)?.is_some())
    }

    /// Re-reads this entity's own row.
    ///
    /// # Errors
    /// Key errors if the identity is incomplete, then same as [`Entity::find`].
    pub fn reload(&mut self, conn: &mut dyn Connection) -> OrmResult<()> {
        let lookup = Lookup::from(self.get_id()?);
        self.find(conn, lookup)
    }

    /// Loads every row of `meta`'s table matching `conds`.
    ///
    /// # Errors
    /// Condition compilation and connection failures.
    pub fn find_all(
        conn: &mut dyn Connection,
        meta: &Arc<EntityMeta>,
        conds: &Conditions,
        wrap: bool,
    ) -> OrmResult<FoundRows> {
        let table = meta.require_table()?;
        let mut query = Query::select();
        query.column(Asterisk).from(Alias::new(table));
        let filter = build_condition(meta, None, conds)?;
        if !filter.is_empty() {
            query.cond_where(filter);
        }

        let stmt = Statement::build(conn.engine(), &query);
        debug!(table, sql = %stmt.sql, "find_all");
        let rows = conn.fetch_all(&stmt)?;

        Ok(if wrap {
            FoundRows::Entities(rows.into_iter().map(|r| Entity::from_row(meta, r)).collect())
        } else {
            FoundRows::Rows(rows)
        })
    }

    /// Inserts this entity as a new row.
    ///
    /// Tracked timestamps are filled in unless already set. A scalar key that
    /// is still absent after the insert is read back from the connection.
    ///
    /// # Errors
    /// - [`OrmError::KeyAlreadySet`] if the scalar key is already present
    /// - configuration and connection failures
    pub fn save(&mut self, conn: &mut dyn Connection) -> OrmResult<()> {
        let meta = Arc::clone(self.meta());
        let table = meta.require_table()?;
        let pk = meta.require_primary_key()?;

        if let PrimaryKey::Scalar(column) = pk {
            if self.data().contains_key(column) {
                return Err(OrmError::KeyAlreadySet {
                    column: column.clone(),
                });
            }
        }

        if let Some(ts) = meta.timestamps() {
            let now = meta.codec().now();
            for column in [&ts.created, &ts.updated] {
                self.data_mut()
                    .entry(column.clone())
                    .or_insert_with(|| now.clone());
            }
        }

        conn.insert(table, self.data())?;

        if let PrimaryKey::Scalar(column) = pk {
            if !self.data().contains_key(column) {
                let id = conn.last_insert_id(meta.sequence())?;
                debug!(table, id = %id, "generated key");
                self.data_mut().insert(column.clone(), id);
            }
        }

        self.snapshot();
        Ok(())
    }

    /// Writes changed non-key columns back to this entity's row.
    ///
    /// Returns `false` without issuing a statement when nothing changed.
    ///
    /// # Errors
    /// Key errors if the identity is incomplete, configuration and connection failures.
    pub fn update(&mut self, conn: &mut dyn Connection) -> OrmResult<bool> {
        let mut changes = self.changes();
        if changes.is_empty() {
            return Ok(false);
        }

        let meta = Arc::clone(self.meta());
        let table = meta.require_table()?;
        let key = self.where_clause()?;

        if let Some(ts) = meta.timestamps() {
            let now = meta.codec().now();
            changes.insert(ts.updated.clone(), now.clone());
            self.data_mut().insert(ts.updated.clone(), now);
        }

        conn.update(table, &changes, &key)?;
        self.snapshot();
        Ok(true)
    }

    /// Deletes this entity's row, returning the affected-row count.
    ///
    /// Local data is left untouched.
    ///
    /// # Errors
    /// Key errors if the identity is incomplete, configuration and connection failures.
    pub fn delete(&self, conn: &mut dyn Connection) -> OrmResult<u64> {
        let table = self.meta().require_table()?;
        let key = self.where_clause()?;
        conn.delete(table, &key)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::DbEngine;
    use crate::test_support::{ScriptedConnection, row};
    use serde_json::json;

    fn users() -> Arc<EntityMeta> {
        EntityMeta::builder("users")
            .primary_key("id")
            .field("first_name", "firstName")
            .build()
            .unwrap()
    }

    fn posts() -> Arc<EntityMeta> {
        EntityMeta::builder("posts")
            .primary_key("id")
            .sequence("posts_id_seq")
            .track_timestamps()
            .build()
            .unwrap()
    }

    fn memberships() -> Arc<EntityMeta> {
        EntityMeta::builder("memberships")
            .compound_key(["user_id", "group_id"])
            .build()
            .unwrap()
    }

    #[test]
    fn update_without_changes_issues_nothing() {
        let mut conn = ScriptedConnection::new(DbEngine::Postgres);
        let mut user = Entity::from_row(&users(), row(&[("id", json!(1)), ("first_name", json!("Ada"))]));
        assert!(!user.update(&mut conn).unwrap());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn update_touches_only_the_changed_column() {
        let mut conn = ScriptedConnection::new(DbEngine::Postgres);
        let mut user = Entity::from_row(
            &users(),
            row(&[("id", json!(1)), ("first_name", json!("Ada")), ("age", json!(36))]),
        );
        user.set("firstName", "Grace").unwrap();

        assert!(user.update(&mut conn).unwrap());
        assert_eq!(
            conn.sql_log(),
            vec![r#"UPDATE "users" SET "first_name" = $1 WHERE "id" = $2"#]
        );
        assert!(!user.is_dirty());
        assert!(!user.update(&mut conn).unwrap());
        assert_eq!(conn.statements().len(), 1);
    }

    #[test]
    fn update_refreshes_the_updated_timestamp() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let mut post = Entity::from_row(
            &posts(),
            row(&[
                ("id", json!(4)),
                ("title", json!("a")),
                ("updated", json!("2000-01-01 00:00:00")),
            ]),
        );
        post.set("title", "b").unwrap();
        assert!(post.update(&mut conn).unwrap());

        let sql = &conn.sql_log()[0];
        assert!(sql.contains(r#""title" = ?"#), "{sql}");
        assert!(sql.contains(r#""updated" = ?"#), "{sql}");
        assert_ne!(post.data()["updated"], json!("2000-01-01 00:00:00"));
    }

    #[test]
    fn save_reads_the_generated_key_and_fills_timestamps() {
        let mut conn = ScriptedConnection::new(DbEngine::Postgres).with_next_id(json!(42));
        let mut post = Entity::new(&posts());
        post.set("title", "hello").unwrap();
        post.save(&mut conn).unwrap();

        assert_eq!(post.id_value().unwrap(), json!(42));
        assert_eq!(conn.id_reads, vec![Some("posts_id_seq".to_owned())]);
        assert!(post.data().contains_key("created"));
        assert!(post.data().contains_key("updated"));
        assert!(!post.is_dirty());

        let sql = &conn.sql_log()[0];
        assert!(sql.starts_with(r#"INSERT INTO "posts" ("title", "created", "updated")"#), "{sql}");
    }

    #[test]
    fn save_with_a_present_key_is_illegal() {
        let mut conn = ScriptedConnection::new(DbEngine::Postgres);
        let mut user = Entity::new(&users());
        user.set_id(json!(3)).unwrap();
        let err = user.save(&mut conn).unwrap_err();
        assert!(matches!(err, OrmError::KeyAlreadySet { .. }));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn save_with_compound_key_skips_the_id_read() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let mut m = Entity::new(&memberships());
        m.set("user_id", 1).unwrap();
        m.set("group_id", 2).unwrap();
        m.save(&mut conn).unwrap();
        assert!(conn.id_reads.is_empty());
        assert_eq!(conn.statements().len(), 1);
    }

    #[test]
    fn find_missing_row_is_not_found_and_exists_is_false() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let mut user = Entity::new(&users());
        let err = user.find(&mut conn, 99).unwrap_err();
        assert!(err.is_not_found());
        assert!(!user.exists(&mut conn, 99).unwrap());
    }

    #[test]
    fn find_replaces_data_and_snapshot() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        conn.push_rows(vec![row(&[("id", json!(1)), ("first_name", json!("Ada"))])]);
        let user = Entity::load(&mut conn, &users(), 1).unwrap();
        assert_eq!(user.get("firstName").unwrap(), json!("Ada"));
        assert_eq!(user.original(), user.data());
        assert!(conn.sql_log()[0].contains(r#"WHERE "id" = ?"#));
    }

    #[test]
    fn lookup_shapes_are_validated() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let mut m = Entity::new(&memberships());
        let err = m.find(&mut conn, 1).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);

        let err = m.find(&mut conn, Row::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        let err = m.exists(&mut conn, 1).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert!(conn.statements().is_empty());

        conn.push_rows(vec![row(&[("user_id", json!(1)), ("group_id", json!(2))])]);
        m.find(&mut conn, row(&[("user_id", json!(1)), ("group_id", json!(2))]))
            .unwrap();
        assert!(m.has_id());
    }

    #[test]
    fn reload_uses_the_compound_identity() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        let mut m = Entity::from_row(
            &memberships(),
            row(&[("user_id", json!(1)), ("group_id", json!(2)), ("role", json!("x"))]),
        );
        m.set("role", "y").unwrap();
        conn.push_rows(vec![row(&[
            ("user_id", json!(1)),
            ("group_id", json!(2)),
            ("role", json!("x")),
        ])]);
        m.reload(&mut conn).unwrap();
        assert_eq!(m.get("role").unwrap(), json!("x"));
        let sql = &conn.sql_log()[0];
        assert!(sql.contains(r#""user_id" = ? AND "group_id" = ?"#), "{sql}");
    }

    #[test]
    fn delete_keeps_local_state() {
        let mut conn = ScriptedConnection::new(DbEngine::MySql);
        let user = Entity::from_row(&users(), row(&[("id", json!(5))]));
        assert_eq!(user.delete(&mut conn).unwrap(), 1);
        assert_eq!(conn.sql_log(), vec!["DELETE FROM `users` WHERE `id` = ?"]);
        assert_eq!(user.id_value().unwrap(), json!(5));
    }

    #[test]
    fn find_all_compiles_conditions() {
        let mut conn = ScriptedConnection::new(DbEngine::Sqlite);
        conn.push_rows(vec![row(&[("id", json!(1))]), row(&[("id", json!(2))])]);
        let found = Entity::find_all(
            &mut conn,
            &users(),
            &Conditions::new().ids([1, 2, 3]).is_null("status"),
            true,
        )
        .unwrap();
        assert_eq!(found.len(), 2);
        let sql = &conn.sql_log()[0];
        assert!(sql.contains(r#""status" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""id" IN (?, ?, ?)"#), "{sql}");
        assert_eq!(found.into_entities().unwrap()[1].id_value().unwrap(), json!(2));
    }

    #[test]
    fn find_all_without_conditions_has_no_where() {
        let mut conn = ScriptedConnection::new(DbEngine::Postgres);
        let found = Entity::find_all(&mut conn, &users(), &Conditions::new(), false).unwrap();
        assert!(found.is_empty());
        assert_eq!(conn.sql_log(), vec![r#"SELECT * FROM "users""#]);
    }
}

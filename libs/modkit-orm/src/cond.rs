//! Condition DSL shared by `find_all` and search.
//!
//! A [`Conditions`] value is an ordered list of `(key, value)` entries.
//! Positional keys address the primary key, named keys address columns:
//!
//! | key    | value          | clause                          |
//! |--------|----------------|---------------------------------|
//! | index  | scalar         | OR-group: `pk = value`          |
//! | index  | list           | OR-group: `pk IN (...)`         |
//! | index  | raw fragment   | AND fragment, verbatim          |
//! | column | non-empty list | AND `column IN (...)`           |
//! | column | empty list     | AND never-true                  |
//! | column | null           | AND `column IS NULL`            |
//! | column | scalar         | AND `column = value`            |
//!
//! The OR-group of primary-key matches is ANDed with the column clauses.

use indexmap::IndexMap;
use sea_query::{Alias, Cond, Condition, Expr};
use serde::{Deserialize, Deserializer};

use crate::error::{OrmError, OrmResult};
use crate::meta::EntityMeta;
use crate::value::{RawSql, Value, to_sea_value};

/// Key of one condition entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CondKey {
    /// Positional entry; addresses the primary key.
    Index(usize),
    /// Property or column name, optionally `table.column`.
    Column(String),
}

/// Value of one condition entry.
#[derive(Clone, Debug, PartialEq)]
pub enum CondValue {
    Scalar(Value),
    List(Vec<Value>),
    Null,
    Raw(RawSql),
}

impl From<Value> for CondValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CondValue::Null,
            Value::Array(items) => CondValue::List(items),
            other => CondValue::Scalar(other),
        }
    }
}

impl From<RawSql> for CondValue {
    fn from(sql: RawSql) -> Self {
        CondValue::Raw(sql)
    }
}

/// Ordered condition entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<(CondKey, CondValue)>,
    next_index: usize,
}

impl Conditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, key: CondKey, value: impl Into<CondValue>) -> Self {
        if let CondKey::Index(n) = key {
            self.next_index = self.next_index.max(n.saturating_add(1));
        }
        self.entries.push((key, value.into()));
        self
    }

    fn positional(self, value: CondValue) -> Self {
        let key = CondKey::Index(self.next_index);
        self.push(key, value)
    }

    /// Matches the primary key against one value (ORed with other id entries).
    #[must_use]
    pub fn id(self, value: impl Into<Value>) -> Self {
        self.positional(CondValue::Scalar(value.into()))
    }

    /// Matches the primary key against a list (ORed with other id entries).
    #[must_use]
    pub fn ids<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.positional(CondValue::List(values.into_iter().map(Into::into).collect()))
    }

    /// Adds a trusted SQL fragment, ANDed with everything else.
    #[must_use]
    pub fn raw(self, sql: RawSql) -> Self {
        self.positional(CondValue::Raw(sql))
    }

    /// `column = value`, or `column IS NULL` for a null value.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(CondKey::Column(column.into()), value.into())
    }

    #[must_use]
    pub fn is_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            CondKey::Column(column.into()),
            CondValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    #[must_use]
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.push(CondKey::Column(column.into()), CondValue::Null)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(CondKey, CondValue)> {
        self.entries.iter()
    }

    /// Builds conditions from a JSON-style map: integer keys are positional,
    /// arrays are lists, `null` is null.
    ///
    /// # Errors
    /// Returns [`OrmError::InvalidArgument`] for object values.
    pub fn from_map(map: IndexMap<String, Value>) -> OrmResult<Self> {
        let mut conds = Self::new();
        for (key, value) in map {
            if value.is_object() {
                return Err(OrmError::invalid_argument(format!(
                    "condition '{key}' has an object value"
                )));
            }
            let key = match key.parse::<usize>() {
                Ok(n) => CondKey::Index(n),
                Err(_) => CondKey::Column(key),
            };
            conds = conds.push(key, value);
        }
        Ok(conds)
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = IndexMap::<String, Value>::deserialize(deserializer)?;
        Conditions::from_map(map).map_err(serde::de::Error::custom)
    }
}

fn never() -> Condition {
    Cond::all().add(Expr::value(false))
}

/// Column expression, qualified with `alias` unless the name is already `table.column`.
pub(crate) fn column_expr(alias: Option<&str>, column: &str) -> Expr {
    match (column.split_once('.'), alias) {
        (Some((table, column)), _) => Expr::col((Alias::new(table), Alias::new(column))),
        (None, Some(alias)) if !alias.is_empty() => {
            Expr::col((Alias::new(alias), Alias::new(column)))
        }
        (None, _) => Expr::col(Alias::new(column)),
    }
}

fn encode_all(meta: &EntityMeta, column: &str, values: &[Value]) -> OrmResult<Vec<sea_query::Value>> {
    values
        .iter()
        .map(|v| meta.encode(column, v.clone()).map(|e| to_sea_value(&e)))
        .collect()
}

/// Compiles `conds` against `meta` into a `sea-query` condition.
///
/// # Errors
/// - [`OrmError::InvalidArgument`] for a positional null or a named raw fragment
/// - key configuration errors when positional entries are used without a scalar key
/// - codec errors from encoding values
pub fn build_condition(
    meta: &EntityMeta,
    alias: Option<&str>,
    conds: &Conditions,
) -> OrmResult<Condition> {
    let mut ids = Cond::any();
    let mut has_ids = false;
    let mut all = Cond::all();

    for (key, value) in conds.iter() {
        match (key, value) {
            (CondKey::Index(_), CondValue::Scalar(v)) => {
                let pk = meta.scalar_key()?;
                let encoded = meta.encode(pk, v.clone())?;
                ids = ids.add(column_expr(alias, pk).eq(to_sea_value(&encoded)));
                has_ids = true;
            }
            (CondKey::Index(_), CondValue::List(values)) => {
                let pk = meta.scalar_key()?;
                ids = if values.is_empty() {
                    ids.add(never())
                } else {
                    ids.add(column_expr(alias, pk).is_in(encode_all(meta, pk, values)?))
                };
                has_ids = true;
            }
            (CondKey::Index(_), CondValue::Raw(sql)) => {
                if !sql.is_empty() {
                    all = all.add(Expr::cust(sql.as_str()));
                }
            }
            (CondKey::Index(n), CondValue::Null) => {
                return Err(OrmError::invalid_argument(format!(
                    "positional condition {n} cannot be null"
                )));
            }
            (CondKey::Column(name), CondValue::Raw(_)) => {
                return Err(OrmError::invalid_argument(format!(
                    "raw SQL is only accepted positionally, got it for '{name}'"
                )));
            }
            (CondKey::Column(name), CondValue::List(values)) => {
                if values.is_empty() {
                    all = all.add(never());
                } else {
                    let column = meta.column_for(name);
                    all = all.add(column_expr(alias, column).is_in(encode_all(meta, column, values)?));
                }
            }
            (CondKey::Column(name), CondValue::Null) => {
                all = all.add(column_expr(alias, meta.column_for(name)).is_null());
            }
            (CondKey::Column(name), CondValue::Scalar(v)) => {
                let column = meta.column_for(name);
                let encoded = meta.encode(column, v.clone())?;
                all = all.add(column_expr(alias, column).eq(to_sea_value(&encoded)));
            }
        }
    }

    if has_ids {
        all = all.add(ids);
    }
    Ok(all)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::format::ColumnFormat;
    use sea_query::{
        Asterisk, ConditionalStatement, PostgresQueryBuilder, Query, QueryStatementWriter,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn users() -> Arc<EntityMeta> {
        EntityMeta::builder("users")
            .primary_key("id")
            .field("is_admin", "isAdmin")
            .format("is_admin", ColumnFormat::Bool)
            .build()
            .unwrap()
    }

    fn render(conds: &Conditions) -> String {
        let cond = build_condition(&users(), None, conds).unwrap();
        Query::select()
            .column(Asterisk)
            .from(Alias::new("users"))
            .cond_where(cond)
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn positional_list_matches_the_primary_key() {
        let sql = render(&Conditions::new().ids([1, 2, 3]));
        assert_eq!(sql, r#"SELECT * FROM "users" WHERE "id" IN (1, 2, 3)"#);
    }

    #[test]
    fn null_and_list_columns() {
        let sql = render(&Conditions::new().is_null("status").is_in("tags", ["a", "b"]));
        assert!(sql.contains(r#""status" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""tags" IN ('a', 'b')"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn positional_entries_are_ored_then_anded_with_columns() {
        let sql = render(&Conditions::new().id(1).id(5).eq("status", "active"));
        assert!(sql.contains(r#""status" = 'active'"#), "{sql}");
        assert!(sql.contains(r#"("id" = 1 OR "id" = 5)"#), "{sql}");
    }

    #[test]
    fn scalar_values_are_encoded_per_column() {
        let sql = render(&Conditions::new().eq("isAdmin", true));
        assert!(sql.contains(r#""is_admin" = 1"#), "{sql}");
    }

    #[test]
    fn raw_fragments_are_positional_only() {
        let sql = render(&Conditions::new().raw(RawSql::trusted("age > 18")));
        assert!(sql.ends_with("WHERE age > 18"), "{sql}");

        let bad = Conditions::new().push(
            CondKey::Column("age".to_owned()),
            RawSql::trusted("> 18"),
        );
        assert!(build_condition(&users(), None, &bad).is_err());

        let null_id = Conditions::new().push(CondKey::Index(0), Value::Null);
        assert!(build_condition(&users(), None, &null_id).is_err());
    }

    #[test]
    fn empty_column_list_never_matches() {
        let sql = render(&Conditions::new().is_in("tags", Vec::<Value>::new()));
        assert!(sql.contains("FALSE"), "{sql}");
    }

    #[test]
    fn alias_qualifies_plain_columns_only() {
        let cond = build_condition(
            &users(),
            Some("u"),
            &Conditions::new().eq("name", "x").eq("g.title", "y"),
        )
        .unwrap();
        let sql = Query::select()
            .column(Asterisk)
            .from(Alias::new("users"))
            .cond_where(cond)
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""u"."name" = 'x'"#), "{sql}");
        assert!(sql.contains(r#""g"."title" = 'y'"#), "{sql}");
    }

    #[test]
    fn deserializes_from_a_json_object() {
        let conds: Conditions =
            serde_json::from_value(json!({"0": [1, 2], "status": null, "name": "x"})).unwrap();
        let entries: Vec<_> = conds.iter().cloned().collect();
        assert_eq!(
            entries,
            vec![
                (CondKey::Index(0), CondValue::List(vec![json!(1), json!(2)])),
                (CondKey::Column("status".to_owned()), CondValue::Null),
                (CondKey::Column("name".to_owned()), CondValue::Scalar(json!("x"))),
            ]
        );

        let err = serde_json::from_value::<Conditions>(json!({"meta": {"a": 1}}));
        assert!(err.is_err());
    }

    #[test]
    fn largest_positional_index_does_not_overflow() {
        let mut map = serde_json::Map::new();
        map.insert(usize::MAX.to_string(), json!(1));
        let conds: Conditions = serde_json::from_value(Value::Object(map)).unwrap();
        let conds = conds.id(2);
        let keys: Vec<_> = conds.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![CondKey::Index(usize::MAX), CondKey::Index(usize::MAX)]);
        let sql = render(&conds);
        assert!(sql.contains(r#""id" = 1 OR "id" = 2"#), "{sql}");
    }
}

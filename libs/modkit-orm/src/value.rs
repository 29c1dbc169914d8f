//! Raw column values, rows and trusted SQL fragments.

use std::fmt;

use indexmap::IndexMap;

/// Raw column value as stored in an entity or returned by a connection.
///
/// Comparison is exact: `1`, `1.0`, `"1"` and `true` are all different values.
pub use serde_json::Value;

/// One result row (or entity data set): column name → raw value, in column order.
pub type Row = IndexMap<String, Value>;

/// A trusted, caller-authored SQL fragment.
///
/// Fragments are inserted into generated SQL verbatim. They exist for the
/// positional raw condition, join `ON` expressions, join extra selects and
/// the search `sql_filter`. Never build one from user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSql(String);

impl RawSql {
    /// Marks `sql` as a trusted fragment.
    pub fn trusted(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RawSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts a raw value into a bindable `sea-query` value.
///
/// Arrays and objects are bound as their JSON text.
pub(crate) fn to_sea_value(value: &Value) -> sea_query::Value {
    match value {
        Value::Null => sea_query::Value::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else if let Some(u) = n.as_u64() {
                u.into()
            } else {
                n.as_f64()
                    .map_or(sea_query::Value::Double(None), sea_query::Value::from)
            }
        }
        Value::String(s) => s.clone().into(),
        Value::Array(_) | Value::Object(_) => value.to_string().into(),
    }
}

/// Reads a non-negative integer out of a scalar result (numbers or numeric text).
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(f64_to_u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u64(f: f64) -> u64 {
    f as u64
}

/// Short human-readable rendering used in error messages and logs.
pub(crate) fn describe_pairs(pairs: &[(String, Value)]) -> String {
    pairs
        .iter()
        .map(|(column, value)| format!("{column} = {value}"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

//! Primary-key shapes and entity identities.

use serde::Serialize;

use crate::error::{OrmError, OrmResult};
use crate::value::{Row, Value};

/// How an entity type identifies its rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimaryKey {
    Scalar(String),
    Compound(Vec<String>),
}

impl PrimaryKey {
    /// Key columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            PrimaryKey::Scalar(column) => std::slice::from_ref(column),
            PrimaryKey::Compound(columns) => columns,
        }
    }

    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, PrimaryKey::Compound(_))
    }

    /// Column reported in search results: the scalar key, or empty for compound keys.
    #[must_use]
    pub fn result_column(&self) -> &str {
        match self {
            PrimaryKey::Scalar(column) => column,
            PrimaryKey::Compound(_) => "",
        }
    }
}

/// The identity of one entity instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Identity {
    Scalar(Value),
    Compound(Row),
}

impl Identity {
    /// Scalar value of this identity.
    ///
    /// # Errors
    /// Returns [`OrmError::CompoundKeyAsScalar`] for compound identities.
    pub fn as_scalar(&self) -> OrmResult<&Value> {
        match self {
            Identity::Scalar(value) => Ok(value),
            Identity::Compound(_) => Err(OrmError::CompoundKeyAsScalar),
        }
    }

    /// `(column, value)` pairs for `key`, in key order.
    #[must_use]
    pub fn pairs(&self, key: &PrimaryKey) -> Vec<(String, Value)> {
        match (self, key) {
            (Identity::Scalar(value), PrimaryKey::Scalar(column)) => {
                vec![(column.clone(), value.clone())]
            }
            (Identity::Compound(values), _) => key
                .columns()
                .iter()
                .filter_map(|c| values.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
            (Identity::Scalar(_), PrimaryKey::Compound(_)) => Vec::new(),
        }
    }
}

impl From<Value> for Identity {
    fn from(value: Value) -> Self {
        Identity::Scalar(value)
    }
}

impl From<Row> for Identity {
    fn from(values: Row) -> Self {
        Identity::Compound(values)
    }
}

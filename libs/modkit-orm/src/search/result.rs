use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::value::{Row, Value};

/// Rows returned by a search, in the shape the parameters asked for.
#[derive(Debug)]
pub enum SearchRows {
    Entities(Vec<Entity>),
    Rows(Vec<Row>),
    Ids(Vec<Value>),
}

impl SearchRows {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            SearchRows::Entities(e) => e.len(),
            SearchRows::Rows(r) => r.len(),
            SearchRows::Ids(i) => i.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One page of search results plus the metadata needed to render it.
#[derive(Debug)]
pub struct SearchResult {
    pub(crate) rows: SearchRows,
    pub(crate) order: Vec<String>,
    pub(crate) count: u64,
    pub(crate) offset: u64,
    pub(crate) total: Option<u64>,
    pub(crate) filter_sql: String,
    pub(crate) sql: String,
    pub(crate) primary_key: String,
    pub(crate) table_alias: String,
}

impl SearchResult {
    #[must_use]
    pub fn rows(&self) -> &SearchRows {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> SearchRows {
        self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Requested page size.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total matching rows; `None` when totals were not requested.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// SQL of the filtered result query before `sql_filter` and pagination.
    #[must_use]
    pub fn filter_sql(&self) -> &str {
        &self.filter_sql
    }

    /// SQL of the executed result query.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Scalar primary-key column, empty for compound keys.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    /// Wraps the rows into typed models.
    ///
    /// # Errors
    /// Returns [`OrmError::InvalidArgument`] for an `ids_only` result.
    pub fn into_models<M: Model>(self) -> OrmResult<Vec<M>> {
        match self.rows {
            SearchRows::Entities(entities) => Ok(entities.into_iter().map(M::from_entity).collect()),
            SearchRows::Rows(rows) => {
                let meta = M::meta();
                Ok(rows
                    .into_iter()
                    .map(|row| M::from_entity(Entity::from_row(&meta, row)))
                    .collect())
            }
            SearchRows::Ids(_) => Err(OrmError::invalid_argument(
                "an ids-only search result cannot be wrapped into models",
            )),
        }
    }
}

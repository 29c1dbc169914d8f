use serde::{Deserialize, Deserializer};

use crate::config::OrmConfig;
use crate::cond::Conditions;
use crate::value::{RawSql, Value};

/// Page size used when neither the caller nor the configuration sets one.
pub const DEFAULT_COUNT: u64 = 20;

/// An inner or left join added to both the result and the count query.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: RawSql,
    /// Extra projection added to the result query (never in `ids_only` mode).
    pub select: Option<RawSql>,
}

impl Join {
    pub fn new(table: impl Into<String>, alias: impl Into<String>, on: RawSql) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            on,
            select: None,
        }
    }

    #[must_use]
    pub fn select(mut self, select: RawSql) -> Self {
        self.select = Some(select);
        self
    }
}

/// Parameters of one search call.
///
/// Deserializes with every key optional; unknown keys are ignored. The raw
/// SQL parts (`join`, `left_join`, `sql_filter`) can only be set through the
/// builder methods.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Table to search; defaults to the entity's table.
    pub table: Option<String>,
    /// Alias for the searched table; defaults to its first character.
    pub table_alias: Option<String>,
    pub cond: Conditions,
    /// Page size; `0` disables pagination.
    pub count: u64,
    pub offset: u64,
    pub count_total: bool,
    #[serde(skip)]
    pub join: Vec<Join>,
    #[serde(skip)]
    pub left_join: Vec<Join>,
    /// Projected columns; empty selects `alias.*`.
    #[serde(deserialize_with = "comma_list")]
    pub columns: Vec<String>,
    /// `column [ASC|DESC]` tokens.
    #[serde(deserialize_with = "comma_list")]
    pub order: Vec<String>,
    #[serde(deserialize_with = "comma_list")]
    pub group: Vec<String>,
    pub wrap: bool,
    pub ids_only: bool,
    #[serde(skip)]
    pub sql_filter: Option<RawSql>,
    pub id_filter: Vec<Value>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            table: None,
            table_alias: None,
            cond: Conditions::default(),
            count: DEFAULT_COUNT,
            offset: 0,
            count_total: true,
            join: Vec::new(),
            left_join: Vec::new(),
            columns: Vec::new(),
            order: Vec::new(),
            group: Vec::new(),
            wrap: true,
            ids_only: false,
            sql_filter: None,
            id_filter: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Text(String),
    List(Vec<String>),
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn comma_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Text(text)) => split_list(&text),
        Some(OneOrMany::List(items)) => items
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

impl SearchParams {
    /// Defaults taken from the `search` section of `config`.
    #[must_use]
    pub fn from_config(config: &OrmConfig) -> Self {
        Self {
            count: config.search.default_count,
            count_total: config.search.count_total,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.table_alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn cond(mut self, cond: Conditions) -> Self {
        self.cond = cond;
        self
    }

    #[must_use]
    pub fn count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn count_total(mut self, count_total: bool) -> Self {
        self.count_total = count_total;
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.join.push(join);
        self
    }

    #[must_use]
    pub fn left_join(mut self, join: Join) -> Self {
        self.left_join.push(join);
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the ordering from a comma-separated list such as `"name DESC, id"`.
    #[must_use]
    pub fn order(mut self, order: &str) -> Self {
        self.order = split_list(order);
        self
    }

    #[must_use]
    pub fn group<I, S>(mut self, group: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group = group.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    #[must_use]
    pub fn ids_only(mut self, ids_only: bool) -> Self {
        self.ids_only = ids_only;
        self
    }

    #[must_use]
    pub fn sql_filter(mut self, filter: RawSql) -> Self {
        self.sql_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn id_filter<I, V>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.id_filter = ids.into_iter().map(Into::into).collect();
        self
    }
}

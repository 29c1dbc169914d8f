//! Paginated, counted search over one entity table.
//!
//! The search builds a filtered query once and forks it: the result query
//! gets the projection, extra join selects, pagination and ordering; the
//! count query keeps only filters and joins. The count query runs only when
//! the page itself cannot tell the total:
//! - a short first page (or an unpaginated search) is its own total
//! - grouped searches on `MySQL` read `FOUND_ROWS()` after `SQL_CALC_FOUND_ROWS`
//! - otherwise `COUNT(1)` runs over the count query

mod params;
mod result;

use std::sync::Arc;

use anyhow::anyhow;
use sea_query::{
    Alias, ConditionalStatement, Expr, JoinType, Order, OrderedStatement, Query, SelectStatement,
    SimpleExpr,
};
use tracing::debug;

use crate::cond::{build_condition, column_expr};
use crate::connection::{Connection, Statement};
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::meta::EntityMeta;
use crate::value::{Row, Value, to_sea_value, value_as_u64};

pub use params::{DEFAULT_COUNT, Join, SearchParams};
pub use result::{SearchResult, SearchRows};

const CALC_FOUND_ROWS: &str = "SQL_CALC_FOUND_ROWS";

/// Splits an order token into its column and direction.
fn parse_order(token: &str) -> OrmResult<(&str, Order)> {
    let mut parts = token.split_whitespace();
    let column = parts
        .next()
        .ok_or_else(|| OrmError::invalid_argument("empty order token"))?;
    let order = match parts.next() {
        None => Order::Asc,
        Some(dir) if dir.eq_ignore_ascii_case("asc") => Order::Asc,
        Some(dir) if dir.eq_ignore_ascii_case("desc") => Order::Desc,
        Some(dir) => {
            return Err(OrmError::invalid_argument(format!(
                "invalid order direction '{dir}' in '{token}'"
            )));
        }
    };
    if parts.next().is_some() {
        return Err(OrmError::invalid_argument(format!(
            "invalid order token '{token}'"
        )));
    }
    Ok((column, order))
}

fn with_found_rows(sql: &str) -> String {
    sql.replacen("SELECT ", &format!("SELECT {CALC_FOUND_ROWS} "), 1)
}

fn add_join(query: &mut SelectStatement, kind: JoinType, join: &Join) {
    query.join_as(
        kind,
        Alias::new(&join.table),
        Alias::new(&join.alias),
        Expr::cust(join.on.as_str()),
    );
}

/// Runs a search for entities described by `meta`.
///
/// # Errors
/// - [`OrmError::InvalidArgument`] for bad order tokens or condition entries
/// - key errors for `ids_only` / `id_filter` without a scalar key
/// - connection failures
#[allow(clippy::too_many_lines)]
pub fn search(
    conn: &mut dyn Connection,
    meta: &Arc<EntityMeta>,
    params: &SearchParams,
) -> OrmResult<SearchResult> {
    let engine = conn.engine();
    let table = match &params.table {
        Some(table) => table.clone(),
        None => meta.require_table()?.to_owned(),
    };
    let alias = params
        .table_alias
        .clone()
        .unwrap_or_else(|| EntityMeta::default_alias(&table));
    let qualifier = Some(alias.as_str());

    let mut query = Query::select();
    query.from_as(Alias::new(&table), Alias::new(&alias));
    let filter = build_condition(meta, qualifier, &params.cond)?;
    if !filter.is_empty() {
        query.cond_where(filter);
    }

    if !params.id_filter.is_empty() {
        let pk = meta.scalar_key()?;
        let ids = params
            .id_filter
            .iter()
            .map(|id| meta.encode(pk, id.clone()).map(|v| to_sea_value(&v)))
            .collect::<OrmResult<Vec<_>>>()?;
        query.and_where(column_expr(qualifier, pk).is_in(ids));
    }

    if !params.group.is_empty() {
        query.add_group_by(
            params
                .group
                .iter()
                .map(|g| SimpleExpr::from(column_expr(qualifier, meta.column_for(g)))),
        );
    }

    let mut count_query = query.clone();

    if params.ids_only {
        let pk = meta.scalar_key()?;
        query.expr_as(column_expr(qualifier, pk), Alias::new("id"));
    } else if params.columns.is_empty() {
        query.expr(Expr::table_asterisk(Alias::new(&alias)));
    } else {
        for column in &params.columns {
            query.expr(column_expr(qualifier, meta.column_for(column)));
        }
    }

    for (kind, joins) in [
        (JoinType::InnerJoin, &params.join),
        (JoinType::LeftJoin, &params.left_join),
    ] {
        for join in joins {
            add_join(&mut query, kind, join);
            add_join(&mut count_query, kind, join);
            if let Some(select) = join.select.as_ref().filter(|_| !params.ids_only) {
                query.expr(Expr::cust(select.as_str()));
            }
        }
    }

    let filter_sql = Statement::render(engine, &query);

    if let Some(filter) = params.sql_filter.as_ref().filter(|f| !f.is_empty()) {
        query.and_where(Expr::cust(filter.as_str()));
        count_query.and_where(Expr::cust(filter.as_str()));
    }

    if params.count > 0 {
        query.limit(params.count).offset(params.offset);
    }

    for token in &params.order {
        let (column, order) = parse_order(token)?;
        query.order_by_expr(column_expr(qualifier, meta.column_for(column)).into(), order);
    }

    if let Some(rewriter) = meta.rewriter() {
        rewriter.rewrite(&mut query, params, engine);
    }

    let found_rows = params.count_total && !params.group.is_empty() && engine.is_mysql_family();

    let mut stmt = Statement::build(engine, &query);
    let mut sql = Statement::render(engine, &query);
    if found_rows {
        stmt.sql = with_found_rows(&stmt.sql);
        sql = with_found_rows(&sql);
    }

    let raw_rows = conn.fetch_all(&stmt)?;
    let fetched = raw_rows.len() as u64;

    let rows = if params.ids_only {
        SearchRows::Ids(
            raw_rows
                .into_iter()
                .filter_map(|row| row.into_iter().next().map(|(_, v)| v))
                .collect(),
        )
    } else if params.wrap {
        SearchRows::Entities(
            raw_rows
                .into_iter()
                .map(|row| Entity::from_row(meta, row))
                .collect(),
        )
    } else {
        SearchRows::Rows(raw_rows)
    };

    let mut ran_count_query = false;
    let total = if !params.count_total {
        None
    } else if params.count == 0 || (params.offset == 0 && fetched < params.count) {
        Some(fetched)
    } else if found_rows {
        ran_count_query = true;
        Some(read_total(conn, &Statement::raw("SELECT FOUND_ROWS()"))?)
    } else {
        ran_count_query = true;
        let count_stmt = if params.group.is_empty() {
            count_query.expr_as(Expr::cust("COUNT(1)"), Alias::new("total"));
            Statement::build(engine, &count_query)
        } else {
            count_query.expr(Expr::cust("1"));
            let mut outer = Query::select();
            outer
                .expr_as(Expr::cust("COUNT(1)"), Alias::new("total"))
                .from_subquery(count_query, Alias::new("grouped"));
            Statement::build(engine, &outer)
        };
        Some(read_total(conn, &count_stmt)?)
    };

    debug!(
        table = %table,
        engine = ?engine,
        rows = fetched,
        total = ?total,
        count_query = ran_count_query,
        "search"
    );

    let primary_key = meta
        .primary_key()
        .map(|pk| pk.result_column().to_owned())
        .unwrap_or_default();

    Ok(SearchResult {
        rows,
        order: params.order.clone(),
        count: params.count,
        offset: params.offset,
        total,
        filter_sql,
        sql,
        primary_key,
        table_alias: alias,
    })
}

fn read_total(conn: &mut dyn Connection, stmt: &Statement) -> OrmResult<u64> {
    let value: Value = conn
        .fetch_scalar(stmt)?
        .ok_or_else(|| anyhow!("total query returned no rows: {}", stmt.sql))?;
    value_as_u64(&value)
        .ok_or_else(|| OrmError::from(anyhow!("total query returned a non-integer: {value}")))
}

/// Runs a search and returns raw rows regardless of `params.wrap`.
///
/// # Errors
/// Same as [`search`].
pub fn search_rows(
    conn: &mut dyn Connection,
    meta: &Arc<EntityMeta>,
    params: &SearchParams,
) -> OrmResult<(Vec<Row>, Option<u64>)> {
    let params = SearchParams {
        wrap: false,
        ids_only: false,
        ..params.clone()
    };
    let result = search(conn, meta, &params)?;
    let total = result.total();
    match result.into_rows() {
        SearchRows::Rows(rows) => Ok((rows, total)),
        SearchRows::Entities(entities) => {
            Ok((entities.into_iter().map(|e| e.data().clone()).collect(), total))
        }
        SearchRows::Ids(_) => Err(OrmError::invalid_argument("unexpected ids-only result")),
    }
}

//! Rendering of search queries to SQLite statements.

use sea_query::{Cond, Condition, Expr, Order, SelectStatement, SimpleExpr};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::search::{data_leaves, json_path, Filter, FilterField, FilterValue, Operation, Query};
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::Events;

/// Columns of a full event row, in decode order.
pub(super) const EVENT_COLUMNS: [Events; 14] = [
    Events::InstanceId,
    Events::AggregateType,
    Events::AggregateId,
    Events::AggregateVersion,
    Events::Sequence,
    Events::Position,
    Events::InTxOrder,
    Events::EventType,
    Events::Revision,
    Events::CreatedAt,
    Events::Creator,
    Events::Service,
    Events::Owner,
    Events::Payload,
];

/// Payload read as JSON text.
const PAYLOAD_TEXT: &str = "CAST(payload AS TEXT)";

pub(super) fn select_events(query: &Query) -> Result<SelectStatement> {
    let mut stmt = sea_query::Query::select();
    stmt.columns(EVENT_COLUMNS).from(Events::Table);
    if let Some(condition) = condition(query)? {
        stmt.cond_where(condition);
    }

    let order = if query.desc { Order::Desc } else { Order::Asc };
    stmt.order_by(Events::Position, order.clone())
        .order_by(Events::InTxOrder, order);

    if query.limit > 0 {
        stmt.limit(query.limit);
    } else if query.offset > 0 {
        // SQLite only accepts OFFSET after LIMIT
        stmt.limit(i64::MAX as u64);
    }
    if query.offset > 0 {
        stmt.offset(query.offset);
    }
    Ok(stmt)
}

pub(super) fn select_max_sequence(query: &Query) -> Result<SelectStatement> {
    let mut stmt = sea_query::Query::select();
    stmt.expr(Expr::col(Events::Sequence).max())
        .from(Events::Table);
    if let Some(condition) = condition(query)? {
        stmt.cond_where(condition);
    }
    Ok(stmt)
}

pub(super) fn select_max_position(query: &Query) -> Result<SelectStatement> {
    let mut stmt = sea_query::Query::select();
    stmt.columns([Events::Position, Events::InTxOrder])
        .from(Events::Table);
    if let Some(condition) = condition(query)? {
        stmt.cond_where(condition);
    }
    stmt.order_by(Events::Position, Order::Desc)
        .order_by(Events::InTxOrder, Order::Desc)
        .limit(1);
    Ok(stmt)
}

/// OR of ANDed branches. `None` when a branch is unconstrained.
fn condition(query: &Query) -> Result<Option<Condition>> {
    if query.branches.iter().any(Vec::is_empty) {
        return Ok(None);
    }
    let mut any = Cond::any();
    for branch in &query.branches {
        let mut all = Cond::all();
        for filter in branch {
            all = all.add(filter_expr(filter)?);
        }
        any = any.add(all);
    }
    Ok(Some(any))
}

fn column(field: FilterField) -> Events {
    match field {
        FilterField::AggregateType => Events::AggregateType,
        FilterField::AggregateId => Events::AggregateId,
        FilterField::EventType => Events::EventType,
        FilterField::Sequence => Events::Sequence,
        FilterField::Position => Events::Position,
        FilterField::CreationDate => Events::CreatedAt,
        FilterField::ResourceOwner => Events::Owner,
        FilterField::InstanceId => Events::InstanceId,
        FilterField::Creator => Events::Creator,
        FilterField::EventData => Events::Payload,
    }
}

fn filter_expr(filter: &Filter) -> Result<SimpleExpr> {
    let col = Expr::col(column(filter.field));
    match (&filter.value, filter.operation) {
        (FilterValue::Text(value), Operation::Equals) => Ok(col.eq(value.as_str())),
        (FilterValue::TextList(values), Operation::In) => {
            Ok(col.is_in(values.iter().map(String::as_str)))
        }
        (FilterValue::Unsigned(value), operation) => {
            compare(col, i64::try_from(*value).unwrap_or(i64::MAX), operation)
        }
        (FilterValue::Time(value), operation) => compare(col, format_timestamp(value), operation),
        (FilterValue::Data(data), Operation::JsonContains) => {
            let leaves: Vec<_> = data_leaves(data)
                .into_iter()
                .map(|(path, leaf)| leaf_expr(json_path(&path), leaf))
                .collect();
            if leaves.is_empty() {
                return Err(unsupported(filter));
            }
            // events without payload contain nothing, not even null leaves
            Ok(leaves
                .into_iter()
                .fold(col.is_not_null(), SimpleExpr::and))
        }
        _ => Err(unsupported(filter)),
    }
}

fn compare<V>(col: Expr, value: V, operation: Operation) -> Result<SimpleExpr>
where
    V: Into<SimpleExpr>,
{
    match operation {
        Operation::Equals => Ok(col.eq(value)),
        Operation::Greater => Ok(col.gt(value)),
        Operation::Less => Ok(col.lt(value)),
        other => Err(Error::Internal(format!("unsupported comparison {other:?}"))),
    }
}

/// Containment of one leaf. Missing keys read as null, strings and numbers
/// must carry the matching JSON type, numbers compare numerically.
fn leaf_expr(path: String, leaf: &Value) -> SimpleExpr {
    match leaf {
        Value::Null => Expr::cust_with_values(
            format!("json_extract({PAYLOAD_TEXT}, ?) IS NULL"),
            [path],
        ),
        Value::Bool(expected) => Expr::cust_with_values(
            format!("json_type({PAYLOAD_TEXT}, ?) = ?"),
            [path, expected.to_string()],
        ),
        Value::Number(number) => {
            let value: SimpleExpr = match number.as_i64() {
                Some(integer) => integer.into(),
                None => number.as_f64().unwrap_or(f64::NAN).into(),
            };
            Expr::cust_with_exprs(
                format!(
                    "(json_type({PAYLOAD_TEXT}, ?) IN ('integer', 'real') AND json_extract({PAYLOAD_TEXT}, ?) = ?)"
                ),
                [path.clone().into(), path.into(), value],
            )
        }
        Value::String(expected) => Expr::cust_with_values(
            format!(
                "(json_type({PAYLOAD_TEXT}, ?) = 'text' AND json_extract({PAYLOAD_TEXT}, ?) = ?)"
            ),
            [path.clone(), path, expected.clone()],
        ),
        // rejected by Filter::validate
        Value::Array(_) | Value::Object(_) => Expr::cust("0"),
    }
}

fn unsupported(filter: &Filter) -> Error {
    Error::Internal(format!(
        "unsupported filter {:?} {:?}",
        filter.field, filter.operation
    ))
}

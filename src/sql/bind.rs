//! Typed parameter binding for `sqlx::Any` queries
//!
//! Values are converted to a concrete SQL type before binding so that strictly
//! typed backends (PostgreSQL) compare like with like.

use sqlx::Any;
use sqlx::any::AnyArguments;
use sqlx::query::Query;

/// A single bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

/// Bind one parameter onto a query
pub fn bind_param<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    param: &SqlParam,
) -> Query<'q, Any, AnyArguments<'q>> {
    match param {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Bytes(v) => query.bind(v.clone()),
    }
}

/// Bind parameters in order
pub fn bind_all<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Any, AnyArguments<'q>> {
    params.iter().fold(query, |query, param| bind_param(query, param))
}

/// Comma-separated `$n` placeholders starting at `*param_offset`.
///
/// Advances `param_offset` past the generated placeholders.
pub fn placeholders(count: usize, param_offset: &mut i32) -> String {
    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        parts.push(format!("${}", param_offset));
        *param_offset += 1;
    }
    parts.join(", ")
}

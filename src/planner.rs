//! Index planner
//!
//! Decides where a query is answered: straight from the main table when
//! only reserved columns are involved, or from the one declared index whose
//! field list starts with the queried fields.
//!
//! The fields of interest are the where-keys in insertion order followed by
//! the sort keys that are not already filtered on, with `_id` left out since
//! every index table carries it. An index can answer the query when that
//! list is a prefix of its field list. An exact-length match wins; otherwise
//! the first declared index in which the list is a proper prefix is used.
//! With indexes `[a, b]` and `[a]`, a query on `a` uses `[a]` and a query on
//! `a, b` uses `[a, b]`.

use crate::backend::Backend;
use crate::criteria::Criteria;
use crate::document::{BODY_COLUMN, CREATED_FIELD, ID_FIELD, ROWID_FIELD, UPDATED_FIELD};
use crate::error::{DocumentStoreError, Result};
use crate::sql::condition::{CompiledFilter, build_order_by_clause, build_where_clause};
use crate::sql::sanitize::quote_identifier;
use crate::table::Table;
use crate::types::IndexDefinition;

/// Where a query's ids come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Lookup by `_id` on the main table
    DirectId,
    /// Main-table scan over reserved columns only
    MainTable,
    /// Declared index at `position`, materialized as `physical_name`
    IndexTable {
        position: usize,
        physical_name: String,
    },
}

/// A resolved query: target, source table and compiled clauses
#[derive(Debug, Clone)]
pub struct Plan {
    pub target: Target,
    /// Main table name
    pub table: String,
    /// Table the WHERE clause runs against
    pub source: String,
    pub filter: CompiledFilter,
    /// ORDER BY list without the keyword
    pub order_by: String,
}

impl Plan {
    pub fn uses_index(&self) -> bool {
        matches!(self.target, Target::IndexTable { .. })
    }

    /// Statement returning ordered ids (`_id` only)
    pub fn select_ids_sql(&self, backend: Backend, limit: Option<u64>, offset: u64) -> String {
        let id = quote_identifier(ID_FIELD);
        let source = quote_identifier(&self.source);
        let limit = backend.limit_clause(limit, offset);
        if self.uses_index() {
            format!(
                "SELECT {} FROM {}{} GROUP BY {} ORDER BY {}{}",
                id,
                source,
                self.filter.where_sql(),
                id,
                self.order_by,
                limit
            )
        } else {
            format!(
                "SELECT {} FROM {}{} ORDER BY {}{}",
                id,
                source,
                self.filter.where_sql(),
                self.order_by,
                limit
            )
        }
    }

    /// Statement returning full main-table rows; only meaningful off-index
    pub fn select_rows_sql(&self, backend: Backend, limit: Option<u64>, offset: u64) -> String {
        format!(
            "SELECT {} FROM {}{} ORDER BY {}{}",
            main_select_list(),
            quote_identifier(&self.table),
            self.filter.where_sql(),
            self.order_by,
            backend.limit_clause(limit, offset)
        )
    }

    /// Statement counting distinct matching documents
    pub fn count_sql(&self) -> String {
        let counted = if self.uses_index() {
            format!("COUNT(DISTINCT {})", quote_identifier(ID_FIELD))
        } else {
            "COUNT(*)".to_string()
        };
        format!(
            "SELECT {} FROM {}{}",
            counted,
            quote_identifier(&self.source),
            self.filter.where_sql()
        )
    }
}

/// Column list for reading a stored document
pub(crate) fn main_select_list() -> String {
    [ID_FIELD, ROWID_FIELD, CREATED_FIELD, UPDATED_FIELD, BODY_COLUMN]
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where-keys, then sort keys not already present, without `_id`
pub fn interest_fields(criteria: &Criteria) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let filtered = criteria.filters().iter().map(|f| f.field.as_str());
    let sorted = criteria.sort_keys().iter().map(|(name, _)| name.as_str());

    for name in filtered.chain(sorted) {
        if name != ID_FIELD && !fields.iter().any(|f| f == name) {
            fields.push(name.to_string());
        }
    }
    fields
}

/// Pick the index answering a query over `fields`
pub fn select_index<'a>(table: &'a Table, fields: &[String]) -> Option<(usize, &'a IndexDefinition)> {
    if fields.is_empty() {
        return None;
    }

    let starts_with = |index: &IndexDefinition| {
        index.fields.len() >= fields.len()
            && index.fields.iter().zip(fields).all(|(f, name)| &f.name == name)
    };

    table
        .relational_indexes()
        .find(|(_, index)| index.fields.len() == fields.len() && starts_with(*index))
        .or_else(|| table.relational_indexes().find(|(_, index)| starts_with(*index)))
}

/// Resolve the target for `criteria` and compile its clauses.
///
/// Fails with [`DocumentStoreError::UnanswerableQuery`] when neither the main
/// table nor any declared index covers the queried fields. The declared
/// index list is attached only when `verbose` is set.
pub fn resolve_target(table: &Table, criteria: &Criteria, verbose: bool) -> Result<Plan> {
    let off_index = criteria
        .filters()
        .iter()
        .map(|f| f.field.as_str())
        .chain(criteria.sort_keys().iter().map(|(name, _)| name.as_str()))
        .all(Table::is_main_table_field);

    let mut param_offset = 1;
    let plan = if off_index {
        let target = if criteria.filter_for(ID_FIELD).is_some() {
            Target::DirectId
        } else {
            Target::MainTable
        };
        let filter = build_where_clause(table, criteria, &mut param_offset)?;
        let order_by = build_order_by_clause(criteria.sort_keys(), false)?
            .unwrap_or_else(|| format!("{} ASC", quote_identifier(ROWID_FIELD)));
        Plan {
            target,
            table: table.name.clone(),
            source: table.name.clone(),
            filter,
            order_by,
        }
    } else {
        let fields = interest_fields(criteria);
        let Some((position, index)) = select_index(table, &fields) else {
            return Err(DocumentStoreError::UnanswerableQuery {
                table: table.name.clone(),
                fields,
                indexes: verbose.then(|| {
                    table
                        .indexes
                        .iter()
                        .map(|i| i.field_names().into_iter().map(String::from).collect())
                        .collect()
                }),
            });
        };
        let filter = build_where_clause(table, criteria, &mut param_offset)?;
        let order_by = build_order_by_clause(criteria.sort_keys(), true)?
            .unwrap_or_else(|| format!("{} ASC", quote_identifier(ID_FIELD)));
        Plan {
            target: Target::IndexTable {
                position,
                physical_name: index.physical_name(&table.name),
            },
            table: table.name.clone(),
            source: index.physical_name(&table.name),
            filter,
            order_by,
        }
    };

    tracing::debug!(
        table = %table.name,
        target = ?plan.target,
        "Resolved query target"
    );
    Ok(plan)
}

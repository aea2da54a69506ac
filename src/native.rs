//! Native document-store translation
//!
//! Document databases can evaluate a [`Criteria`] directly, so there is no
//! planner or index maintenance on that path: the where-map becomes a
//! Mongo-style filter document and the sort-map a `{field: 1 | -1}` document.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::criteria::{Command, Criteria, SortDirection};

/// A criteria expressed in native query primitives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeQuery {
    pub filter: Map<String, Value>,
    pub sort: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    pub skip: u64,
}

fn operator(command: Command) -> &'static str {
    match command {
        Command::Is => "$eq",
        Command::Not => "$ne",
        Command::Gt => "$gt",
        Command::Gte => "$gte",
        Command::Lt => "$lt",
        Command::Lte => "$lte",
        Command::In => "$in",
        Command::Nin => "$nin",
        Command::Near => "$near",
    }
}

/// Translate a criteria into a native filter, sort and bounds
///
/// A field with a single `is` predicate is written as a plain equality.
pub fn translate(criteria: &Criteria) -> NativeQuery {
    let mut filter = Map::new();
    for field_filter in criteria.filters() {
        let condition = match field_filter.predicates.as_slice() {
            [only] if only.command == Command::Is => only.value.clone(),
            predicates => Value::Object(
                predicates
                    .iter()
                    .map(|p| (operator(p.command).to_string(), p.value.clone()))
                    .collect(),
            ),
        };
        filter.insert(field_filter.field.clone(), condition);
    }

    let sort = criteria
        .sort_keys()
        .iter()
        .map(|(field, direction)| {
            let order = match direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (field.clone(), Value::from(order))
        })
        .collect();

    let bounds = criteria.bounds();
    NativeQuery {
        filter,
        sort,
        limit: bounds.limit,
        skip: bounds.offset,
    }
}

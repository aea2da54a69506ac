//! Condition building for SQL WHERE and ORDER BY clauses
//!
//! Converts a [`Criteria`] where-map into a parameterized WHERE clause and
//! its sort-map into an ORDER BY list.

use serde_json::Value;

use crate::criteria::{Command, Criteria, Predicate, SortDirection};
use crate::error::{DocumentStoreError, Result};
use crate::sql::bind::{SqlParam, placeholders};
use crate::sql::sanitize::{quote_identifier, validate_field_name};
use crate::table::Table;
use crate::types::FieldType;

/// A compiled WHERE clause
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    /// Clause without the `WHERE` keyword; `None` when nothing is filtered
    pub clause: Option<String>,
    /// Parameters in placeholder order
    pub params: Vec<SqlParam>,
}

impl CompiledFilter {
    /// ` WHERE ...` suffix, or empty
    pub fn where_sql(&self) -> String {
        match &self.clause {
            Some(clause) => format!(" WHERE {}", clause),
            None => String::new(),
        }
    }
}

/// Build a WHERE clause from the criteria's where-map
///
/// Fields are AND-ed in insertion order, and so are the commands on a field.
/// Values are coerced to the field's declared type.
///
/// # Arguments
/// * `table` - supplies field type hints
/// * `criteria` - the where-map to compile
/// * `param_offset` - next free `$n`; advanced past the generated placeholders
pub fn build_where_clause(
    table: &Table,
    criteria: &Criteria,
    param_offset: &mut i32,
) -> Result<CompiledFilter> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for filter in criteria.filters() {
        validate_field_name(&filter.field).map_err(DocumentStoreError::validation)?;
        let field_type = table.field_type(&filter.field);

        for predicate in &filter.predicates {
            let clause = build_predicate(
                &filter.field,
                field_type,
                predicate,
                &mut params,
                param_offset,
            )?;
            clauses.push(clause);
        }
    }

    Ok(CompiledFilter {
        clause: (!clauses.is_empty()).then(|| clauses.join(" AND ")),
        params,
    })
}

fn build_predicate(
    field: &str,
    field_type: FieldType,
    predicate: &Predicate,
    params: &mut Vec<SqlParam>,
    param_offset: &mut i32,
) -> Result<String> {
    let column = quote_identifier(field);

    let operator = match predicate.command {
        Command::Is => "=",
        Command::Not => "<>",
        Command::Gt => ">",
        Command::Gte => ">=",
        Command::Lt => "<",
        Command::Lte => "<=",
        Command::In | Command::Nin => {
            return build_membership(field, field_type, predicate, params, param_offset);
        }
        Command::Near => {
            return Err(DocumentStoreError::unsupported(format!(
                "spatial predicate 'near' on field '{}' on a relational backend",
                field
            )));
        }
    };

    if predicate.value.is_null() {
        return match predicate.command {
            Command::Is => Ok(format!("{} IS NULL", column)),
            Command::Not => Ok(format!("{} IS NOT NULL", column)),
            command => Err(DocumentStoreError::validation(format!(
                "'{}' on field '{}' cannot compare against null",
                command, field
            ))),
        };
    }

    params.push(coerce(field, field_type, &predicate.value)?);
    let clause = format!("{} {} ${}", column, operator, param_offset);
    *param_offset += 1;
    Ok(clause)
}

fn build_membership(
    field: &str,
    field_type: FieldType,
    predicate: &Predicate,
    params: &mut Vec<SqlParam>,
    param_offset: &mut i32,
) -> Result<String> {
    let column = quote_identifier(field);
    let values = match &predicate.value {
        Value::Array(values) => values.as_slice(),
        other => std::slice::from_ref(other),
    };

    let with_null = values.iter().any(Value::is_null);
    let mut bound = Vec::new();
    for value in values.iter().filter(|v| !v.is_null()) {
        bound.push(coerce(field, field_type, value)?);
    }

    let negate = predicate.command == Command::Nin;
    let list = (!bound.is_empty()).then(|| {
        format!(
            "{} {}IN ({})",
            column,
            if negate { "NOT " } else { "" },
            placeholders(bound.len(), param_offset)
        )
    });
    params.extend(bound);

    Ok(match (list, with_null, negate) {
        (Some(list), false, _) => list,
        (Some(list), true, false) => format!("({} OR {} IS NULL)", list, column),
        (Some(list), true, true) => format!("({} AND {} IS NOT NULL)", list, column),
        (None, _, false) => format!("{} IS NULL", column),
        (None, _, true) => format!("{} IS NOT NULL", column),
    })
}

fn coerce(field: &str, field_type: FieldType, value: &Value) -> Result<SqlParam> {
    field_type.coerce(value).map_err(|e| {
        DocumentStoreError::validation(format!("Invalid value for field '{}': {}", field, e))
    })
}

/// Build an ORDER BY list (without the keyword) from sort keys
///
/// With `grouped` set, each key is wrapped in an aggregate (`MIN` for
/// ascending, `MAX` for descending) so the list is valid alongside
/// `GROUP BY _id` on an index table, where array expansion can give one
/// document several values.
pub fn build_order_by_clause(
    sort: &[(String, SortDirection)],
    grouped: bool,
) -> Result<Option<String>> {
    if sort.is_empty() {
        return Ok(None);
    }

    let mut order_parts = Vec::with_capacity(sort.len());
    for (field, direction) in sort {
        validate_field_name(field).map_err(DocumentStoreError::validation)?;
        let column = quote_identifier(field);
        let expr = match (grouped, direction) {
            (false, _) => column,
            (true, SortDirection::Asc) => format!("MIN({})", column),
            (true, SortDirection::Desc) => format!("MAX({})", column),
        };
        order_parts.push(format!("{} {}", expr, direction.as_sql()));
    }

    Ok(Some(order_parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldDefinition;
    use serde_json::json;

    fn table() -> Table {
        Table::new("posts")
            .with_field(FieldDefinition::new("views", FieldType::Integer))
            .with_field(FieldDefinition::new("draft", FieldType::Boolean))
    }

    fn compile(criteria: &Criteria) -> CompiledFilter {
        let mut offset = 1;
        build_where_clause(&table(), criteria, &mut offset).unwrap()
    }

    // ==================== Comparison Operations ====================

    #[test]
    fn test_empty_criteria() {
        let compiled = compile(&Criteria::new());
        assert_eq!(compiled.clause, None);
        assert_eq!(compiled.where_sql(), "");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_is_condition() {
        let compiled = compile(&Criteria::new().is("author", "ada"));
        assert_eq!(compiled.clause.as_deref(), Some("\"author\" = $1"));
        assert_eq!(compiled.params, vec![SqlParam::Text("ada".to_string())]);
        assert_eq!(compiled.where_sql(), " WHERE \"author\" = $1");
    }

    #[test]
    fn test_values_follow_declared_type() {
        let compiled = compile(&Criteria::new().gt("views", "10").is("draft", true));
        assert_eq!(
            compiled.clause.as_deref(),
            Some("\"views\" > $1 AND \"draft\" = $2")
        );
        assert_eq!(compiled.params, vec![SqlParam::Int(10), SqlParam::Bool(true)]);
    }

    #[test]
    fn test_range_operators() {
        let compiled = compile(&Criteria::new().between("views", 1, 5).not("author", "x").lt("rank", 3));
        assert_eq!(
            compiled.clause.as_deref(),
            Some("\"views\" >= $1 AND \"views\" <= $2 AND \"author\" <> $3 AND \"rank\" < $4")
        );
    }

    #[test]
    fn test_null_comparisons() {
        let compiled = compile(&Criteria::new().is("a", Value::Null).not("b", Value::Null));
        assert_eq!(
            compiled.clause.as_deref(),
            Some("\"a\" IS NULL AND \"b\" IS NOT NULL")
        );
        assert!(compiled.params.is_empty());

        let mut offset = 1;
        let err = build_where_clause(&table(), &Criteria::new().gt("a", Value::Null), &mut offset);
        assert!(err.is_err());
    }

    #[test]
    fn test_bad_value_for_type() {
        let mut offset = 1;
        let err = build_where_clause(&table(), &Criteria::new().is("views", "lots"), &mut offset)
            .unwrap_err();
        assert!(err.to_string().contains("'views'"));
    }

    // ==================== Membership ====================

    #[test]
    fn test_in_condition() {
        let criteria = Criteria::new().is_in("views", [1, 2, 3]).unwrap();
        let compiled = compile(&criteria);
        assert_eq!(compiled.clause.as_deref(), Some("\"views\" IN ($1, $2, $3)"));
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn test_nin_condition() {
        let criteria = Criteria::new().not_in("tag", ["a", "b"]).unwrap();
        let compiled = compile(&criteria);
        assert_eq!(compiled.clause.as_deref(), Some("\"tag\" NOT IN ($1, $2)"));
    }

    #[test]
    fn test_in_with_null() {
        let criteria = Criteria::new().is_in("tag", vec![json!("a"), Value::Null]).unwrap();
        assert_eq!(
            compile(&criteria).clause.as_deref(),
            Some("(\"tag\" IN ($1) OR \"tag\" IS NULL)")
        );

        let criteria = Criteria::new().is_in("tag", vec![Value::Null]).unwrap();
        assert_eq!(compile(&criteria).clause.as_deref(), Some("\"tag\" IS NULL"));
    }

    // ==================== Unsupported / invalid ====================

    #[test]
    fn test_near_is_unsupported() {
        let mut offset = 1;
        let err = build_where_clause(
            &table(),
            &Criteria::new().near("location", json!([1.0, 2.0])),
            &mut offset,
        )
        .unwrap_err();
        assert!(matches!(err, DocumentStoreError::Unsupported(_)));
    }

    #[test]
    fn test_invalid_field_name() {
        let mut offset = 1;
        let result = build_where_clause(&table(), &Criteria::new().is("a;drop", 1), &mut offset);
        assert!(result.is_err());
    }

    // ==================== Parameter Offset Tracking ====================

    #[test]
    fn test_param_offset_tracking() {
        let criteria = Criteria::new()
            .is("a", "1")
            .is_in("b", ["x", "y"])
            .unwrap()
            .is("c", "3");

        let mut offset = 5;
        let compiled = build_where_clause(&table(), &criteria, &mut offset).unwrap();

        assert_eq!(
            compiled.clause.as_deref(),
            Some("\"a\" = $5 AND \"b\" IN ($6, $7) AND \"c\" = $8")
        );
        assert_eq!(compiled.params.len(), 4);
        assert_eq!(offset, 9);
    }

    // ==================== build_order_by_clause Tests ====================

    #[test]
    fn test_order_by_empty() {
        assert_eq!(build_order_by_clause(&[], false).unwrap(), None);
    }

    #[test]
    fn test_order_by_plain() {
        let sort = vec![
            ("date".to_string(), SortDirection::Desc),
            ("title".to_string(), SortDirection::Asc),
        ];
        assert_eq!(
            build_order_by_clause(&sort, false).unwrap().as_deref(),
            Some("\"date\" DESC, \"title\" ASC")
        );
    }

    #[test]
    fn test_order_by_grouped() {
        let sort = vec![
            ("date".to_string(), SortDirection::Desc),
            ("title".to_string(), SortDirection::Asc),
        ];
        assert_eq!(
            build_order_by_clause(&sort, true).unwrap().as_deref(),
            Some("MAX(\"date\") DESC, MIN(\"title\") ASC")
        );
    }

    #[test]
    fn test_order_by_invalid_field() {
        let sort = vec![("bad field".to_string(), SortDirection::Asc)];
        assert!(build_order_by_clause(&sort, false).is_err());
    }
}

//! Index maintenance
//!
//! Every relational index of a table is materialized as its own table with
//! one typed column per indexed field plus `_id`. A document contributes one
//! row per index, or one row per distinct element when exactly one indexed
//! field holds an array. Two array-valued fields in the same index are
//! rejected before anything is written.

use serde_json::Value;
use sqlx::AnyConnection;

use crate::backend::Backend;
use crate::document::{Document, ID_FIELD};
use crate::error::{DocumentStoreError, Result};
use crate::sql::bind::{SqlParam, bind_all, placeholders};
use crate::sql::ddl::DdlGenerator;
use crate::sql::sanitize::quote_identifier;
use crate::table::Table;
use crate::types::{IndexDefinition, IndexField};

/// One index-table row: `(field, value)` pairs in index field order.
/// Absent fields are omitted from the INSERT (the column defaults to NULL).
pub type IndexRow = Vec<(String, Value)>;

/// Rows destined for one index table
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRows {
    pub physical_name: String,
    pub rows: Vec<IndexRow>,
}

/// Compute the rows a document contributes to one index.
///
/// Null and absent fields are skipped, an empty array counts as absent and
/// duplicate array elements produce a single row. A document with none of
/// the indexed fields contributes nothing.
pub fn expand_index_rows(
    table: &Table,
    index: &IndexDefinition,
    body: &Document,
) -> Result<Vec<IndexRow>> {
    let rows = expand_fields(table, &index.fields, body, None)?;
    Ok(rows.into_iter().filter(|row| !row.is_empty()).collect())
}

/// Expand `fields` left to right. `expanding` names the array field an
/// outer call is already expanding; a second one is an error.
fn expand_fields(
    table: &Table,
    fields: &[IndexField],
    body: &Document,
    expanding: Option<&str>,
) -> Result<Vec<IndexRow>> {
    let Some((field, rest)) = fields.split_first() else {
        return Ok(vec![Vec::new()]);
    };

    match body.get(&field.name) {
        None | Some(Value::Null) => expand_fields(table, rest, body, expanding),
        Some(Value::Array(items)) if !field.is_spatial() => {
            let elements = distinct_elements(&field.name, items)?;
            if elements.is_empty() {
                return expand_fields(table, rest, body, expanding);
            }
            if let Some(first) = expanding {
                return Err(DocumentStoreError::ParallelArrays {
                    table: table.name.clone(),
                    first: first.to_string(),
                    second: field.name.clone(),
                });
            }

            let tails = expand_fields(table, rest, body, Some(&field.name))?;

            let mut rows = Vec::with_capacity(elements.len() * tails.len());
            for element in elements {
                for tail in &tails {
                    rows.push(prefixed(&field.name, element, tail));
                }
            }
            Ok(rows)
        }
        Some(value) => {
            let tails = expand_fields(table, rest, body, expanding)?;
            Ok(tails
                .iter()
                .map(|tail| prefixed(&field.name, value, tail))
                .collect())
        }
    }
}

fn distinct_elements<'a>(field: &str, items: &'a [Value]) -> Result<Vec<&'a Value>> {
    let mut distinct: Vec<&Value> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(_) => {
                return Err(DocumentStoreError::MultiDimensionalArray {
                    field: field.to_string(),
                });
            }
            Value::Null => {}
            item if !distinct.contains(&item) => distinct.push(item),
            _ => {}
        }
    }
    Ok(distinct)
}

fn prefixed(field: &str, value: &Value, tail: &IndexRow) -> IndexRow {
    let mut row = Vec::with_capacity(tail.len() + 1);
    row.push((field.to_string(), value.clone()));
    row.extend(tail.iter().cloned());
    row
}

/// Bind values for one row, coerced to the declared field types
fn coerce_row(table: &Table, row: &IndexRow) -> Result<Vec<SqlParam>> {
    row.iter()
        .map(|(field, value)| {
            table.field_type(field).coerce(value).map_err(|e| {
                DocumentStoreError::validation(format!(
                    "Invalid value for indexed field '{}': {}",
                    field, e
                ))
            })
        })
        .collect()
}

/// Expand a document for one index and check that every value binds.
pub fn plan_rows_for(table: &Table, index: &IndexDefinition, body: &Document) -> Result<IndexRows> {
    let rows = expand_index_rows(table, index, body)?;
    for row in &rows {
        coerce_row(table, row)?;
    }
    Ok(IndexRows {
        physical_name: index.physical_name(&table.name),
        rows,
    })
}

/// Compute the rows for every relational index of the table.
///
/// Runs before any write so that a rejected document leaves no rows behind.
pub fn plan_index_rows(table: &Table, body: &Document) -> Result<Vec<IndexRows>> {
    table
        .relational_indexes()
        .map(|(_, index)| plan_rows_for(table, index, body))
        .collect()
}

/// Create an index table if it does not exist yet.
///
/// Returns `true` when the table was created by this call, in which case the
/// caller is expected to backfill it.
pub async fn create_index_table(
    conn: &mut AnyConnection,
    backend: Backend,
    table: &Table,
    index: &IndexDefinition,
) -> Result<bool> {
    let physical_name = index.physical_name(&table.name);
    if table_exists(conn, backend, &physical_name).await? {
        return Ok(false);
    }

    let ddl = DdlGenerator::new(backend);
    sqlx::query(&ddl.generate_create_index_table(table, index)?)
        .execute(&mut *conn)
        .await?;
    sqlx::query(&ddl.generate_id_lookup_index(&physical_name))
        .execute(&mut *conn)
        .await?;

    tracing::info!(
        table = %table.name,
        index_table = %physical_name,
        fields = ?index.field_names(),
        "Created index table"
    );
    Ok(true)
}

/// Whether a table exists, via the backend's catalog
pub async fn table_exists(conn: &mut AnyConnection, backend: Backend, name: &str) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as(backend.table_exists_sql())
        .bind(name.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Insert the rows computed by [`plan_index_rows`] for one document, on the
/// caller's connection or transaction
pub async fn insert_index_rows(
    conn: &mut AnyConnection,
    table: &Table,
    id: &str,
    planned: &[IndexRows],
) -> Result<()> {
    for index_rows in planned {
        for row in &index_rows.rows {
            let mut params = coerce_row(table, row)?;
            let mut columns: Vec<String> =
                row.iter().map(|(field, _)| quote_identifier(field)).collect();
            columns.push(quote_identifier(ID_FIELD));
            params.push(SqlParam::Text(id.to_string()));

            let mut param_offset = 1;
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_identifier(&index_rows.physical_name),
                columns.join(", "),
                placeholders(params.len(), &mut param_offset)
            );
            bind_all(sqlx::query(&sql), &params)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

/// Remove every index row of the given documents
pub async fn delete_index_rows(
    conn: &mut AnyConnection,
    table: &Table,
    ids: &[String],
) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let params: Vec<SqlParam> = ids.iter().cloned().map(SqlParam::Text).collect();
    let mut removed = 0;
    for physical_name in table.index_table_names() {
        let mut param_offset = 1;
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote_identifier(&physical_name),
            quote_identifier(ID_FIELD),
            placeholders(params.len(), &mut param_offset)
        );
        removed += bind_all(sqlx::query(&sql), &params)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDefinition, FieldType, IndexDirection};
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn table() -> Table {
        Table::new("posts")
            .with_field(FieldDefinition::new("rank", FieldType::Integer))
            .with_index(IndexDefinition::on(["author", "tags", "rank"]))
    }

    fn row(pairs: &[(&str, Value)]) -> IndexRow {
        pairs.iter().map(|(f, v)| (f.to_string(), v.clone())).collect()
    }

    // =========================================================================
    // Scalars
    // =========================================================================

    #[test]
    fn test_scalar_fields_give_one_row() {
        let table = table();
        let rows = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"author": "ada", "tags": "x", "rank": 1, "other": true})),
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![row(&[("author", json!("ada")), ("tags", json!("x")), ("rank", json!(1))])]
        );
    }

    #[test]
    fn test_absent_and_null_fields_are_skipped() {
        let table = table();
        let rows = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"author": null, "rank": 2})),
        )
        .unwrap();
        assert_eq!(rows, vec![row(&[("rank", json!(2))])]);

        let rows = expand_index_rows(&table, &table.indexes[0], &doc(json!({"title": "t"}))).unwrap();
        assert!(rows.is_empty());
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    #[test]
    fn test_array_expands_in_field_order() {
        let table = table();
        let rows = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"author": "ada", "tags": ["a", "b", "a", null], "rank": 3})),
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![
                row(&[("author", json!("ada")), ("tags", json!("a")), ("rank", json!(3))]),
                row(&[("author", json!("ada")), ("tags", json!("b")), ("rank", json!(3))]),
            ]
        );
    }

    #[test]
    fn test_array_slot_with_absent_leading_field() {
        let table = table();
        let rows = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"tags": ["a"], "rank": 3})),
        )
        .unwrap();
        assert_eq!(rows, vec![row(&[("tags", json!("a")), ("rank", json!(3))])]);
    }

    #[test]
    fn test_empty_array_counts_as_absent() {
        let table = table();
        let rows = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"author": "ada", "tags": []})),
        )
        .unwrap();
        assert_eq!(rows, vec![row(&[("author", json!("ada"))])]);
    }

    #[test]
    fn test_parallel_arrays_rejected() {
        let table = Table::new("posts").with_index(IndexDefinition::on(["tags", "cats"]));
        let err = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"tags": ["a"], "cats": ["b"]})),
        )
        .unwrap_err();
        match err {
            DocumentStoreError::ParallelArrays { first, second, .. } => {
                assert_eq!(first, "tags");
                assert_eq!(second, "cats");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_array_does_not_claim_expansion() {
        let table = Table::new("posts").with_index(IndexDefinition::on(["tags", "cats"]));
        let index = &table.indexes[0];

        let rows = expand_index_rows(&table, index, &doc(json!({"tags": [], "cats": ["a"]}))).unwrap();
        assert_eq!(rows, vec![row(&[("cats", json!("a"))])]);

        let rows = expand_index_rows(&table, index, &doc(json!({"tags": ["a"], "cats": []}))).unwrap();
        assert_eq!(rows, vec![row(&[("tags", json!("a"))])]);
    }

    #[test]
    fn test_nested_array_rejected() {
        let table = table();
        let err = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"tags": [["a"], "b"]})),
        )
        .unwrap_err();
        assert!(matches!(err, DocumentStoreError::MultiDimensionalArray { field } if field == "tags"));
    }

    #[test]
    fn test_spatial_field_is_not_expanded() {
        let table = Table::new("places").with_index(
            IndexDefinition::new()
                .field("location", IndexDirection::Spatial)
                .field("tags", IndexDirection::Asc),
        );
        let rows = expand_index_rows(
            &table,
            &table.indexes[0],
            &doc(json!({"location": [1.5, 2.5], "tags": ["a", "b"]})),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], ("location".to_string(), json!([1.5, 2.5])));
    }

    #[test]
    fn test_plan_covers_relational_indexes_only() {
        let table = table()
            .with_index(IndexDefinition::on(["author"]))
            .with_index(IndexDefinition::new().field("location", IndexDirection::Spatial));
        let planned = plan_index_rows(&table, &doc(json!({"author": "ada"}))).unwrap();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[1].physical_name, table.indexes[1].physical_name("posts"));
    }

    #[test]
    fn test_plan_rejects_values_that_do_not_bind() {
        let table = table();
        let err = plan_rows_for(&table, &table.indexes[0], &doc(json!({"rank": "high"}))).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));
        assert!(err.is_input_error());

        let planned = plan_rows_for(&table, &table.indexes[0], &doc(json!({"rank": "7"}))).unwrap();
        assert_eq!(planned.rows, vec![row(&[("rank", json!("7"))])]);
    }

    #[test]
    fn test_plan_fails_if_any_index_rejects() {
        let table = Table::new("posts")
            .with_index(IndexDefinition::on(["author"]))
            .with_index(IndexDefinition::on(["tags", "cats"]));
        let result = plan_index_rows(&table, &doc(json!({"author": "a", "tags": [1], "cats": [2]})));
        assert!(result.is_err());
    }

    // =========================================================================
    // Properties
    // =========================================================================

    proptest! {
        #[test]
        fn prop_rows_match_distinct_elements(
            tags in prop::collection::vec(prop::option::of("[a-d]{1,2}"), 0..12)
        ) {
            let table = Table::new("posts").with_index(IndexDefinition::on(["tags"]));
            let values: Vec<Value> = tags
                .iter()
                .map(|t| t.clone().map(Value::String).unwrap_or(Value::Null))
                .collect();
            let mut distinct: Vec<&String> = tags.iter().flatten().collect();
            distinct.sort();
            distinct.dedup();

            let rows = expand_index_rows(
                &table,
                &table.indexes[0],
                &doc(json!({ "tags": values })),
            ).unwrap();
            prop_assert_eq!(rows.len(), distinct.len());
        }
    }
}

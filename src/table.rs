//! Table definitions
//!
//! A [`Table`] is built by the caller and only read by the engine: a name,
//! typed field declarations with required-field constraints, and the ordered
//! list of declared indexes.

use serde::{Deserialize, Serialize};

use crate::document::{self, Document};
use crate::error::{DocumentStoreError, Result};
use crate::sql::sanitize::{validate_field_name, validate_identifier};
use crate::types::{FieldDefinition, FieldType, IndexDefinition, Requirement};

/// A named collection of documents plus its declared indexes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    /// Main table name (must be a valid identifier)
    pub name: String,
    /// Declared fields; undeclared fields are allowed and default to `String`
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Declared indexes in declaration order
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl Table {
    /// Create a table with no declared fields or indexes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Declare a field
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare an index
    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Declare several indexes
    pub fn with_indexes(mut self, indexes: Vec<IndexDefinition>) -> Self {
        self.indexes.extend(indexes);
        self
    }

    /// Look up a field declaration
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Type hint for a field; reserved fields have fixed types
    pub fn field_type(&self, name: &str) -> FieldType {
        match name {
            document::ID_FIELD => FieldType::String,
            document::ROWID_FIELD | document::CREATED_FIELD | document::UPDATED_FIELD => {
                FieldType::Integer
            }
            _ => self
                .field(name)
                .map(|f| f.field_type)
                .unwrap_or_default(),
        }
    }

    /// Indexes the relational backends materialize, with their declaration
    /// position. Indexes with a spatial field are left out.
    pub fn relational_indexes(&self) -> impl Iterator<Item = (usize, &IndexDefinition)> {
        self.indexes
            .iter()
            .enumerate()
            .filter(|(_, index)| !index.has_spatial_field())
    }

    /// Physical names of every materialized index table
    pub fn index_table_names(&self) -> Vec<String> {
        self.relational_indexes()
            .map(|(_, index)| index.physical_name(&self.name))
            .collect()
    }

    /// Check the table name and index declarations
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, &[]).map_err(DocumentStoreError::validation)?;

        for index in &self.indexes {
            if index.fields.is_empty() {
                return Err(DocumentStoreError::validation(format!(
                    "Index on table '{}' has no fields",
                    self.name
                )));
            }
            for field in &index.fields {
                validate_field_name(&field.name).map_err(DocumentStoreError::validation)?;
                if document::is_reserved(&field.name) {
                    return Err(DocumentStoreError::validation(format!(
                        "Reserved field '{}' cannot be indexed",
                        field.name
                    )));
                }
            }
            let names = index.field_names();
            if let Some(dup) = names
                .iter()
                .enumerate()
                .find(|(i, name)| names[..*i].contains(name))
            {
                return Err(DocumentStoreError::validation(format!(
                    "Field '{}' appears twice in an index on '{}'",
                    dup.1, self.name
                )));
            }
        }

        Ok(())
    }

    /// Turn a caller payload into a storable body.
    ///
    /// Strips reserved fields, fills defaults, rejects missing required
    /// fields and values that do not match a declared type.
    pub fn prepare(&self, payload: Document) -> Result<Document> {
        let mut body = document::strip_reserved(payload);

        for field in &self.fields {
            let present = body.get(&field.name).is_some_and(|v| !v.is_null());
            match &field.requirement {
                Requirement::Required if !present => {
                    return Err(DocumentStoreError::validation(format!(
                        "Required field '{}' is missing",
                        field.name
                    )));
                }
                Requirement::Default(value) if !present => {
                    body.insert(field.name.clone(), value.clone());
                }
                _ => {}
            }

            if let Some(value) = body.get(&field.name)
                && let Err(e) = field.field_type.validate_value(value)
            {
                return Err(DocumentStoreError::validation(format!(
                    "Invalid value for field '{}': {}",
                    field.name, e
                )));
            }
        }

        Ok(body)
    }

    /// Whether a criteria field is a column of the main table. Only reserved
    /// fields are; everything else lives in the body.
    pub(crate) fn is_main_table_field(name: &str) -> bool {
        document::is_reserved(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexDirection;
    use serde_json::{Value, json};

    fn posts() -> Table {
        Table::new("posts")
            .with_field(FieldDefinition::new("title", FieldType::String).required())
            .with_field(FieldDefinition::new("views", FieldType::Integer).default(0))
            .with_index(IndexDefinition::on(["author", "date"]))
            .with_index(IndexDefinition::on(["tags"]))
    }

    fn obj(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_table_builder() {
        let table = posts();
        assert_eq!(table.name, "posts");
        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.indexes.len(), 2);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_field_type_lookup() {
        let table = posts();
        assert_eq!(table.field_type("views"), FieldType::Integer);
        assert_eq!(table.field_type("undeclared"), FieldType::String);
        assert_eq!(table.field_type("_id"), FieldType::String);
        assert_eq!(table.field_type("_rowid"), FieldType::Integer);
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(Table::new("Bad-Name").validate().is_err());
        assert!(
            Table::new("t")
                .with_index(IndexDefinition::on(["_id"]))
                .validate()
                .is_err()
        );
        assert!(
            Table::new("t")
                .with_index(IndexDefinition::on(["a", "a"]))
                .validate()
                .is_err()
        );
        assert!(Table::new("t").with_index(IndexDefinition::new()).validate().is_err());
        assert!(
            Table::new("t")
                .with_index(IndexDefinition::on(["bad\"name"]))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_relational_indexes_skip_spatial() {
        let table = Table::new("places")
            .with_index(IndexDefinition::new().field("location", IndexDirection::Spatial))
            .with_index(IndexDefinition::on(["kind"]));

        let positions: Vec<usize> = table.relational_indexes().map(|(i, _)| i).collect();
        assert_eq!(positions, vec![1]);
        assert_eq!(table.index_table_names().len(), 1);
    }

    #[test]
    fn test_prepare_strips_reserved_and_applies_defaults() {
        let body = posts()
            .prepare(obj(json!({"_id": "forged", "_rowid": 1, "title": "Hello"})))
            .unwrap();

        assert_eq!(Value::Object(body), json!({"title": "Hello", "views": 0}));
    }

    #[test]
    fn test_prepare_rejects_missing_required() {
        let err = posts().prepare(obj(json!({"views": 3}))).unwrap_err();
        assert!(err.to_string().contains("Required field 'title'"));

        let err = posts().prepare(obj(json!({"title": null}))).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Validation(_)));
    }

    #[test]
    fn test_prepare_rejects_type_mismatch() {
        let err = posts()
            .prepare(obj(json!({"title": "x", "views": "many"})))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid value for field 'views'"));
    }

    #[test]
    fn test_table_deserialization() {
        let table: Table = serde_json::from_value(json!({
            "name": "posts",
            "indexes": [{"fields": [{"name": "author"}, {"name": "date", "direction": "desc"}]}]
        }))
        .unwrap();

        assert!(table.fields.is_empty());
        assert_eq!(table.indexes[0].fields[1].direction, IndexDirection::Desc);
    }
}

//! Core type definitions for Document Store
//!
//! Includes field types, field definitions, and index definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::sql::bind::SqlParam;

// ============================================================================
// Field Definitions
// ============================================================================

/// Field type hint, used to pick physical column types for index tables
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 64-bit integer
    Integer,
    /// Double precision float
    Float,
    /// Boolean
    Boolean,
    /// Bounded string (the default for undeclared fields)
    #[default]
    String,
    /// Geospatial point; not indexable on relational backends
    Point,
}

impl FieldType {
    /// Validate that a JSON value is compatible with this field type.
    ///
    /// Arrays are checked element by element since array values are expanded
    /// into one index row per element.
    pub fn validate_value(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (_, Value::Null) => Ok(()),
            (FieldType::Point, _) => Ok(()),
            (_, Value::Array(items)) => items.iter().try_for_each(|item| match item {
                Value::Array(_) => Err("Nested arrays are not allowed".to_string()),
                other => self.validate_value(other),
            }),
            _ => self.coerce(value).map(|_| ()),
        }
    }

    /// Convert a scalar JSON value into a typed SQL parameter.
    ///
    /// Strings are coerced to numbers and booleans where they parse cleanly,
    /// and any scalar is accepted by a `String` field.
    pub fn coerce(&self, value: &Value) -> Result<SqlParam, String> {
        match (self, value) {
            (_, Value::Null) => Err("NULL cannot be bound as a parameter".to_string()),
            (FieldType::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
                .map(SqlParam::Int)
                .ok_or_else(|| format!("Cannot convert '{}' to integer", n)),
            (FieldType::Integer, Value::String(s)) => s
                .parse::<i64>()
                .map(SqlParam::Int)
                .map_err(|_| format!("Cannot convert '{}' to integer", s)),
            (FieldType::Float, Value::Number(n)) => n
                .as_f64()
                .map(SqlParam::Float)
                .ok_or_else(|| format!("Cannot convert '{}' to float", n)),
            (FieldType::Float, Value::String(s)) => s
                .parse::<f64>()
                .map(SqlParam::Float)
                .map_err(|_| format!("Cannot convert '{}' to float", s)),
            (FieldType::Boolean, Value::Bool(b)) => Ok(SqlParam::Bool(*b)),
            (FieldType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(SqlParam::Bool(true)),
                "false" | "0" | "no" => Ok(SqlParam::Bool(false)),
                _ => Err(format!("Cannot convert '{}' to boolean", s)),
            },
            (FieldType::String, Value::String(s)) => Ok(SqlParam::Text(s.clone())),
            (FieldType::String, Value::Number(n)) => Ok(SqlParam::Text(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Ok(SqlParam::Text(b.to_string())),
            (FieldType::String, Value::Object(_)) => Ok(SqlParam::Text(value.to_string())),
            (FieldType::Point, _) => {
                Err("Point values cannot be stored in relational index tables".to_string())
            }
            _ => Err(format!(
                "Type mismatch: expected {:?}, got {}",
                self, value
            )),
        }
    }
}

/// Required-field constraint for a declared field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Requirement {
    /// Field may be absent
    #[default]
    Optional,
    /// Field must be present and non-null
    Required,
    /// Field takes this value when absent
    Default(Value),
}

/// Field definition for a table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,

    /// Type hint
    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Required-ness (default: optional)
    #[serde(default)]
    pub requirement: Requirement,
}

impl FieldDefinition {
    /// Create a new optional field definition
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            requirement: Requirement::Optional,
        }
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.requirement = Requirement::Required;
        self
    }

    /// Give the field a default value used when it is absent
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.requirement = Requirement::Default(value.into());
        self
    }
}

// ============================================================================
// Index Definitions
// ============================================================================

/// Per-field index type hint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    #[default]
    Asc,
    Desc,
    Spatial,
}

/// One field of an index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexField {
    pub name: String,
    #[serde(default)]
    pub direction: IndexDirection,
}

impl IndexField {
    pub fn new(name: impl Into<String>, direction: IndexDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.direction == IndexDirection::Spatial
    }
}

/// Index definition: an ordered field list.
///
/// Field order is significant; it decides which queries the index can
/// answer (see [`crate::planner`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDefinition {
    pub fields: Vec<IndexField>,
}

impl IndexDefinition {
    /// Create an ascending index over the given fields
    pub fn on<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|name| IndexField::new(name, IndexDirection::Asc))
                .collect(),
        }
    }

    /// Create an empty index, to be extended with [`IndexDefinition::field`]
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field with an explicit direction
    pub fn field(mut self, name: impl Into<String>, direction: IndexDirection) -> Self {
        self.fields.push(IndexField::new(name, direction));
        self
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn has_spatial_field(&self) -> bool {
        self.fields.iter().any(IndexField::is_spatial)
    }

    /// Physical index table name.
    ///
    /// Derived from the table name and the field list only, so repeated
    /// declarations of the same index resolve to the same table.
    pub fn physical_name(&self, table_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(table_name.as_bytes());
        hasher.update(b":");
        hasher.update(self.field_names().join(",").as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
        format!("{}__{}", table_name, hex)
    }
}

impl Default for IndexDefinition {
    fn default() -> Self {
        Self::new()
    }
}

//! DDL Generation for main and index tables
//!
//! Generates backend-specific DDL for a document table and its synthetic
//! index tables.

use crate::backend::Backend;
use crate::document::{BODY_COLUMN, CREATED_FIELD, ID_FIELD, ID_LENGTH, ROWID_FIELD, UPDATED_FIELD};
use crate::error::Result;
use crate::sql::sanitize::quote_identifier;
use crate::table::Table;
use crate::types::IndexDefinition;

/// DDL Generator for document tables
pub struct DdlGenerator {
    backend: Backend,
}

impl DdlGenerator {
    /// Create a new DDL generator for the given backend
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Generate CREATE TABLE for a main table
    ///
    /// Columns: `_rowid` (auto-increment key), `_id` (unique document id),
    /// `_created`/`_updated` (unix seconds) and the encoded `_body`.
    pub fn generate_create_table(&self, table_name: &str) -> String {
        let column_defs = [
            format!(
                "{} {}",
                quote_identifier(ROWID_FIELD),
                self.backend.rowid_column()
            ),
            format!(
                "{} VARCHAR({}) NOT NULL UNIQUE",
                quote_identifier(ID_FIELD),
                ID_LENGTH
            ),
            format!("{} BIGINT NOT NULL", quote_identifier(CREATED_FIELD)),
            format!("{} BIGINT NOT NULL", quote_identifier(UPDATED_FIELD)),
            format!(
                "{} {} NOT NULL",
                quote_identifier(BODY_COLUMN),
                self.backend.blob_type()
            ),
        ];

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(table_name),
            column_defs.join(", ")
        )
    }

    /// Generate CREATE TABLE for an index table
    ///
    /// One typed column per indexed field, `_id` referencing the main table
    /// with cascading deletes, and a uniqueness constraint over
    /// `(fields..., _id)`. Indexed columns stay nullable because fields
    /// missing from a document are not written.
    pub fn generate_create_index_table(
        &self,
        table: &Table,
        index: &IndexDefinition,
    ) -> Result<String> {
        let mut column_defs = Vec::with_capacity(index.fields.len() + 2);
        let mut key_columns = Vec::with_capacity(index.fields.len() + 1);

        for field in &index.fields {
            let sql_type = self.backend.column_type(table.field_type(&field.name))?;
            column_defs.push(format!("{} {}", quote_identifier(&field.name), sql_type));
            key_columns.push(quote_identifier(&field.name));
        }

        column_defs.push(format!(
            "{} VARCHAR({}) NOT NULL REFERENCES {}({}) ON DELETE CASCADE",
            quote_identifier(ID_FIELD),
            ID_LENGTH,
            quote_identifier(&table.name),
            quote_identifier(ID_FIELD)
        ));
        key_columns.push(quote_identifier(ID_FIELD));
        column_defs.push(format!("UNIQUE ({})", key_columns.join(", ")));

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&index.physical_name(&table.name)),
            column_defs.join(", ")
        ))
    }

    /// Generate a lookup index on `_id` for an index table, so per-document
    /// deletes do not scan
    pub fn generate_id_lookup_index(&self, index_table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            quote_identifier(&format!("{}_id", index_table)),
            quote_identifier(index_table),
            quote_identifier(ID_FIELD)
        )
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, table_name: &str) -> String {
        let cascade = match self.backend {
            Backend::Postgres => " CASCADE",
            Backend::Sqlite => "",
        };
        format!("DROP TABLE IF EXISTS {}{}", quote_identifier(table_name), cascade)
    }
}

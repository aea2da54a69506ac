//! Relational backends
//!
//! Statements run through `sqlx::Any`; everything that differs between
//! engines (column types, missing-table error codes, catalog probes, LIMIT
//! syntax) is answered here.

use crate::error::{DocumentStoreError, Result};
use crate::types::FieldType;

/// PostgreSQL SQLSTATE for `undefined_table`
const PG_UNDEFINED_TABLE: &str = "42P01";

/// Supported relational engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    /// Select the backend from a database URL scheme
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            Err(DocumentStoreError::Connection(format!(
                "Unsupported database URL scheme: {}",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Sqlite => "sqlite",
        }
    }

    /// Native column type for an indexed field
    pub fn column_type(&self, field_type: FieldType) -> Result<&'static str> {
        match (self, field_type) {
            (Backend::Postgres, FieldType::Integer) => Ok("BIGINT"),
            (Backend::Sqlite, FieldType::Integer) => Ok("INTEGER"),
            (Backend::Postgres, FieldType::Float) => Ok("DOUBLE PRECISION"),
            (Backend::Sqlite, FieldType::Float) => Ok("REAL"),
            (_, FieldType::Boolean) => Ok("BOOLEAN"),
            (_, FieldType::String) => Ok("VARCHAR(255)"),
            (_, FieldType::Point) => Err(DocumentStoreError::unsupported(format!(
                "spatial columns are not supported on {}",
                self.name()
            ))),
        }
    }

    /// Auto-incrementing primary key declaration for `_rowid`
    pub fn rowid_column(&self) -> &'static str {
        match self {
            Backend::Postgres => "BIGSERIAL PRIMARY KEY",
            Backend::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    pub fn blob_type(&self) -> &'static str {
        match self {
            Backend::Postgres => "BYTEA",
            Backend::Sqlite => "BLOB",
        }
    }

    /// Catalog probe taking the table name as `$1` and returning a count
    pub fn table_exists_sql(&self) -> &'static str {
        match self {
            Backend::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
            Backend::Sqlite => "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
        }
    }

    /// Whether an error means a table (main or index) does not exist yet
    pub fn is_missing_schema(&self, err: &sqlx::Error) -> bool {
        let sqlx::Error::Database(db_err) = err else {
            return false;
        };
        match self {
            Backend::Postgres => db_err.code().as_deref() == Some(PG_UNDEFINED_TABLE),
            Backend::Sqlite => db_err.message().contains("no such table"),
        }
    }

    /// `LIMIT`/`OFFSET` suffix with inlined integers
    pub fn limit_clause(&self, limit: Option<u64>, offset: u64) -> String {
        let limit = limit.map(clamp_i64);
        let offset = clamp_i64(offset);
        match (limit, offset, self) {
            (None, 0, _) => String::new(),
            (Some(limit), 0, _) => format!(" LIMIT {}", limit),
            (Some(limit), offset, _) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (None, offset, Backend::Postgres) => format!(" OFFSET {}", offset),
            (None, offset, Backend::Sqlite) => format!(" LIMIT -1 OFFSET {}", offset),
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

//! SQL Identifier Sanitization Utilities
//!
//! Table names and field names end up inside generated DDL and queries, so
//! they are validated on the way in and always quoted on the way out.

use regex::Regex;

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ANALYSE",
    "ANALYZE",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASYMMETRIC",
    "BOTH",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CURRENT_CATALOG",
    "CURRENT_DATE",
    "CURRENT_ROLE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "DEFAULT",
    "DEFERRABLE",
    "DESC",
    "DISTINCT",
    "DO",
    "ELSE",
    "END",
    "EXCEPT",
    "FALSE",
    "FETCH",
    "FOR",
    "FOREIGN",
    "FROM",
    "GRANT",
    "GROUP",
    "HAVING",
    "IN",
    "INITIALLY",
    "INTERSECT",
    "INTO",
    "LATERAL",
    "LEADING",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "ONLY",
    "OR",
    "ORDER",
    "PLACING",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SESSION_USER",
    "SOME",
    "SYMMETRIC",
    "TABLE",
    "THEN",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNIQUE",
    "USER",
    "USING",
    "VARIADIC",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

/// Longest accepted table name; index table names append 14 characters and
/// PostgreSQL truncates identifiers beyond 63 bytes.
pub const MAX_TABLE_NAME_LEN: usize = 48;

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use runtara_document_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("posts"), "\"posts\"");
/// assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a table name
///
/// Rules:
/// - Must start with a lowercase letter
/// - Can only contain lowercase letters, numbers, and underscores
/// - At most [`MAX_TABLE_NAME_LEN`] characters
/// - Cannot be a PostgreSQL reserved word
/// - Cannot be one of `reserved` (case-sensitive)
///
/// # Example
/// ```
/// use runtara_document_store::sql::validate_identifier;
///
/// assert!(validate_identifier("posts", &[]).is_ok());
/// assert!(validate_identifier("select", &[]).is_err());
/// assert!(validate_identifier("posts", &["posts"]).is_err());
/// ```
pub fn validate_identifier(name: &str, reserved: &[&str]) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(format!(
            "Identifier '{}' is longer than {} characters.",
            name, MAX_TABLE_NAME_LEN
        ));
    }

    let re = Regex::new(r"^[a-z][a-z0-9_]*$").map_err(|e| e.to_string())?;
    if !re.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    if reserved.contains(&name) {
        return Err(format!("Name '{}' is reserved and cannot be used.", name));
    }

    Ok(())
}

/// Validate a document field name used as an index column
///
/// Field names are quoted in SQL, so only characters that would make a
/// confusing column name are rejected.
pub fn validate_field_name(field: &str) -> Result<(), String> {
    if field.is_empty() {
        return Err("Field name cannot be empty".to_string());
    }
    if !field
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("Field name '{}' contains invalid characters", field));
    }
    Ok(())
}

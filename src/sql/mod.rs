//! SQL utilities for Document Store
//!
//! Provides SQL generation, sanitization, and parameter binding utilities.

pub mod bind;
pub mod condition;
pub mod ddl;
pub mod sanitize;

pub use bind::{SqlParam, bind_all, bind_param};
pub use condition::{CompiledFilter, build_order_by_clause, build_where_clause};
pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, validate_identifier};

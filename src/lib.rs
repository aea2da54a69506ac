//! # runtara-document-store
//!
//! A schemaless document store on top of relational databases.
//!
//! Documents are stored as an encoded body in a main table. Every declared
//! index is materialized as its own table of typed columns, and queries are
//! routed to the index whose field list starts with the queried fields.
//!
//! ## Features
//!
//! - **Criteria Queries**: `is`/`not`/`gt`/`gte`/`lt`/`lte`/`in`/`nin`/`between`, multi-key sorting, limit/offset/page
//! - **Synthetic Index Tables**: Maintained on every write, with array fields expanded into one row per element
//! - **Transactional Writes**: Insert, update and each delete batch are atomic
//! - **Self-Healing Reads**: Index entries pointing at missing documents are dropped and cleaned up
//! - **Schema Repair**: Missing tables are created on demand and the failed call is replayed once
//! - **SQL Injection Prevention**: All identifiers are properly quoted and validated
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtara_document_store::{
//!     Criteria, DocumentStore, IndexDefinition, SortDirection, StoreConfig, Table,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::builder("postgres://localhost/mydb").build();
//!     let store = DocumentStore::connect(config).await?;
//!
//!     let posts = Table::new("posts")
//!         .with_index(IndexDefinition::on(["author", "date"]))
//!         .with_index(IndexDefinition::on(["tags"]));
//!     store.ensure_table(&posts).await?;
//!
//!     let stored = store
//!         .insert(
//!             &posts,
//!             serde_json::json!({
//!                 "author": "ada",
//!                 "date": "1843-07-10",
//!                 "tags": ["engines", "notes"]
//!             }),
//!         )
//!         .await?;
//!     println!("stored {}", stored["_id"]);
//!
//!     let page = store
//!         .get_page(
//!             &posts,
//!             &Criteria::new()
//!                 .is("author", "ada")
//!                 .sort("date", SortDirection::Desc)
//!                 .limit(10),
//!         )
//!         .await?;
//!     println!("{} documents, more: {}", page.documents.len(), page.has_more);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use runtara_document_store::StoreConfig;
//!
//! let config = StoreConfig::builder("sqlite::memory:")
//!     .max_connections(1)
//!     .batch_size(100)             // Ids per delete/fetch/backfill batch (default)
//!     .verbose_diagnostics(true)   // List declared indexes in planner errors
//!     .build();
//! ```
//!
//! ## Backends
//!
//! PostgreSQL and SQLite are supported through `sqlx::Any`. Document
//! databases skip the planner entirely; see [`native::translate`].

pub mod backend;
pub mod codec;
pub mod config;
pub mod criteria;
pub mod document;
pub mod error;
pub mod maintainer;
pub mod native;
pub mod planner;
mod repair;
pub mod sql;
pub mod store;
pub mod table;
pub mod types;

// Re-export main types for convenience
pub use backend::Backend;
pub use codec::{BodyCodec, CompressedJsonCodec, JsonCodec};
pub use config::{StoreConfig, StoreConfigBuilder};
pub use criteria::{Bounds, Command, Criteria, SortDirection};
pub use document::Document;
pub use error::{DocumentStoreError, Result};
pub use native::{NativeQuery, translate};
pub use planner::{Plan, Target, resolve_target};
pub use store::{DocumentStore, Page};
pub use table::Table;
pub use types::{FieldDefinition, FieldType, IndexDefinition, IndexDirection, IndexField, Requirement};

// Re-export SQL utilities for advanced users
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};

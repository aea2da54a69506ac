//! Documents and engine-managed reserved fields

use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::{Map, Value};

/// A schemaless document: an ordered field → value map
pub type Document = Map<String, Value>;

/// Globally unique document id (at most [`ID_LENGTH`] characters)
pub const ID_FIELD: &str = "_id";
/// Backend-assigned monotonic row number
pub const ROWID_FIELD: &str = "_rowid";
/// Unix timestamp of the insert
pub const CREATED_FIELD: &str = "_created";
/// Unix timestamp of the last write
pub const UPDATED_FIELD: &str = "_updated";
/// Main-table column holding the encoded body; never exposed on documents
pub const BODY_COLUMN: &str = "_body";

pub const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, ROWID_FIELD, CREATED_FIELD, UPDATED_FIELD];

/// Length of generated ids
pub const ID_LENGTH: usize = 24;

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Generate a fresh 24-character hex id.
///
/// Layout: 8 hex digits of unix seconds, 6 of a process-wide counter and 10
/// random, so ids from one process sort roughly by creation time. Collisions
/// are not re-checked.
pub fn generate_id() -> String {
    let secs = chrono::Utc::now().timestamp() as u32;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{:08x}{:06x}{}", secs, counter, &random[..10])
}

/// Remove reserved fields from a caller payload, leaving the body
pub fn strip_reserved(mut document: Document) -> Document {
    for field in RESERVED_FIELDS {
        document.remove(field);
    }
    document
}

/// Metadata the engine attaches to every stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMeta {
    pub id: String,
    pub rowid: i64,
    pub created: i64,
    pub updated: i64,
}

/// Build the caller-facing document: reserved fields first, then the body
pub fn attach_reserved(meta: &RowMeta, body: Document) -> Document {
    let mut document = Map::with_capacity(body.len() + RESERVED_FIELDS.len());
    document.insert(ID_FIELD.to_string(), Value::String(meta.id.clone()));
    document.insert(ROWID_FIELD.to_string(), Value::from(meta.rowid));
    document.insert(CREATED_FIELD.to_string(), Value::from(meta.created));
    document.insert(UPDATED_FIELD.to_string(), Value::from(meta.updated));
    document.extend(body);
    document
}

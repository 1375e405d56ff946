//! Represents a binary object (e.g. a product image) held by the content store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Content type recorded when the uploader does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Opaque identifier handed out by the content store on write.
///
/// Products carry it as a weak reference: the database never enforces that
/// the object still exists, the catalog service does.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Metadata of a fully written object.
///
/// A row only exists once every chunk is durable on disk, so anything that
/// can be looked up here can be read back completely.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Identifier generated by the store.
    pub id: ObjectId,

    /// Caller-supplied filename, possibly empty.
    pub original_name: String,

    /// MIME type declared at upload time (or the octet-stream default).
    pub content_type: String,

    /// Total byte length.
    pub length: i64,

    /// Size of every chunk except possibly the last one.
    pub chunk_size: i64,

    /// Number of chunk files backing this object.
    pub chunk_count: i64,

    /// MD5 hex digest of the full content.
    pub md5: String,

    /// When the object was published.
    pub uploaded_at: DateTime<Utc>,
}

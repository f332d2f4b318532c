//! The `LocalRecord` envelope the engine moves records in.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::EntityKind;
use crate::util::unix_millis_now;

/// Prefix marking records created offline, before the backend has
/// confirmed them.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Generate an id for a record created offline, using UUID v7
/// (time-sortable) behind the local prefix.
#[must_use]
pub fn new_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7())
}

/// Whether an id was generated offline and has no server identity yet.
#[must_use]
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// A record as held by the local store: an opaque id, the camelCase JSON
/// payload, and the sync bookkeeping flags.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Opaque record identifier (`local-`-prefixed until first upload)
    pub id: String,
    /// Entity fields, camelCase, hierarchical local shape
    pub payload: Map<String, Value>,
    /// Last local mutation (Unix ms); sole input to conflict resolution
    pub updated_at: i64,
    /// Mutated since last confirmed sync
    pub dirty: bool,
    /// Tombstone awaiting remote deletion
    pub deleted: bool,
}

impl LocalRecord {
    /// Wrap a freshly created payload; marked dirty and stamped now.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            payload,
            updated_at: unix_millis_now(),
            dirty: true,
            deleted: false,
        }
    }

    /// Read a payload field as a non-empty string.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.payload
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// The parent id this record references, per its kind's tree edge.
    #[must_use]
    pub fn parent_id(&self, kind: EntityKind) -> Option<&str> {
        self.field_str(kind.parent_field()?)
    }

    /// Whether the record still carries an offline-generated id.
    #[must_use]
    pub fn has_local_id(&self) -> bool {
        is_local_id(&self.id)
    }
}

/// Seam between the typed entity structs and the record envelope.
///
/// Implementations only name their kind and accessors; the conversions
/// are shared.
pub trait Entity: Serialize + DeserializeOwned {
    /// The kind (and therefore table) this entity syncs through.
    const KIND: EntityKind;

    /// Record identifier.
    fn id(&self) -> &str;

    /// Last modification timestamp (Unix ms).
    fn updated_at(&self) -> i64;

    /// Convert into the store envelope. Marked dirty.
    fn to_record(&self) -> Result<LocalRecord> {
        let Value::Object(payload) = serde_json::to_value(self)? else {
            return Err(Error::InvalidInput(format!(
                "{} did not serialize to an object",
                Self::KIND
            )));
        };
        Ok(LocalRecord {
            id: self.id().to_string(),
            payload,
            updated_at: self.updated_at(),
            dirty: true,
            deleted: false,
        })
    }

    /// Rebuild the typed entity from a store envelope.
    fn from_record(record: &LocalRecord) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(record.payload.clone()))?)
    }
}

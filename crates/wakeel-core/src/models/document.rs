//! Case document metadata. The binary payload lives in the store's blob
//! table locally and in object storage remotely; the metadata row and the
//! blob always move together.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// Metadata for a document attached to a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseDocument {
    /// Unique identifier
    pub id: String,
    /// Owning case id
    pub case_id: String,
    /// Original file name
    pub file_name: String,
    /// MIME type, when known
    pub content_type: Option<String>,
    /// Object-storage path of the blob
    pub storage_path: String,
    /// Blob size in bytes
    pub size: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl CaseDocument {
    /// Create metadata for a document captured offline. The storage path
    /// is derived up front so blob and row always agree on it.
    #[must_use]
    pub fn new(case_id: impl Into<String>, file_name: impl Into<String>, size: i64) -> Self {
        let now = unix_millis_now();
        let id = new_local_id();
        let case_id = case_id.into();
        let file_name = sanitize_file_name(&file_name.into());
        let storage_path = format!("cases/{case_id}/{id}-{file_name}");
        Self {
            id,
            case_id,
            file_name,
            content_type: None,
            storage_path,
            size,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for CaseDocument {
    fn default() -> Self {
        Self::new("", "", 0)
    }
}

impl Entity for CaseDocument {
    const KIND: EntityKind = EntityKind::CaseDocument;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// Strip path separators and control characters from a file name so it is
/// safe inside an object key.
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

//! Assistant model, keyed remotely by `(owner, name)` rather than id.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// An office assistant account.
///
/// The backend deduplicates assistants by owner and name; the id only
/// addresses the row in the local store. Rows synced down without an
/// `updated_at` compare as 0, so the remote copy wins any ambiguous
/// conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Assistant {
    /// Local row identifier
    pub id: String,
    /// Assistant name, half of the natural key
    pub name: String,
    /// Contact phone number
    pub phone: Option<String>,
    /// Role description
    pub role: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Assistant {
    /// Create a new assistant.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            name: name.into().trim().to_string(),
            phone: None,
            role: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Assistant {
    fn default() -> Self {
        Self::new("")
    }
}

impl Entity for Assistant {
    const KIND: EntityKind = EntityKind::Assistant;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_uses_natural_conflict_key() {
        assert_eq!(EntityKind::Assistant.conflict_key(), "owner_id,name");
        let assistant = Assistant::new("  Huda  ");
        assert_eq!(assistant.name, "Huda");
    }
}

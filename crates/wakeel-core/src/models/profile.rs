//! Owner profile model, tier zero of the upload order.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// The account profile of the office owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Contact phone number
    pub phone: Option<String>,
    /// Office name shown on printed material
    pub office_name: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Profile {
    /// Create a new profile.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            display_name: display_name.into().trim().to_string(),
            phone: None,
            office_name: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new("")
    }
}

impl Entity for Profile {
    const KIND: EntityKind = EntityKind::Profile;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

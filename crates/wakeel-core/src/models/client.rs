//! Client model, the root of the case hierarchy.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// A client of the office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Client {
    /// Unique identifier (`local-`-prefixed until first upload)
    pub id: String,
    /// Client display name
    pub name: String,
    /// Contact phone number
    pub phone: Option<String>,
    /// Contact email address
    pub email: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Client {
    /// Create a new client, created offline until first sync.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            name: name.into().trim().to_string(),
            phone: None,
            email: None,
            address: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new("")
    }
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

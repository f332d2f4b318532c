//! The case hierarchy: cases, their stages, and court sessions.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// A legal case belonging to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Case {
    /// Unique identifier
    pub id: String,
    /// Owning client id
    pub client_id: String,
    /// Case subject; a default is synthesized at upload when left empty
    pub subject: String,
    /// Registry number assigned by the court
    pub case_number: Option<String>,
    /// Court the case is filed at
    pub court: Option<String>,
    /// Opposing party name
    pub opponent: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Case {
    /// Create a new case under the given client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, subject: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            client_id: client_id.into(),
            subject: subject.into().trim().to_string(),
            case_number: None,
            court: None,
            opponent: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Case {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Entity for Case {
    const KIND: EntityKind = EntityKind::Case;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// A procedural stage of a case (first instance, appeal, cassation...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stage {
    /// Unique identifier
    pub id: String,
    /// Owning case id
    pub case_id: String,
    /// Court hearing this stage; a default is synthesized when empty
    pub court: String,
    /// Registry number for this stage
    pub case_number: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Stage {
    /// Create a new stage under the given case.
    #[must_use]
    pub fn new(case_id: impl Into<String>, court: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            case_id: case_id.into(),
            court: court.into().trim().to_string(),
            case_number: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Entity for Stage {
    const KIND: EntityKind = EntityKind::Stage;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// A court session scheduled within a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    /// Unique identifier
    pub id: String,
    /// Owning stage id
    pub stage_id: String,
    /// Session date (RFC 3339); invalid values are coerced to now at upload
    pub date: String,
    /// What happened or is requested at this session
    pub notes: Option<String>,
    /// Decision issued at the session, if any
    pub decision: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Session {
    /// Create a new session under the given stage.
    #[must_use]
    pub fn new(stage_id: impl Into<String>, date: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            stage_id: stage_id.into(),
            date: date.into().trim().to_string(),
            notes: None,
            decision: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Entity for Session {
    const KIND: EntityKind = EntityKind::Session;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

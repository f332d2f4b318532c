//! Owner-scoped scheduling models: administrative tasks and appointments.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// An administrative errand (filing, registry visit, paperwork), ordered
/// within a location group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminTask {
    /// Unique identifier
    pub id: String,
    /// What has to be done
    pub title: String,
    /// Explicit ordering index within the location group
    pub sort_order: i64,
    /// Grouping key (courthouse, registry office...)
    pub location: Option<String>,
    /// Completion flag
    pub done: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl AdminTask {
    /// Create a new task at the end of the given location group.
    #[must_use]
    pub fn new(title: impl Into<String>, sort_order: i64) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            title: title.into().trim().to_string(),
            sort_order,
            location: None,
            done: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AdminTask {
    fn default() -> Self {
        Self::new("", 0)
    }
}

impl Entity for AdminTask {
    const KIND: EntityKind = EntityKind::AdminTask;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// A calendar appointment with a reminder lead time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Appointment {
    /// Unique identifier
    pub id: String,
    /// Appointment title
    pub title: String,
    /// Scheduled time (RFC 3339); coerced to now at upload when invalid
    pub date: String,
    /// Reminder lead time in minutes before the appointment
    pub reminder_minutes: i64,
    /// Free-form notes
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Appointment {
    /// Create a new appointment.
    #[must_use]
    pub fn new(title: impl Into<String>, date: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            title: title.into().trim().to_string(),
            date: date.into().trim().to_string(),
            reminder_minutes: 30,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Appointment {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Entity for Appointment {
    const KIND: EntityKind = EntityKind::Appointment;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

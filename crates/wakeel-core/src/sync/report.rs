//! Pass reports and the observable pass state.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::util::unix_millis_now;

/// Where a reconciliation pass currently is. Observable by the UI for a
/// non-blocking status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Idle,
    Probing,
    Pulling,
    Reconciling,
    Uploading,
    Deleting,
    Failed,
}

/// Per-table outcome counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Rows confirmed upserted remotely
    pub uploaded: usize,
    /// Rows merged down from the backend
    pub merged: usize,
    /// Rows removed (remotely confirmed, or locally after a remote
    /// deletion elsewhere)
    pub deleted: usize,
    /// Rows excluded this pass (orphans, mapping failures, skipped
    /// descendants); they stay dirty and retry next pass
    pub skipped: usize,
}

/// A captured per-table failure. Issues land in the report instead of
/// aborting the pass, so one table's failure never blocks the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncIssue {
    /// Table the failure belongs to
    pub table: String,
    /// Human-readable description
    pub message: String,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Pass start (Unix ms)
    pub started_at: i64,
    /// Pass end (Unix ms); 0 until the pass finishes
    pub finished_at: i64,
    /// Outcome counts per table
    pub tables: BTreeMap<String, TableSummary>,
    /// Captured per-table failures
    pub issues: Vec<SyncIssue>,
    /// The trigger found a pass already in flight and did nothing
    pub coalesced: bool,
    /// The pass was abandoned before completing
    pub cancelled: bool,
}

impl SyncReport {
    /// An empty report for a pass that is about to run.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: unix_millis_now(),
            finished_at: 0,
            tables: BTreeMap::new(),
            issues: Vec::new(),
            coalesced: false,
            cancelled: false,
        }
    }

    /// The report returned to a trigger that was coalesced into an
    /// in-flight pass.
    #[must_use]
    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::new()
        }
    }

    /// Counts for a table, creating the entry on first touch.
    pub fn table_mut(&mut self, table: &str) -> &mut TableSummary {
        self.tables.entry(table.to_string()).or_default()
    }

    /// Record a captured failure.
    pub fn push_issue(&mut self, table: &str, message: impl Into<String>) {
        self.issues.push(SyncIssue {
            table: table.to_string(),
            message: message.into(),
        });
    }

    /// Whether any per-table failure was captured.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Total rows uploaded across tables.
    #[must_use]
    pub fn total_uploaded(&self) -> usize {
        self.tables.values().map(|summary| summary.uploaded).sum()
    }

    /// Stamp the pass as finished now.
    pub fn finish(&mut self) {
        self.finished_at = unix_millis_now();
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one document (blob) reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// Pairs downloaded from the backend
    pub downloaded: usize,
    /// Offline-created pairs uploaded
    pub uploaded: usize,
    /// Local pairs removed because their metadata vanished remotely
    pub removed: usize,
    /// Orphaned remote blobs deleted after a failed metadata insert
    pub orphans_cleaned: usize,
    /// Captured per-document failures
    pub issues: Vec<SyncIssue>,
    /// The trigger found a pass already in flight and did nothing
    pub coalesced: bool,
}

impl DocumentReport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            downloaded: 0,
            uploaded: 0,
            removed: 0,
            orphans_cleaned: 0,
            issues: Vec::new(),
            coalesced: false,
        }
    }

    /// The report returned to a coalesced trigger.
    #[must_use]
    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::new()
        }
    }

    /// Record a captured failure.
    pub fn push_issue(&mut self, document: &str, message: impl Into<String>) {
        self.issues.push(SyncIssue {
            table: document.to_string(),
            message: message.into(),
        });
    }
}

impl Default for DocumentReport {
    fn default() -> Self {
        Self::new()
    }
}

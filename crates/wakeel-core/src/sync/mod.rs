//! The offline-first synchronization engine.
//!
//! A pass moves `Idle → Probing → Pulling → Reconciling → Uploading →
//! Deleting → Idle`; probe failures short-circuit through `Failed`. All
//! per-table trouble lands in the pass report, never as an error.

mod documents;
mod integrity;
mod pipeline;
mod probe;
mod reconciler;
mod report;

pub use integrity::{filter_uploadable, KnownValid};
pub use pipeline::CancelHandle;
pub use probe::ProbeStatus;
pub use reconciler::SyncEngine;
pub use report::{DocumentReport, SyncIssue, SyncReport, SyncState, TableSummary};

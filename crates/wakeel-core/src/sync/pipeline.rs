//! Upload and deletion pipelines: one generic chunked-upsert-with-backoff
//! primitive, walked over the table dependency tiers.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::mapper::{self, Row};
use crate::models::{EntityKind, LocalRecord};
use crate::remote::RemoteAdapter;
use crate::store::LocalStore;
use crate::sync::report::SyncReport;

/// Records per network call. Kept low to bound the blast radius of one
/// failed call on constrained connections.
pub(crate) const CHUNK_SIZE: usize = 5;

/// Attempts per chunk before the table's pass is abandoned.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles on each further attempt.
pub(crate) const BASE_DELAY: Duration = Duration::from_millis(500);

/// Handle for abandoning an in-flight pass. Cancellation stops new
/// network calls; completed idempotent upserts are not rolled back.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the in-flight pass to stop issuing network calls.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the handle at the start of a new pass.
    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Per-pass stop conditions checked before every network call.
pub(crate) struct PassControl {
    cancel: CancelHandle,
    deadline: Instant,
}

impl PassControl {
    pub(crate) fn new(cancel: CancelHandle, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }
}

/// What one table's walk produced, merged into the pass report.
struct TableOutcome {
    kind: EntityKind,
    uploaded: usize,
    deleted: usize,
    skipped: usize,
    issues: Vec<String>,
    /// Terminal failure: descendants of this table are skipped this pass
    failed: bool,
    cancelled: bool,
}

impl TableOutcome {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            uploaded: 0,
            deleted: 0,
            skipped: 0,
            issues: Vec::new(),
            failed: false,
            cancelled: false,
        }
    }

    fn merge_into(self, report: &mut SyncReport) -> bool {
        let summary = report.table_mut(self.kind.table());
        summary.uploaded += self.uploaded;
        summary.deleted += self.deleted;
        summary.skipped += self.skipped;
        for message in self.issues {
            report.push_issue(self.kind.table(), message);
        }
        if self.cancelled {
            report.cancelled = true;
        }
        self.failed
    }
}

/// Upsert one chunk, retrying transient failures with doubling backoff.
async fn upsert_chunk_with_retry<R: RemoteAdapter>(
    remote: &R,
    table: &str,
    rows: &[Row],
    conflict_key: &str,
    ctl: &PassControl,
) -> Result<Vec<Row>> {
    let mut delay = BASE_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        if ctl.should_stop() {
            return Err(Error::Cancelled);
        }
        match remote.upsert(table, rows, conflict_key).await {
            Ok(returned) => return Ok(returned),
            Err(error) => {
                if attempt >= MAX_ATTEMPTS || !error.is_transient() {
                    return Err(error);
                }
                tracing::warn!(
                    table,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "chunk upsert failed; backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Delete one chunk of ids, with the same retry envelope as uploads.
async fn delete_chunk_with_retry<R: RemoteAdapter>(
    remote: &R,
    table: &str,
    ids: &[String],
    ctl: &PassControl,
) -> Result<()> {
    let mut delay = BASE_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        if ctl.should_stop() {
            return Err(Error::Cancelled);
        }
        match remote.delete(table, "id", ids).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                if attempt >= MAX_ATTEMPTS || !error.is_transient() {
                    return Err(error);
                }
                tracing::warn!(
                    table,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "chunk delete failed; backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Walk the upload plan tier by tier. Tables within a tier run
/// concurrently; a tier only starts once the previous one has finished.
/// A table that fails terminally takes its descendants out of this pass
/// (they would only orphan-reject) but never blocks unrelated tables.
pub(crate) async fn run_upload<R: RemoteAdapter>(
    remote: &R,
    store: &Mutex<LocalStore>,
    owner: Option<&str>,
    mut plan: BTreeMap<EntityKind, Vec<String>>,
    ctl: &PassControl,
    report: &mut SyncReport,
) {
    let mut failed: HashSet<EntityKind> = HashSet::new();

    for tier in EntityKind::UPLOAD_TIERS {
        let mut tasks = Vec::new();
        for kind in *tier {
            let Some(ids) = plan.remove(kind) else {
                continue;
            };
            if ids.is_empty() {
                continue;
            }
            if failed.iter().any(|ancestor| ancestor.is_ancestor_of(*kind)) {
                let summary = report.table_mut(kind.table());
                summary.skipped += ids.len();
                report.push_issue(kind.table(), "skipped: ancestor table failed this pass");
                continue;
            }
            tasks.push(upload_table(remote, store, owner, *kind, ids, ctl));
        }

        for outcome in join_all(tasks).await {
            let kind = outcome.kind;
            if outcome.merge_into(report) {
                failed.insert(kind);
            }
        }

        if report.cancelled {
            break;
        }
    }
}

/// Upload one table: map, chunk, upsert with retry, then stamp rows
/// synced (rewriting server-assigned ids, cascading to children).
async fn upload_table<R: RemoteAdapter>(
    remote: &R,
    store: &Mutex<LocalStore>,
    owner: Option<&str>,
    kind: EntityKind,
    ids: Vec<String>,
    ctl: &PassControl,
) -> TableOutcome {
    let table = kind.table();
    let mut outcome = TableOutcome::new(kind);

    // Re-read staged rows so foreign keys rewritten by earlier tiers are
    // picked up.
    let records: Vec<LocalRecord> = {
        let store = store.lock().await;
        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            match store.get(kind, id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) => {
                    outcome.issues.push(format!("read failed for {id}: {error}"));
                }
            }
        }
        records
    };

    let mut staged: Vec<(LocalRecord, Row)> = Vec::with_capacity(records.len());
    for record in records {
        match mapper::to_remote(kind, &record, owner) {
            Ok(row) => staged.push((record, row)),
            Err(error) => {
                // Malformed records stay dirty; they are never silently
                // dropped forever.
                tracing::warn!(table, id = %record.id, error = %error, "record excluded from pass");
                outcome.skipped += 1;
                outcome.issues.push(format!("{}: {error}", record.id));
            }
        }
    }

    for chunk in staged.chunks(CHUNK_SIZE) {
        let rows: Vec<Row> = chunk.iter().map(|(_, row)| row.clone()).collect();
        let returned =
            match upsert_chunk_with_retry(remote, table, &rows, kind.conflict_key(), ctl).await {
                Ok(returned) => returned,
                Err(Error::Cancelled) => {
                    outcome.cancelled = true;
                    outcome.skipped += chunk.len();
                    return outcome;
                }
                Err(error) => {
                    // Abandon this table's pass; completed chunks stay
                    // uploaded (upserts are idempotent, re-running is safe).
                    let abandoned = Error::TableUpload {
                        table: table.to_string(),
                        message: error.to_string(),
                    };
                    tracing::warn!(table, error = %abandoned, "table upload abandoned");
                    outcome.failed = true;
                    outcome.skipped += chunk.len();
                    outcome.issues.push(abandoned.to_string());
                    return outcome;
                }
            };

        let store = store.lock().await;
        let mut synced_ids = Vec::with_capacity(chunk.len());
        for (index, (record, _)) in chunk.iter().enumerate() {
            let confirmed_id = returned
                .get(index)
                .and_then(|row| row.get("id"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or(&record.id)
                .to_string();
            if confirmed_id == record.id {
                synced_ids.push(confirmed_id);
            } else {
                match store.rewrite_id(kind, &record.id, &confirmed_id) {
                    Ok(()) => synced_ids.push(confirmed_id),
                    Err(error) => outcome
                        .issues
                        .push(format!("id rewrite failed for {}: {error}", record.id)),
                }
            }
        }
        outcome.uploaded += synced_ids.len();
        if let Err(error) = store.mark_synced(kind, &synced_ids) {
            outcome.issues.push(format!("mark synced failed: {error}"));
        }
    }

    outcome
}

/// Walk tombstones in the exact reverse of the upload order, children
/// before parents. Best-effort: one table's failure is logged and the
/// walk continues, since an undeleted child only leaves an orphan to
/// retry later.
pub(crate) async fn run_deletions<R: RemoteAdapter>(
    remote: &R,
    store: &Mutex<LocalStore>,
    bucket: &str,
    mut plan: BTreeMap<EntityKind, Vec<LocalRecord>>,
    ctl: &PassControl,
    report: &mut SyncReport,
) {
    for tier in EntityKind::UPLOAD_TIERS.iter().rev() {
        let mut tasks = Vec::new();
        for kind in *tier {
            let Some(tombstones) = plan.remove(kind) else {
                continue;
            };
            if tombstones.is_empty() {
                continue;
            }
            tasks.push(delete_table(remote, store, bucket, *kind, tombstones, ctl));
        }

        for outcome in join_all(tasks).await {
            outcome.merge_into(report);
        }

        if report.cancelled {
            break;
        }
    }
}

/// Delete one table's tombstones, purging each confirmed chunk locally.
async fn delete_table<R: RemoteAdapter>(
    remote: &R,
    store: &Mutex<LocalStore>,
    bucket: &str,
    kind: EntityKind,
    tombstones: Vec<LocalRecord>,
    ctl: &PassControl,
) -> TableOutcome {
    let table = kind.table();
    let mut outcome = TableOutcome::new(kind);

    for chunk in tombstones.chunks(CHUNK_SIZE) {
        let ids: Vec<String> = chunk.iter().map(|record| record.id.clone()).collect();
        match delete_chunk_with_retry(remote, table, &ids, ctl).await {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                outcome.cancelled = true;
                return outcome;
            }
            Err(error) => {
                tracing::warn!(table, error = %error, "chunk delete abandoned; continuing");
                outcome
                    .issues
                    .push(format!("delete abandoned: {error}"));
                return outcome;
            }
        }

        // Document rows take their storage object with them.
        if kind == EntityKind::CaseDocument {
            for record in chunk {
                if let Some(path) = record.field_str("storagePath") {
                    if let Err(error) = remote.delete_blob(bucket, path).await {
                        tracing::warn!(path, error = %error, "blob delete failed");
                        outcome.issues.push(format!("{}: {error}", record.id));
                    }
                }
            }
        }

        let store = store.lock().await;
        for id in &ids {
            match store.purge(kind, id) {
                Ok(()) => outcome.deleted += 1,
                Err(error) => outcome.issues.push(format!("purge failed for {id}: {error}")),
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{Case, Client};

    fn never_stops() -> PassControl {
        PassControl::new(CancelHandle::new(), Duration::from_secs(3600))
    }

    fn plan_of(entries: &[(EntityKind, &LocalRecord)]) -> BTreeMap<EntityKind, Vec<String>> {
        let mut plan: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
        for (kind, record) in entries {
            plan.entry(*kind).or_default().push(record.id.clone());
        }
        plan
    }

    #[tokio::test(start_paused = true)]
    async fn failed_chunk_is_retried_three_times_with_doubling_delay() {
        let remote = crate::remote::MemoryRemote::new();
        remote.fail_next_upserts("clients", u32::MAX);
        let store = Mutex::new(crate::store::LocalStore::open_in_memory().unwrap());
        let record = store
            .lock()
            .await
            .save_entity(&Client::new("Amina"))
            .unwrap();

        let before = Instant::now();
        let mut report = SyncReport::new();
        run_upload(
            &remote,
            &store,
            None,
            plan_of(&[(EntityKind::Client, &record)]),
            &never_stops(),
            &mut report,
        )
        .await;

        assert_eq!(remote.upsert_attempts("clients"), 3);
        // Backoff slept 500ms then 1000ms before the final attempt.
        assert_eq!(before.elapsed(), Duration::from_millis(1500));
        assert!(report.has_issues());
        assert_eq!(report.tables["clients"].uploaded, 0);

        // The record is abandoned for this pass, not dropped.
        let dirty = store
            .lock()
            .await
            .dirty_records(EntityKind::Client)
            .unwrap();
        assert_eq!(dirty.len(), 1);
    }

    #[tokio::test]
    async fn parents_upload_before_children() {
        let remote = crate::remote::MemoryRemote::new();
        let store = Mutex::new(crate::store::LocalStore::open_in_memory().unwrap());
        let (client, case) = {
            let store = store.lock().await;
            let client = store.save_entity(&Client::new("Amina")).unwrap();
            let case = store
                .save_entity(&Case::new(client.id.clone(), "Dispute"))
                .unwrap();
            (client, case)
        };

        let mut report = SyncReport::new();
        run_upload(
            &remote,
            &store,
            Some("owner-1"),
            plan_of(&[(EntityKind::Case, &case), (EntityKind::Client, &client)]),
            &never_stops(),
            &mut report,
        )
        .await;

        let log = remote.call_log();
        let client_pos = log
            .iter()
            .position(|(op, t)| op == "upsert" && t == "clients")
            .unwrap();
        let case_pos = log
            .iter()
            .position(|(op, t)| op == "upsert" && t == "cases")
            .unwrap();
        assert!(client_pos < case_pos);
        assert_eq!(report.total_uploaded(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn descendants_are_skipped_when_an_ancestor_fails() {
        let remote = crate::remote::MemoryRemote::new();
        remote.fail_next_upserts("clients", u32::MAX);
        let store = Mutex::new(crate::store::LocalStore::open_in_memory().unwrap());
        let (client, case) = {
            let store = store.lock().await;
            let client = store.save_entity(&Client::new("Amina")).unwrap();
            let case = store
                .save_entity(&Case::new(client.id.clone(), "Dispute"))
                .unwrap();
            (client, case)
        };

        let mut report = SyncReport::new();
        run_upload(
            &remote,
            &store,
            None,
            plan_of(&[(EntityKind::Client, &client), (EntityKind::Case, &case)]),
            &never_stops(),
            &mut report,
        )
        .await;

        assert_eq!(remote.upsert_attempts("cases"), 0);
        assert_eq!(report.tables["cases"].skipped, 1);
    }

    #[tokio::test]
    async fn deletions_walk_the_exact_reverse_of_uploads() {
        let remote = crate::remote::MemoryRemote::new();
        let store = Mutex::new(crate::store::LocalStore::open_in_memory().unwrap());
        let (client, case) = {
            let store = store.lock().await;
            let client = store.save_entity(&Client::new("Amina")).unwrap();
            let case = store
                .save_entity(&Case::new(client.id.clone(), "Dispute"))
                .unwrap();
            (client, case)
        };

        let mut plan: BTreeMap<EntityKind, Vec<LocalRecord>> = BTreeMap::new();
        plan.insert(EntityKind::Client, vec![client]);
        plan.insert(EntityKind::Case, vec![case]);

        let mut report = SyncReport::new();
        run_deletions(&remote, &store, "case-documents", plan, &never_stops(), &mut report).await;

        let log = remote.call_log();
        let case_pos = log
            .iter()
            .position(|(op, t)| op == "delete" && t == "cases")
            .unwrap();
        let client_pos = log
            .iter()
            .position(|(op, t)| op == "delete" && t == "clients")
            .unwrap();
        assert!(case_pos < client_pos);
        assert_eq!(report.tables["clients"].deleted, 1);
        assert_eq!(report.tables["cases"].deleted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_tables_delete_failure_does_not_block_others() {
        let remote = crate::remote::MemoryRemote::new();
        remote.fail_next_deletes("cases", u32::MAX);
        let store = Mutex::new(crate::store::LocalStore::open_in_memory().unwrap());
        let (client_tombstones, case_tombstones) = {
            let store = store.lock().await;
            let client = store.save_entity(&Client::new("Amina")).unwrap();
            let case = store
                .save_entity(&Case::new(client.id.clone(), "Dispute"))
                .unwrap();
            store.mark_deleted(EntityKind::Client, &client.id).unwrap();
            store.mark_deleted(EntityKind::Case, &case.id).unwrap();
            remote.seed_row("clients", {
                let serde_json::Value::Object(map) = json!({ "id": client.id }) else {
                    unreachable!()
                };
                map
            });
            (
                store.tombstones(EntityKind::Client).unwrap(),
                store.tombstones(EntityKind::Case).unwrap(),
            )
        };

        let mut plan: BTreeMap<EntityKind, Vec<LocalRecord>> = BTreeMap::new();
        plan.insert(EntityKind::Case, case_tombstones);
        plan.insert(EntityKind::Client, client_tombstones);

        let mut report = SyncReport::new();
        run_deletions(&remote, &store, "case-documents", plan, &never_stops(), &mut report).await;

        // The case tier failed but the client tier still ran.
        assert_eq!(report.tables["clients"].deleted, 1);
        assert!(remote.rows("clients").is_empty());
        assert!(report.has_issues());

        // The failed tombstone is retained for the next pass.
        let store = store.lock().await;
        assert!(store.tombstones(EntityKind::Client).unwrap().is_empty());
        assert_eq!(store.tombstones(EntityKind::Case).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_new_network_calls() {
        let remote = crate::remote::MemoryRemote::new();
        let store = Mutex::new(crate::store::LocalStore::open_in_memory().unwrap());
        let record = store
            .lock()
            .await
            .save_entity(&Client::new("Amina"))
            .unwrap();

        let handle = CancelHandle::new();
        handle.cancel();
        let ctl = PassControl::new(handle, Duration::from_secs(3600));

        let mut report = SyncReport::new();
        run_upload(
            &remote,
            &store,
            None,
            plan_of(&[(EntityKind::Client, &record)]),
            &ctl,
            &mut report,
        )
        .await;

        assert!(report.cancelled);
        assert_eq!(remote.upsert_attempts("clients"), 0);
    }
}

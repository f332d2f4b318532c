//! The reconciler: one full pull-diff-upload-delete cycle over every
//! synced table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::mapper;
use crate::models::{is_local_id, EntityKind, LocalRecord};
use crate::remote::RemoteAdapter;
use crate::store::LocalStore;
use crate::sync::documents;
use crate::sync::integrity::{filter_uploadable, KnownValid};
use crate::sync::pipeline::{run_deletions, run_upload, CancelHandle, PassControl};
use crate::sync::probe::{self, ProbeStatus};
use crate::sync::report::{DocumentReport, SyncReport, SyncState};

/// Overall deadline for one pass; past it no new network calls are made.
const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(120);

/// Offline-first sync engine for one local store and one backend.
///
/// UI and business logic mutate the store directly (optimistic, always
/// succeeds locally); the engine reconciles on demand. Only one pass is
/// ever in flight per store: triggers arriving mid-pass coalesce into a
/// no-op, since the running pass reads the latest dirty state anyway.
pub struct SyncEngine<R: RemoteAdapter> {
    store: Arc<Mutex<LocalStore>>,
    remote: R,
    config: RemoteConfig,
    pass_lock: Mutex<()>,
    state_tx: watch::Sender<SyncState>,
    cancel: CancelHandle,
    pass_timeout: Duration,
}

impl<R: RemoteAdapter> SyncEngine<R> {
    /// Build an engine around an explicitly constructed adapter.
    pub fn new(store: LocalStore, remote: R, config: RemoteConfig) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            store: Arc::new(Mutex::new(store)),
            remote,
            config,
            pass_lock: Mutex::new(()),
            state_tx,
            cancel: CancelHandle::new(),
            pass_timeout: DEFAULT_PASS_TIMEOUT,
        }
    }

    /// Override the overall pass deadline.
    #[must_use]
    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = timeout;
        self
    }

    /// Shared handle to the local store, for read-through/write-through
    /// UI access.
    #[must_use]
    pub fn store(&self) -> Arc<Mutex<LocalStore>> {
        Arc::clone(&self.store)
    }

    /// Where the engine currently is in a pass.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Watch pass-state transitions, e.g. for a status indicator.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Handle for abandoning the in-flight pass.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn set_state(&self, state: SyncState) {
        self.state_tx.send_replace(state);
    }

    fn fail_pass(&self, error: Error) -> Error {
        self.set_state(SyncState::Failed);
        self.set_state(SyncState::Idle);
        error
    }

    /// Run the schema preflight on its own, e.g. to drive a guided
    /// repair flow before the first sync.
    pub async fn probe(&self) -> ProbeStatus {
        probe::run(&self.remote, &self.config).await
    }

    /// Run one full reconciliation pass over all tables.
    ///
    /// Per-table failures are captured in the report; only pass-level
    /// preconditions (unconfigured, schema gap, unreachable backend)
    /// return an error.
    pub async fn sync(&self) -> Result<SyncReport> {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            tracing::debug!("sync trigger coalesced into in-flight pass");
            return Ok(SyncReport::coalesced());
        };
        self.cancel.reset();
        let ctl = PassControl::new(self.cancel.clone(), self.pass_timeout);
        let mut report = SyncReport::new();

        self.set_state(SyncState::Probing);
        match probe::run(&self.remote, &self.config).await {
            ProbeStatus::Ready => {}
            ProbeStatus::Unconfigured => return Err(self.fail_pass(Error::Unconfigured)),
            ProbeStatus::Uninitialized { table, column } => {
                return Err(self.fail_pass(Error::Schema { table, column }));
            }
            ProbeStatus::Network(message) => {
                return Err(self.fail_pass(Error::Network(message)));
            }
            ProbeStatus::Unknown(message) => return Err(self.fail_pass(Error::Api(message))),
        }

        self.set_state(SyncState::Pulling);
        let snapshots = match self.pull_snapshots(&mut report).await {
            Ok(snapshots) => snapshots,
            Err(error) => return Err(self.fail_pass(error)),
        };

        self.set_state(SyncState::Reconciling);
        let plans = {
            let store = self.store.lock().await;
            reconcile_plans(&store, snapshots, &mut report)
        };
        let (upload_plan, deletion_plan) = match plans {
            Ok(plans) => plans,
            Err(error) => return Err(self.fail_pass(error)),
        };

        self.set_state(SyncState::Uploading);
        run_upload(
            &self.remote,
            &self.store,
            self.config.owner_id.as_deref(),
            upload_plan,
            &ctl,
            &mut report,
        )
        .await;

        self.set_state(SyncState::Deleting);
        run_deletions(
            &self.remote,
            &self.store,
            &self.config.bucket,
            deletion_plan,
            &ctl,
            &mut report,
        )
        .await;

        self.set_state(SyncState::Idle);
        report.finish();
        tracing::info!(
            uploaded = report.total_uploaded(),
            issues = report.issues.len(),
            cancelled = report.cancelled,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Reconcile document metadata together with their blobs.
    pub async fn sync_documents(&self) -> Result<DocumentReport> {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            return Ok(DocumentReport::coalesced());
        };
        documents::run(&self.remote, &self.store, &self.config, None).await
    }

    /// Incremental document pass scoped to one case, for backend push
    /// notifications.
    pub async fn sync_documents_for_case(&self, case_id: &str) -> Result<DocumentReport> {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            return Ok(DocumentReport::coalesced());
        };
        documents::run(&self.remote, &self.store, &self.config, Some(case_id)).await
    }

    /// Full record pass followed by a full document pass.
    pub async fn sync_all(&self) -> Result<(SyncReport, DocumentReport)> {
        let records = self.sync().await?;
        let documents = self.sync_documents().await?;
        Ok((records, documents))
    }

    async fn pull_snapshots(
        &self,
        report: &mut SyncReport,
    ) -> Result<BTreeMap<EntityKind, Vec<LocalRecord>>> {
        let mut snapshots = BTreeMap::new();
        for kind in EntityKind::ALL {
            let rows = self.remote.select(kind.table(), &[]).await?;
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                match mapper::to_local(kind, &row) {
                    Ok(record) => records.push(record),
                    Err(error) => {
                        tracing::warn!(table = kind.table(), error = %error, "unreadable remote row skipped");
                        report.push_issue(kind.table(), format!("unreadable remote row: {error}"));
                    }
                }
            }
            snapshots.insert(kind, records);
        }
        Ok(snapshots)
    }
}

type Plans = (
    BTreeMap<EntityKind, Vec<String>>,
    BTreeMap<EntityKind, Vec<LocalRecord>>,
);

/// Diff local state against the pulled snapshots: merge remote wins into
/// the store, stage dirty local records for upload, collect tombstones
/// for deletion, and integrity-filter the staged set.
fn reconcile_plans(
    store: &LocalStore,
    snapshots: BTreeMap<EntityKind, Vec<LocalRecord>>,
    report: &mut SyncReport,
) -> Result<Plans> {
    let mut known = KnownValid::default();
    let mut upload_plan: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
    let mut deletion_plan: BTreeMap<EntityKind, Vec<LocalRecord>> = BTreeMap::new();

    for kind in EntityKind::ALL {
        let remote_records: HashMap<String, LocalRecord> = snapshots
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|record| (record.id.clone(), record.clone()))
            .collect();
        let locals = store.all_records(kind)?;
        let local_map: HashMap<&str, &LocalRecord> = locals
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();

        let mut staged: Vec<LocalRecord> = Vec::new();

        for (id, remote_record) in &remote_records {
            match local_map.get(id.as_str()) {
                None => {
                    store.apply_remote(kind, remote_record)?;
                    report.table_mut(kind.table()).merged += 1;
                }
                Some(local) if local.deleted => {
                    deletion_plan
                        .entry(kind)
                        .or_default()
                        .push((*local).clone());
                }
                Some(local) => {
                    // Last writer wins; on an exact tie the backend is
                    // the durability of record.
                    if local.updated_at > remote_record.updated_at {
                        staged.push((*local).clone());
                    } else if remote_record.updated_at > local.updated_at || local.dirty {
                        store.apply_remote(kind, remote_record)?;
                        report.table_mut(kind.table()).merged += 1;
                    }
                }
            }
        }

        for local in &locals {
            if remote_records.contains_key(&local.id) {
                continue;
            }
            if local.deleted {
                // Nothing left to delete remotely: either the record
                // never reached the backend or another device already
                // removed it.
                store.purge(kind, &local.id)?;
                report.table_mut(kind.table()).deleted += 1;
            } else if local.dirty || is_local_id(&local.id) {
                // Offline documents move through the blob reconciler so
                // metadata and bytes land together.
                if kind == EntityKind::CaseDocument && is_local_id(&local.id) {
                    continue;
                }
                staged.push(local.clone());
            } else {
                // Clean, server-identified, vanished remotely: deleted
                // from another device.
                store.purge(kind, &local.id)?;
                report.table_mut(kind.table()).deleted += 1;
            }
        }

        known.extend(kind, remote_records.keys().cloned());
        let (kept, orphans) = filter_uploadable(kind, staged, &mut known);
        report.table_mut(kind.table()).skipped += orphans.len();
        if !kept.is_empty() {
            upload_plan.insert(kind, kept.into_iter().map(|record| record.id).collect());
        }
    }

    Ok((upload_plan, deletion_plan))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    use super::*;
    use crate::models::{AdminTask, Case, Client, Entity, Session};
    use crate::remote::MemoryRemote;

    fn config() -> RemoteConfig {
        RemoteConfig::new("https://backend.example.co", "key").with_owner("owner-1")
    }

    fn engine(remote: &MemoryRemote) -> SyncEngine<MemoryRemote> {
        SyncEngine::new(
            LocalStore::open_in_memory().unwrap(),
            remote.clone(),
            config(),
        )
    }

    fn seed_remote<E: Entity>(remote: &MemoryRemote, entity: &E) {
        let record = entity.to_record().unwrap();
        let row = mapper::to_remote(E::KIND, &record, Some("owner-1")).unwrap();
        remote.seed_row(E::KIND.table(), row);
    }

    #[tokio::test]
    async fn offline_client_and_case_upload_in_order() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);
        let (client, case) = {
            let store = engine.store();
            let store = store.lock().await;
            let client = store.save_entity(&Client::new("Amina")).unwrap();
            let case = store
                .save_entity(&Case::new(client.id.clone(), "Dispute"))
                .unwrap();
            (client, case)
        };

        let report = engine.sync().await.unwrap();

        assert_eq!(report.tables["clients"].uploaded, 1);
        assert_eq!(report.tables["cases"].uploaded, 1);
        assert!(!report.has_issues());

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

        let store = engine.store();
        let store = store.lock().await;
        assert!(store.dirty_records(EntityKind::Client).unwrap().is_empty());
        assert!(store.dirty_records(EntityKind::Case).unwrap().is_empty());
        assert_eq!(remote.rows("cases").len(), 1);
        // Both row ids survived the round trip.
        assert!(store.get(EntityKind::Client, &client.id).unwrap().is_some());
        assert!(store.get(EntityKind::Case, &case.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn newer_remote_version_overwrites_local() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);

        let mut task = AdminTask::new("Renew bar card", 1);
        task.id = "t1".to_string();
        task.updated_at = 1_000;
        {
            let store = engine.store();
            let store = store.lock().await;
            store.apply_remote(EntityKind::AdminTask, &task.to_record().unwrap()).unwrap();
        }

        let mut newer = task.clone();
        newer.title = "Renew bar card at the new office".to_string();
        newer.updated_at = 2_000;
        seed_remote(&remote, &newer);

        engine.sync().await.unwrap();

        let store = engine.store();
        let store = store.lock().await;
        let merged: AdminTask = store.get_entity("t1").unwrap().unwrap();
        assert_eq!(merged.title, "Renew bar card at the new office");
        assert_eq!(merged.updated_at, 2_000);
    }

    #[tokio::test]
    async fn newer_local_version_overwrites_remote() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);

        let mut task = AdminTask::new("Renew bar card", 1);
        task.id = "t1".to_string();
        task.updated_at = 1_000;
        seed_remote(&remote, &task);

        {
            let store = engine.store();
            let store = store.lock().await;
            let mut local = task.clone();
            local.title = "Renew and pay fees".to_string();
            store.save_entity(&local).unwrap();
        }

        engine.sync().await.unwrap();

        let row = &remote.rows("admin_tasks")[0];
        assert_eq!(row["title"], Value::String("Renew and pay fees".to_string()));
    }

    #[tokio::test]
    async fn exact_timestamp_tie_goes_to_the_remote() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);

        let mut task = AdminTask::new("Local wording", 1);
        task.id = "t1".to_string();
        let saved = {
            let store = engine.store();
            let store = store.lock().await;
            store.save_entity(&task).unwrap()
        };

        let mut remote_version = task.clone();
        remote_version.title = "Remote wording".to_string();
        remote_version.updated_at = saved.updated_at;
        seed_remote(&remote, &remote_version);

        engine.sync().await.unwrap();

        let store = engine.store();
        let store = store.lock().await;
        let merged: AdminTask = store.get_entity("t1").unwrap().unwrap();
        assert_eq!(merged.title, "Remote wording");
        assert!(store.dirty_records(EntityKind::AdminTask).unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_gap_aborts_before_any_upsert() {
        let remote = MemoryRemote::new();
        remote.remove_column("case_documents", "updated_at");
        let engine = engine(&remote);
        {
            let store = engine.store();
            let store = store.lock().await;
            store.save_entity(&Client::new("Amina")).unwrap();
        }

        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::Schema { ref table, .. } if table == "case_documents"));
        assert!(remote
            .call_log()
            .iter()
            .all(|(op, _)| op != "upsert" && op != "select"));
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn unconfigured_engine_refuses_to_sync() {
        let remote = MemoryRemote::new();
        let engine = SyncEngine::new(
            LocalStore::open_in_memory().unwrap(),
            remote.clone(),
            RemoteConfig::default(),
        );

        let error = engine.sync().await.unwrap_err();
        assert!(matches!(error, Error::Unconfigured));
        assert!(remote.call_log().is_empty());
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);
        {
            let store = engine.store();
            let store = store.lock().await;
            store.save_entity(&Client::new("Amina")).unwrap();
        }

        let first = engine.sync().await.unwrap();
        assert_eq!(first.total_uploaded(), 1);

        let second = engine.sync().await.unwrap();
        assert_eq!(second.total_uploaded(), 0);
        assert_eq!(remote.rows("clients").len(), 1);
    }

    #[tokio::test]
    async fn orphan_session_is_never_sent() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);
        {
            let store = engine.store();
            let store = store.lock().await;
            store
                .save_entity(&Session::new("stage-that-does-not-exist", "2026-01-05T10:00:00Z"))
                .unwrap();
        }

        let report = engine.sync().await.unwrap();

        assert_eq!(remote.upsert_attempts("sessions"), 0);
        assert_eq!(report.tables["sessions"].skipped, 1);

        let store = engine.store();
        let store = store.lock().await;
        assert_eq!(store.dirty_records(EntityKind::Session).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remote_only_records_merge_into_the_store() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);
        let mut client = Client::new("Remote-born");
        client.id = "srv-1".to_string();
        seed_remote(&remote, &client);

        let report = engine.sync().await.unwrap();

        assert_eq!(report.tables["clients"].merged, 1);
        let store = engine.store();
        let store = store.lock().await;
        let merged: Client = store.get_entity("srv-1").unwrap().unwrap();
        assert_eq!(merged.name, "Remote-born");
    }

    #[tokio::test]
    async fn remote_deletion_propagates_locally() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);
        {
            let store = engine.store();
            let store = store.lock().await;
            let mut client = Client::new("Gone elsewhere");
            client.id = "srv-1".to_string();
            store.apply_remote(EntityKind::Client, &client.to_record().unwrap()).unwrap();
        }

        engine.sync().await.unwrap();

        let store = engine.store();
        let store = store.lock().await;
        assert!(store.get(EntityKind::Client, "srv-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn tombstone_deletes_remotely_then_purges() {
        let remote = MemoryRemote::new();
        let engine = engine(&remote);

        let mut client = Client::new("To remove");
        client.id = "srv-1".to_string();
        seed_remote(&remote, &client);
        {
            let store = engine.store();
            let store = store.lock().await;
            store.apply_remote(EntityKind::Client, &client.to_record().unwrap()).unwrap();
            store.mark_deleted(EntityKind::Client, "srv-1").unwrap();
        }

        let report = engine.sync().await.unwrap();

        assert!(remote.rows("clients").is_empty());
        assert_eq!(report.tables["clients"].deleted, 1);
        let store = engine.store();
        let store = store.lock().await;
        assert!(store.tombstones(EntityKind::Client).unwrap().is_empty());
    }
}

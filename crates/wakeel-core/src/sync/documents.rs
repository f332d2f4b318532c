//! Document reconciliation: metadata rows and their blobs move as one
//! unit, both downloaded, both uploaded, or both deleted.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::mapper;
use crate::models::{is_local_id, EntityKind, LocalRecord};
use crate::remote::RemoteAdapter;
use crate::store::LocalStore;
use crate::sync::report::DocumentReport;

const KIND: EntityKind = EntityKind::CaseDocument;

/// One document pass, optionally scoped to a single case (the
/// incremental path used for backend push notifications).
pub(crate) async fn run<R: RemoteAdapter>(
    remote: &R,
    store: &Mutex<LocalStore>,
    config: &RemoteConfig,
    case_scope: Option<&str>,
) -> Result<DocumentReport> {
    if !config.is_configured() {
        return Err(Error::Unconfigured);
    }
    remote.probe(KIND.table(), KIND.probe_column()).await?;

    let mut report = DocumentReport::new();
    let bucket = config.bucket.as_str();
    let owner = config.owner_id.as_deref();

    let rows = remote.select(KIND.table(), &[]).await?;
    let mut remote_docs: Vec<LocalRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        match mapper::to_local(KIND, &row) {
            Ok(record) => remote_docs.push(record),
            Err(error) => {
                tracing::warn!(error = %error, "unreadable remote document row skipped");
                report.push_issue("?", format!("unreadable remote row: {error}"));
            }
        }
    }
    if let Some(case_id) = case_scope {
        remote_docs.retain(|record| record.field_str("caseId") == Some(case_id));
    }

    let locals: Vec<LocalRecord> = {
        let store = store.lock().await;
        let mut locals = store.all_records(KIND)?;
        if let Some(case_id) = case_scope {
            locals.retain(|record| record.field_str("caseId") == Some(case_id));
        }
        locals
    };
    let local_map: HashMap<&str, &LocalRecord> = locals
        .iter()
        .map(|record| (record.id.as_str(), record))
        .collect();
    let remote_ids: HashSet<&str> = remote_docs
        .iter()
        .map(|record| record.id.as_str())
        .collect();

    // Download pairs present remotely but absent (or blobless) locally.
    for remote_doc in &remote_docs {
        let wanted = match local_map.get(remote_doc.id.as_str()) {
            None => true,
            // A clean metadata row without its bytes is a pass that died
            // mid-download; fetch the blob again.
            Some(local) if !local.dirty && !local.deleted => {
                let store = store.lock().await;
                store.blob(&local.id)?.is_none()
            }
            Some(_) => false,
        };
        if !wanted {
            continue;
        }
        let Some(path) = remote_doc.field_str("storagePath") else {
            report.push_issue(&remote_doc.id, "metadata row has no storage path");
            continue;
        };
        match remote.download_blob(bucket, path).await {
            Ok(bytes) => {
                let store = store.lock().await;
                store.apply_remote_document(remote_doc, &bytes)?;
                report.downloaded += 1;
            }
            Err(error) => {
                tracing::warn!(id = %remote_doc.id, error = %error, "document download failed");
                report.push_issue(&remote_doc.id, error.to_string());
            }
        }
    }

    // Drop local pairs whose metadata vanished remotely. Documents still
    // waiting for their first upload are left alone.
    for local in &locals {
        if local.deleted || is_local_id(&local.id) || remote_ids.contains(local.id.as_str()) {
            continue;
        }
        let store = store.lock().await;
        store.remove_document(&local.id)?;
        report.removed += 1;
    }

    // Upload documents captured offline: blob first, then the metadata
    // row referencing it. A blob whose metadata insert failed is removed
    // again so the bucket never leaks orphans.
    for local in &locals {
        if !is_local_id(&local.id) || local.deleted {
            continue;
        }
        let bytes = {
            let store = store.lock().await;
            store.blob(&local.id)?
        };
        let Some(bytes) = bytes else {
            report.push_issue(&local.id, "local document has no stored bytes");
            continue;
        };
        let Some(path) = local.field_str("storagePath").map(ToOwned::to_owned) else {
            report.push_issue(&local.id, "local document has no storage path");
            continue;
        };

        let row = match mapper::to_remote(KIND, local, owner) {
            Ok(row) => row,
            Err(error) => {
                report.push_issue(&local.id, error.to_string());
                continue;
            }
        };

        if let Err(error) = remote.upload_blob(bucket, &path, &bytes).await {
            tracing::warn!(id = %local.id, error = %error, "document blob upload failed");
            report.push_issue(&local.id, error.to_string());
            continue;
        }

        match remote.upsert(KIND.table(), &[row], KIND.conflict_key()).await {
            Ok(returned) => {
                let confirmed_id = returned
                    .first()
                    .and_then(|row| row.get("id"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or(&local.id)
                    .to_string();
                let store = store.lock().await;
                if confirmed_id == local.id {
                    store.mark_synced(KIND, &[confirmed_id])?;
                } else {
                    store.rewrite_id(KIND, &local.id, &confirmed_id)?;
                    store.mark_synced(KIND, &[confirmed_id])?;
                }
                report.uploaded += 1;
            }
            Err(error) => {
                // The blob made it up but its metadata did not; delete
                // the orphan so storage and table stay paired.
                tracing::warn!(id = %local.id, error = %error, "metadata insert failed after blob upload");
                report.push_issue(&local.id, error.to_string());
                match remote.delete_blob(bucket, &path).await {
                    Ok(()) => report.orphans_cleaned += 1,
                    Err(cleanup) => {
                        tracing::warn!(%path, error = %cleanup, "orphan blob cleanup failed");
                        report.push_issue(&local.id, format!("orphan cleanup failed: {cleanup}"));
                    }
                }
            }
        }
    }

    tracing::info!(
        downloaded = report.downloaded,
        uploaded = report.uploaded,
        removed = report.removed,
        orphans = report.orphans_cleaned,
        scoped = case_scope.is_some(),
        "document pass finished"
    );
    Ok(report)
}

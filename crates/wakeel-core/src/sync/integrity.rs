//! Referential integrity filter: no child record reaches the upload
//! pipeline unless its parent is known valid this pass.

use std::collections::{HashMap, HashSet};

use crate::models::{EntityKind, LocalRecord};

/// The per-kind set of ids confirmed uploadable this pass: everything
/// already synced or pulled from the backend, plus every record the
/// filter has kept so far, so deeper levels chain transitively.
#[derive(Debug, Default)]
pub struct KnownValid {
    ids: HashMap<EntityKind, HashSet<String>>,
}

impl KnownValid {
    /// Register ids as valid parents for this pass.
    pub fn extend<I>(&mut self, kind: EntityKind, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ids
            .entry(kind)
            .or_default()
            .extend(ids.into_iter().map(Into::into));
    }

    /// Whether an id is a confirmed-valid member of a kind.
    #[must_use]
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.ids.get(&kind).is_some_and(|ids| ids.contains(id))
    }
}

/// Partition staged records into uploadable ones and orphans.
///
/// Kept records are added to the known-valid set before returning, so a
/// caller walking kinds in upload order validates whole chains created
/// in a single offline session. Orphans are excluded from this pass
/// only; they stay dirty locally and retry once their parent succeeds.
pub fn filter_uploadable(
    kind: EntityKind,
    staged: Vec<LocalRecord>,
    known: &mut KnownValid,
) -> (Vec<LocalRecord>, Vec<LocalRecord>) {
    let Some(parent_kind) = kind.parent() else {
        known.extend(kind, staged.iter().map(|record| record.id.clone()));
        return (staged, Vec::new());
    };

    let mut kept = Vec::with_capacity(staged.len());
    let mut orphans = Vec::new();
    for record in staged {
        let valid = record
            .parent_id(kind)
            .is_some_and(|parent_id| known.contains(parent_kind, parent_id));
        if valid {
            kept.push(record);
        } else {
            tracing::debug!(kind = %kind, id = %record.id, "orphan excluded from upload");
            orphans.push(record);
        }
    }

    known.extend(kind, kept.iter().map(|record| record.id.clone()));
    (kept, orphans)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn record(id: &str, parent_field: Option<(&str, &str)>) -> LocalRecord {
        let mut payload = serde_json::Map::new();
        if let Some((field, value)) = parent_field {
            payload.insert(field.to_string(), json!(value));
        }
        payload.insert("id".to_string(), Value::String(id.to_string()));
        LocalRecord::new(id, payload)
    }

    #[test]
    fn roots_always_pass_and_become_valid_parents() {
        let mut known = KnownValid::default();
        let staged = vec![record("local-1", None)];
        let (kept, orphans) = filter_uploadable(EntityKind::Client, staged, &mut known);

        assert_eq!(kept.len(), 1);
        assert!(orphans.is_empty());
        assert!(known.contains(EntityKind::Client, "local-1"));
    }

    #[test]
    fn orphans_are_excluded_not_dropped() {
        let mut known = KnownValid::default();
        let staged = vec![record("local-2", Some(("clientId", "missing-client")))];
        let (kept, orphans) = filter_uploadable(EntityKind::Case, staged, &mut known);

        assert!(kept.is_empty());
        assert_eq!(orphans.len(), 1);
        assert!(!known.contains(EntityKind::Case, "local-2"));
    }

    #[test]
    fn chains_created_offline_validate_transitively() {
        let mut known = KnownValid::default();

        let (clients, _) = filter_uploadable(
            EntityKind::Client,
            vec![record("local-c", None)],
            &mut known,
        );
        let (cases, _) = filter_uploadable(
            EntityKind::Case,
            vec![record("local-k", Some(("clientId", "local-c")))],
            &mut known,
        );
        let (stages, _) = filter_uploadable(
            EntityKind::Stage,
            vec![record("local-s", Some(("caseId", "local-k")))],
            &mut known,
        );

        assert_eq!(clients.len() + cases.len() + stages.len(), 3);
    }

    #[test]
    fn a_missing_link_breaks_the_chain_below_it() {
        let mut known = KnownValid::default();
        known.extend(EntityKind::Client, ["c-1"]);

        let (cases, case_orphans) = filter_uploadable(
            EntityKind::Case,
            vec![record("k-1", Some(("clientId", "gone")))],
            &mut known,
        );
        let (stages, stage_orphans) = filter_uploadable(
            EntityKind::Stage,
            vec![record("s-1", Some(("caseId", "k-1")))],
            &mut known,
        );

        assert!(cases.is_empty());
        assert!(stages.is_empty());
        assert_eq!(case_orphans.len(), 1);
        assert_eq!(stage_orphans.len(), 1);
    }

    #[test]
    fn missing_parent_reference_is_an_orphan() {
        let mut known = KnownValid::default();
        known.extend(EntityKind::Stage, ["s-1"]);

        let staged = vec![record("local-sess", None)];
        let (kept, orphans) = filter_uploadable(EntityKind::Session, staged, &mut known);
        assert!(kept.is_empty());
        assert_eq!(orphans.len(), 1);
    }
}

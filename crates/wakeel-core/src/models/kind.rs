//! Entity kinds and the table dependency graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The synced entity kinds, one per backend table.
///
/// Kinds form a strict tree: `Client` roots the case hierarchy
/// (`Case` → `Stage` → `Session`), invoices hang off clients, documents
/// off cases. Scheduling kinds are owner-scoped roots with no parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Profile,
    AdminTask,
    Appointment,
    Assistant,
    AccountingEntry,
    Client,
    Case,
    Stage,
    Session,
    Invoice,
    InvoiceItem,
    CaseDocument,
}

impl EntityKind {
    /// Every synced kind, in upload order.
    pub const ALL: [Self; 12] = [
        Self::Profile,
        Self::AdminTask,
        Self::Appointment,
        Self::Assistant,
        Self::AccountingEntry,
        Self::Client,
        Self::Case,
        Self::Stage,
        Self::Session,
        Self::Invoice,
        Self::InvoiceItem,
        Self::CaseDocument,
    ];

    /// Upload dependency tiers. A tier may run concurrently; a tier only
    /// starts once every earlier tier has finished. Deletion walks the
    /// exact reverse.
    pub const UPLOAD_TIERS: &'static [&'static [Self]] = &[
        &[Self::Profile],
        &[
            Self::AdminTask,
            Self::Appointment,
            Self::Assistant,
            Self::AccountingEntry,
        ],
        &[Self::Client],
        &[Self::Case],
        &[Self::Stage],
        &[Self::Session],
        &[Self::Invoice],
        &[Self::InvoiceItem],
        &[Self::CaseDocument],
    ];

    /// Backend table name, also used for the local store table.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Profile => "profiles",
            Self::AdminTask => "admin_tasks",
            Self::Appointment => "appointments",
            Self::Assistant => "assistants",
            Self::AccountingEntry => "accounting_entries",
            Self::Client => "clients",
            Self::Case => "cases",
            Self::Stage => "stages",
            Self::Session => "sessions",
            Self::Invoice => "invoices",
            Self::InvoiceItem => "invoice_items",
            Self::CaseDocument => "case_documents",
        }
    }

    /// Immediate parent kind in the entity tree, if any.
    ///
    /// Soft references (accounting entries pointing at clients or cases)
    /// are deliberately not parent edges: they never gate upload.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Case | Self::Invoice => Some(Self::Client),
            Self::Stage | Self::CaseDocument => Some(Self::Case),
            Self::Session => Some(Self::Stage),
            Self::InvoiceItem => Some(Self::Invoice),
            _ => None,
        }
    }

    /// Local (camelCase) field holding the parent id, if the kind has one.
    #[must_use]
    pub const fn parent_field(self) -> Option<&'static str> {
        match self {
            Self::Case | Self::Invoice => Some("clientId"),
            Self::Stage | Self::CaseDocument => Some("caseId"),
            Self::Session => Some("stageId"),
            Self::InvoiceItem => Some("invoiceId"),
            _ => None,
        }
    }

    /// Upsert conflict target. Assistants use a natural key, everything
    /// else the primary key.
    #[must_use]
    pub const fn conflict_key(self) -> &'static str {
        match self {
            Self::Assistant => "owner_id,name",
            _ => "id",
        }
    }

    /// Column the schema probe asks for on this kind's table.
    #[must_use]
    pub const fn probe_column(self) -> &'static str {
        match self {
            Self::Assistant => "name",
            _ => "updated_at",
        }
    }

    /// Fields in other kinds that reference this kind's id, including the
    /// soft references. Used to cascade id rewrites.
    #[must_use]
    pub const fn referencing_fields(self) -> &'static [(Self, &'static str)] {
        match self {
            Self::Client => &[
                (Self::Case, "clientId"),
                (Self::Invoice, "clientId"),
                (Self::AccountingEntry, "clientId"),
            ],
            Self::Case => &[
                (Self::Stage, "caseId"),
                (Self::CaseDocument, "caseId"),
                (Self::AccountingEntry, "caseId"),
            ],
            Self::Stage => &[(Self::Session, "stageId")],
            Self::Invoice => &[(Self::InvoiceItem, "invoiceId")],
            _ => &[],
        }
    }

    /// Whether a kind is an ancestor of `other` in the table dependency
    /// tree.
    #[must_use]
    pub fn is_ancestor_of(self, other: Self) -> bool {
        let mut cursor = other.parent();
        while let Some(kind) = cursor {
            if kind == self {
                return true;
            }
            cursor = kind.parent();
        }
        false
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_cover_every_kind_once() {
        let mut seen = Vec::new();
        for tier in EntityKind::UPLOAD_TIERS {
            for kind in *tier {
                assert!(!seen.contains(kind), "{kind} appears twice");
                seen.push(*kind);
            }
        }
        assert_eq!(seen.len(), EntityKind::ALL.len());
    }

    #[test]
    fn parents_are_in_earlier_tiers() {
        let tier_of = |kind: EntityKind| {
            EntityKind::UPLOAD_TIERS
                .iter()
                .position(|tier| tier.contains(&kind))
                .unwrap()
        };
        for kind in EntityKind::ALL {
            if let Some(parent) = kind.parent() {
                assert!(tier_of(parent) < tier_of(kind), "{parent} must precede {kind}");
            }
        }
    }

    #[test]
    fn ancestry_follows_parent_edges() {
        assert!(EntityKind::Client.is_ancestor_of(EntityKind::Session));
        assert!(EntityKind::Case.is_ancestor_of(EntityKind::CaseDocument));
        assert!(!EntityKind::Invoice.is_ancestor_of(EntityKind::Session));
        assert!(!EntityKind::Session.is_ancestor_of(EntityKind::Client));
    }
}

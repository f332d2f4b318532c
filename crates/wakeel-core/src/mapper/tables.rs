//! Declarative field-mapping tables, one per entity kind.
//!
//! Each table pairs a local camelCase field with its remote snake_case
//! column and the sanitization applied on the way out. The generic mapper
//! consumes these; no entity has bespoke mapping code.

use crate::models::EntityKind;

/// Sanitization class applied to a field on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Trimmed free text; blank maps to SQL null.
    Text,
    /// Text that must not be blank on the wire; the default is synthesized.
    RequiredText(&'static str),
    /// Part of the table's natural key; blank is structurally malformed.
    Key,
    /// Coerced to `0` when missing, non-numeric or NaN.
    Numeric,
    /// Boolean flag, `false` when missing.
    Flag,
    /// Reference column; empty-ish strings become SQL null.
    ForeignKey,
    /// Date that must be present; coerced to now when unparsable.
    MandatoryDate,
    /// Date left null when missing or unparsable, never coerced.
    OptionalDate,
}

/// One local-field-to-remote-column pairing.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Local camelCase field name
    pub local: &'static str,
    /// Remote snake_case column name
    pub column: &'static str,
    /// Sanitization applied on upload
    pub kind: FieldKind,
}

const fn field(local: &'static str, column: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        local,
        column,
        kind,
    }
}

const CREATED_AT: FieldSpec = field("createdAt", "created_at", FieldKind::Numeric);

const PROFILE: &[FieldSpec] = &[
    field("displayName", "display_name", FieldKind::Text),
    field("phone", "phone", FieldKind::Text),
    field("officeName", "office_name", FieldKind::Text),
    CREATED_AT,
];

const ADMIN_TASK: &[FieldSpec] = &[
    field("title", "title", FieldKind::Text),
    field("sortOrder", "sort_order", FieldKind::Numeric),
    field("location", "location", FieldKind::Text),
    field("done", "done", FieldKind::Flag),
    CREATED_AT,
];

const APPOINTMENT: &[FieldSpec] = &[
    field("title", "title", FieldKind::Text),
    field("date", "date", FieldKind::MandatoryDate),
    field("reminderMinutes", "reminder_minutes", FieldKind::Numeric),
    field("notes", "notes", FieldKind::Text),
    CREATED_AT,
];

const ASSISTANT: &[FieldSpec] = &[
    field("name", "name", FieldKind::Key),
    field("phone", "phone", FieldKind::Text),
    field("role", "role", FieldKind::Text),
    CREATED_AT,
];

const ACCOUNTING_ENTRY: &[FieldSpec] = &[
    field("clientId", "client_id", FieldKind::ForeignKey),
    field("caseId", "case_id", FieldKind::ForeignKey),
    field("amount", "amount", FieldKind::Numeric),
    field("entryType", "entry_type", FieldKind::Text),
    field("description", "description", FieldKind::Text),
    field("date", "date", FieldKind::OptionalDate),
    CREATED_AT,
];

const CLIENT: &[FieldSpec] = &[
    field("name", "name", FieldKind::Text),
    field("phone", "phone", FieldKind::Text),
    field("email", "email", FieldKind::Text),
    field("address", "address", FieldKind::Text),
    field("notes", "notes", FieldKind::Text),
    CREATED_AT,
];

const CASE: &[FieldSpec] = &[
    field("clientId", "client_id", FieldKind::ForeignKey),
    field("subject", "subject", FieldKind::RequiredText("Untitled case")),
    field("caseNumber", "case_number", FieldKind::Text),
    field("court", "court", FieldKind::Text),
    field("opponent", "opponent", FieldKind::Text),
    field("notes", "notes", FieldKind::Text),
    CREATED_AT,
];

const STAGE: &[FieldSpec] = &[
    field("caseId", "case_id", FieldKind::ForeignKey),
    field("court", "court", FieldKind::RequiredText("Unassigned court")),
    field("caseNumber", "case_number", FieldKind::Text),
    field("notes", "notes", FieldKind::Text),
    CREATED_AT,
];

const SESSION: &[FieldSpec] = &[
    field("stageId", "stage_id", FieldKind::ForeignKey),
    field("date", "date", FieldKind::MandatoryDate),
    field("notes", "notes", FieldKind::Text),
    field("decision", "decision", FieldKind::Text),
    CREATED_AT,
];

const INVOICE: &[FieldSpec] = &[
    field("clientId", "client_id", FieldKind::ForeignKey),
    field("number", "number", FieldKind::Text),
    field("issuedAt", "issued_at", FieldKind::OptionalDate),
    field("total", "total", FieldKind::Numeric),
    CREATED_AT,
];

const INVOICE_ITEM: &[FieldSpec] = &[
    field("invoiceId", "invoice_id", FieldKind::ForeignKey),
    field("description", "description", FieldKind::Text),
    field("quantity", "quantity", FieldKind::Numeric),
    field("unitPrice", "unit_price", FieldKind::Numeric),
    CREATED_AT,
];

const CASE_DOCUMENT: &[FieldSpec] = &[
    field("caseId", "case_id", FieldKind::ForeignKey),
    field("fileName", "file_name", FieldKind::Text),
    field("contentType", "content_type", FieldKind::Text),
    field("storagePath", "storage_path", FieldKind::Key),
    field("size", "size", FieldKind::Numeric),
    CREATED_AT,
];

/// The field table for a kind.
#[must_use]
pub const fn fields(kind: EntityKind) -> &'static [FieldSpec] {
    match kind {
        EntityKind::Profile => PROFILE,
        EntityKind::AdminTask => ADMIN_TASK,
        EntityKind::Appointment => APPOINTMENT,
        EntityKind::Assistant => ASSISTANT,
        EntityKind::AccountingEntry => ACCOUNTING_ENTRY,
        EntityKind::Client => CLIENT,
        EntityKind::Case => CASE,
        EntityKind::Stage => STAGE,
        EntityKind::Session => SESSION,
        EntityKind::Invoice => INVOICE,
        EntityKind::InvoiceItem => INVOICE_ITEM,
        EntityKind::CaseDocument => CASE_DOCUMENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_fields_are_mapped_as_foreign_keys() {
        for kind in EntityKind::ALL {
            let Some(parent_field) = kind.parent_field() else {
                continue;
            };
            let spec = fields(kind)
                .iter()
                .find(|spec| spec.local == parent_field)
                .unwrap_or_else(|| panic!("{kind} missing {parent_field}"));
            assert_eq!(spec.kind, FieldKind::ForeignKey);
        }
    }

    #[test]
    fn columns_are_snake_case() {
        for kind in EntityKind::ALL {
            for spec in fields(kind) {
                assert!(
                    spec.column.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                    "{}.{} is not snake_case",
                    kind,
                    spec.column
                );
            }
        }
    }
}

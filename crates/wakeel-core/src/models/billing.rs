//! Billing models: accounting entries, invoices and their line items.

use serde::{Deserialize, Serialize};

use crate::models::{new_local_id, Entity, EntityKind};
use crate::util::unix_millis_now;

/// A ledger entry, optionally tied to a client and/or case.
///
/// The client/case references are soft: an entry survives even when the
/// record it points at is gone, so they never gate upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountingEntry {
    /// Unique identifier
    pub id: String,
    /// Soft reference to a client
    pub client_id: Option<String>,
    /// Soft reference to a case
    pub case_id: Option<String>,
    /// Signed amount in the office currency
    pub amount: f64,
    /// Entry kind (`income` or `expense`)
    pub entry_type: String,
    /// What the entry covers
    pub description: Option<String>,
    /// Entry date (RFC 3339), optional
    pub date: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl AccountingEntry {
    /// Create a new ledger entry.
    #[must_use]
    pub fn new(entry_type: impl Into<String>, amount: f64) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            client_id: None,
            case_id: None,
            amount,
            entry_type: entry_type.into().trim().to_string(),
            description: None,
            date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AccountingEntry {
    fn default() -> Self {
        Self::new("", 0.0)
    }
}

impl Entity for AccountingEntry {
    const KIND: EntityKind = EntityKind::AccountingEntry;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// An invoice issued to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Invoice {
    /// Unique identifier
    pub id: String,
    /// Billed client id
    pub client_id: String,
    /// Human-facing invoice number
    pub number: Option<String>,
    /// Issue date (RFC 3339), optional until the invoice is finalized
    pub issued_at: Option<String>,
    /// Invoice total
    pub total: f64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Invoice {
    /// Create a new invoice for the given client.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            client_id: client_id.into(),
            number: None,
            issued_at: None,
            total: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Invoice {
    fn default() -> Self {
        Self::new("")
    }
}

impl Entity for Invoice {
    const KIND: EntityKind = EntityKind::Invoice;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

/// A line item on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceItem {
    /// Unique identifier
    pub id: String,
    /// Owning invoice id
    pub invoice_id: String,
    /// Line description
    pub description: String,
    /// Quantity billed
    pub quantity: f64,
    /// Price per unit
    pub unit_price: f64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl InvoiceItem {
    /// Create a new line item under the given invoice.
    #[must_use]
    pub fn new(invoice_id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: new_local_id(),
            invoice_id: invoice_id.into(),
            description: description.into().trim().to_string(),
            quantity: 1.0,
            unit_price: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for InvoiceItem {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Entity for InvoiceItem {
    const KIND: EntityKind = EntityKind::InvoiceItem;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounting_references_stay_soft() {
        let mut entry = AccountingEntry::new("expense", 150.0);
        entry.case_id = Some("case-1".to_string());
        let record = entry.to_record().unwrap();
        // No parent edge even with a case reference present.
        assert_eq!(record.parent_id(EntityKind::AccountingEntry), None);
    }

    #[test]
    fn invoice_item_points_at_invoice() {
        let item = InvoiceItem::new("inv-1", "Consultation");
        let record = item.to_record().unwrap();
        assert_eq!(record.parent_id(EntityKind::InvoiceItem), Some("inv-1"));
    }
}

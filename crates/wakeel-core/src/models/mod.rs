//! Entity models and the record envelope the sync engine moves them in.

mod assistant;
mod billing;
mod case;
mod client;
mod document;
mod kind;
mod profile;
mod record;
mod schedule;

pub use assistant::Assistant;
pub use billing::{AccountingEntry, Invoice, InvoiceItem};
pub use case::{Case, Session, Stage};
pub use client::Client;
pub use document::{sanitize_file_name, CaseDocument};
pub use kind::EntityKind;
pub use profile::Profile;
pub use record::{is_local_id, new_local_id, Entity, LocalRecord, LOCAL_ID_PREFIX};
pub use schedule::{AdminTask, Appointment};

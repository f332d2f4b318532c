//! Bidirectional transform between the local record shape and the remote
//! row shape.
//!
//! `to_remote` and `to_local` are pure: no I/O, no clock reads beyond the
//! mandatory-date fallback. They are the only code that knows both naming
//! conventions. Bad-but-sanitizable data never errors; only a missing
//! identifier or natural-key part does.

mod tables;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{EntityKind, LocalRecord};

pub use tables::{fields, FieldKind, FieldSpec};

/// A flat snake_case row as exchanged with the backend.
pub type Row = Map<String, Value>;

/// Map a local record onto a remote row, applying sanitization.
///
/// The owner scope id, when present, is stamped onto every row.
pub fn to_remote(kind: EntityKind, record: &LocalRecord, owner_id: Option<&str>) -> Result<Row> {
    let table = kind.table();
    let id = record.id.trim();
    if id.is_empty() {
        return Err(mapping_error(table, "id"));
    }

    let mut row = Row::new();
    row.insert("id".to_string(), Value::String(id.to_string()));

    for spec in fields(kind) {
        let value = record.payload.get(spec.local);
        let mapped = match spec.kind {
            FieldKind::Text => sanitize_text(value),
            FieldKind::RequiredText(default) => match sanitize_text(value) {
                Value::String(text) => Value::String(text),
                _ => Value::String(default.to_string()),
            },
            FieldKind::Key => match sanitize_text(value) {
                Value::String(text) => Value::String(text),
                _ => return Err(mapping_error(table, spec.column)),
            },
            FieldKind::Numeric => sanitize_numeric(value),
            FieldKind::Flag => Value::Bool(value.and_then(Value::as_bool).unwrap_or(false)),
            FieldKind::ForeignKey => sanitize_foreign_key(value),
            FieldKind::MandatoryDate => sanitize_date(value)
                .unwrap_or_else(|| Value::String(chrono::Utc::now().to_rfc3339())),
            FieldKind::OptionalDate => sanitize_date(value).unwrap_or(Value::Null),
        };
        row.insert(spec.column.to_string(), mapped);
    }

    row.insert("updated_at".to_string(), Value::from(record.updated_at));
    if let Some(owner) = owner_id {
        row.insert("owner_id".to_string(), Value::String(owner.to_string()));
    }

    Ok(row)
}

/// Map a remote row back into the local record shape.
///
/// Null columns are omitted from the payload rather than carried as JSON
/// nulls; a missing `updated_at` compares as 0 so the remote side wins
/// any ambiguous conflict.
pub fn to_local(kind: EntityKind, row: &Row) -> Result<LocalRecord> {
    let table = kind.table();
    let id = row
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| mapping_error(table, "id"))?
        .to_string();

    let updated_at = row.get("updated_at").and_then(Value::as_i64).unwrap_or(0);

    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::String(id.clone()));
    for spec in fields(kind) {
        if let Some(value) = row.get(spec.column) {
            if !value.is_null() {
                payload.insert(spec.local.to_string(), value.clone());
            }
        }
    }
    payload.insert("updatedAt".to_string(), Value::from(updated_at));

    Ok(LocalRecord {
        id,
        payload,
        updated_at,
        dirty: false,
        deleted: false,
    })
}

fn mapping_error(table: &str, field: &str) -> Error {
    Error::Mapping {
        table: table.to_string(),
        field: field.to_string(),
    }
}

/// Trimmed text, or null for anything blank. Numbers are stringified so a
/// numeric registry number survives a text column.
fn sanitize_text(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        }
        Some(Value::Number(number)) => Value::String(number.to_string()),
        _ => Value::Null,
    }
}

/// Numbers pass through (integers stay integers); numeric strings are
/// parsed; everything else, NaN included, becomes 0.
fn sanitize_numeric(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Number(number)) => {
            if number.as_f64().is_some_and(f64::is_nan) {
                Value::from(0)
            } else {
                Value::Number(number.clone())
            }
        }
        Some(Value::String(text)) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                Value::from(int)
            } else if let Ok(float) = text.parse::<f64>() {
                if float.is_nan() {
                    Value::from(0)
                } else {
                    Value::from(float)
                }
            } else {
                Value::from(0)
            }
        }
        _ => Value::from(0),
    }
}

/// Reference columns: the backend rejects empty-string foreign keys, so
/// blank and stringified-null values all collapse to SQL null.
fn sanitize_foreign_key(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() || text.eq_ignore_ascii_case("null")
                || text.eq_ignore_ascii_case("undefined")
            {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        }
        _ => Value::Null,
    }
}

/// A date value that actually parses, or `None`.
///
/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates; the original
/// text is kept rather than reformatted.
fn sanitize_date(value: Option<&Value>) -> Option<Value> {
    let text = value?.as_str()?.trim();
    if DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
    {
        Some(Value::String(text.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::{Case, Client, Entity, Session};

    fn record_with(fields: Value) -> LocalRecord {
        let Value::Object(payload) = fields else {
            unreachable!()
        };
        LocalRecord {
            id: "r-1".to_string(),
            payload,
            updated_at: 1_700_000_000_000,
            dirty: true,
            deleted: false,
        }
    }

    #[test]
    fn numeric_fields_coerce_to_zero() {
        let record = record_with(json!({ "title": "Hearing", "date": "2026-02-10" }));
        let row = to_remote(EntityKind::Appointment, &record, None).unwrap();
        assert_eq!(row["reminder_minutes"], json!(0));
    }

    #[test]
    fn numeric_strings_are_parsed() {
        let record = record_with(json!({ "sortOrder": "7" }));
        let row = to_remote(EntityKind::AdminTask, &record, None).unwrap();
        assert_eq!(row["sort_order"], json!(7));
    }

    #[test]
    fn empty_foreign_keys_become_null() {
        for bad in ["", "  ", "null", "undefined"] {
            let record = record_with(json!({ "clientId": bad, "amount": 10 }));
            let row = to_remote(EntityKind::AccountingEntry, &record, None).unwrap();
            assert_eq!(row["client_id"], Value::Null, "for input {bad:?}");
        }
    }

    #[test]
    fn strings_are_trimmed() {
        let record = record_with(json!({ "name": "  Amina  " }));
        let row = to_remote(EntityKind::Client, &record, None).unwrap();
        assert_eq!(row["name"], json!("Amina"));
    }

    #[test]
    fn mandatory_date_is_coerced_not_rejected() {
        let record = record_with(json!({ "stageId": "s-1", "date": "not a date" }));
        let row = to_remote(EntityKind::Session, &record, None).unwrap();
        let coerced = row["date"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(coerced).is_ok());
    }

    #[test]
    fn optional_date_is_left_null() {
        let record = record_with(json!({ "clientId": "c-1", "issuedAt": "whenever" }));
        let row = to_remote(EntityKind::Invoice, &record, None).unwrap();
        assert_eq!(row["issued_at"], Value::Null);
    }

    #[test]
    fn case_subject_default_is_synthesized() {
        let record = record_with(json!({ "clientId": "c-1", "subject": "   " }));
        let row = to_remote(EntityKind::Case, &record, None).unwrap();
        assert_eq!(row["subject"], json!("Untitled case"));
    }

    #[test]
    fn missing_id_is_a_mapping_error() {
        let mut record = record_with(json!({ "name": "Amina" }));
        record.id = "  ".to_string();
        let error = to_remote(EntityKind::Client, &record, None).unwrap_err();
        assert!(matches!(error, Error::Mapping { ref field, .. } if field == "id"));
    }

    #[test]
    fn blank_assistant_name_is_a_mapping_error() {
        let record = record_with(json!({ "name": "" }));
        let error = to_remote(EntityKind::Assistant, &record, None).unwrap_err();
        assert!(matches!(error, Error::Mapping { ref field, .. } if field == "name"));
    }

    #[test]
    fn owner_scope_is_stamped_on_every_row() {
        let record = record_with(json!({ "name": "Amina" }));
        let row = to_remote(EntityKind::Client, &record, Some("owner-1")).unwrap();
        assert_eq!(row["owner_id"], json!("owner-1"));
    }

    #[test]
    fn round_trip_preserves_a_typed_entity() {
        let mut client = Client::new("Amina Khalil");
        client.email = Some("amina@example.com".to_string());
        let record = client.to_record().unwrap();

        let row = to_remote(EntityKind::Client, &record, Some("owner-1")).unwrap();
        let back = to_local(EntityKind::Client, &row).unwrap();
        let restored = Client::from_record(&back).unwrap();

        assert_eq!(restored, client);
        assert!(!back.dirty);
    }

    #[test]
    fn missing_remote_timestamp_compares_as_zero() {
        let mut row = to_remote(
            EntityKind::Session,
            &Session::new("stage-1", "2026-01-05T10:00:00Z")
                .to_record()
                .unwrap(),
            None,
        )
        .unwrap();
        row.remove("updated_at");
        let local = to_local(EntityKind::Session, &row).unwrap();
        assert_eq!(local.updated_at, 0);
    }

    #[test]
    fn camel_case_never_reaches_the_wire() {
        let record = Case::new("client-1", "Dispute").to_record().unwrap();
        let row = to_remote(EntityKind::Case, &record, None).unwrap();
        assert!(row.keys().all(|key| !key.chars().any(char::is_uppercase)));
        assert!(row.contains_key("client_id"));
        assert!(!row.contains_key("clientId"));
    }
}

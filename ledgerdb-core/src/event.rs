// SPDX-License-Identifier: AGPL-3.0-or-later
// LedgerDB - Event-Sourced Relational Database
// Copyright (C) 2026 LedgerDB Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Events and the on-disk record format
//!
//! An event is one immutable, checksummed, sequentially-numbered record of a
//! logical change. On disk each event is one newline-delimited JSON object:
//!
//! ```text
//! {"id":1,"type":"SCHEMA_CREATED","timestamp":"...","version":1,
//!  "tx_id":"tx_0","payload":{...},"checksum":"<sha256 hex>"}
//! ```
//!
//! The checksum is SHA-256 over the record serialized with `checksum` set to
//! the empty string. Two layers of representation exist:
//!
//! - [`EventRecord`] is the wire form; its payload is a raw
//!   `serde_json::Value` so a structurally-sound record can be examined
//!   (and its checksum verified) even when the payload is malformed.
//! - [`Event`] is the typed form handed to the rest of the system; its
//!   payload is the [`EventPayload`] sum type dispatched by kind.
//!
//! serde_json's default map is BTreeMap-backed, so payload keys always
//! serialize sorted: re-encoding a decoded record reproduces the exact bytes
//! the checksum was computed over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::schema::Column;
use crate::value::{Row, RowId};

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "SCHEMA_CREATED")]
    SchemaCreated,
    #[serde(rename = "ROW_INSERTED")]
    RowInserted,
    #[serde(rename = "ROW_UPDATED")]
    RowUpdated,
    #[serde(rename = "ROW_DELETED")]
    RowDeleted,
    #[serde(rename = "SCHEMA_EVOLVED")]
    SchemaEvolved,
    #[serde(rename = "SNAPSHOT_CREATED")]
    SnapshotCreated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SchemaCreated => "SCHEMA_CREATED",
            EventKind::RowInserted => "ROW_INSERTED",
            EventKind::RowUpdated => "ROW_UPDATED",
            EventKind::RowDeleted => "ROW_DELETED",
            EventKind::SchemaEvolved => "SCHEMA_EVOLVED",
            EventKind::SnapshotCreated => "SNAPSHOT_CREATED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SCHEMA_CREATED: a new table came into existence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCreatedPayload {
    pub table_name: String,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

/// ROW_INSERTED: a full new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInsertedPayload {
    pub table_name: String,
    pub row_id: RowId,
    pub data: Row,
}

/// ROW_UPDATED: only the modified columns, plus the previous values for
/// audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowUpdatedPayload {
    pub table_name: String,
    pub row_id: RowId,
    pub changes: Row,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Row>,
}

/// ROW_DELETED: the tombstoned row id, optionally carrying the full previous
/// row for audit and recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDeletedPayload {
    pub table_name: String,
    pub row_id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_data: Option<Row>,
}

/// One column modification inside a schema evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnModification {
    pub name: String,
    #[serde(rename = "old_definition")]
    pub old_def: Column,
    #[serde(rename = "new_definition")]
    pub new_def: Column,
}

/// What changed between two schema versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaEvolution {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_columns: Vec<ColumnModification>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub renamed_columns: BTreeMap<String, String>,
}

impl SchemaEvolution {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.renamed_columns.is_empty()
    }
}

/// SCHEMA_EVOLVED: the evolution descriptor plus both schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEvolvedPayload {
    pub table_name: String,
    pub evolution: SchemaEvolution,
    pub old_schema: Vec<Column>,
    pub new_schema: Vec<Column>,
}

/// SNAPSHOT_CREATED: bookkeeping for a snapshot of derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCreatedPayload {
    pub snapshot_id: String,
    pub base_event_id: u64,
    pub created_at: DateTime<Utc>,
    pub snapshot_path: String,
    pub data_hash: String,
    pub events_included: i64,
}

/// Kind-specific payload, dispatched by [`EventKind`].
///
/// Serializes untagged (the kind lives on the enclosing event); typed
/// deserialization goes through [`EventPayload::from_value`] because the
/// kind is needed to pick the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    SchemaCreated(SchemaCreatedPayload),
    RowInserted(RowInsertedPayload),
    RowUpdated(RowUpdatedPayload),
    RowDeleted(RowDeletedPayload),
    SchemaEvolved(SchemaEvolvedPayload),
    SnapshotCreated(SnapshotCreatedPayload),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::SchemaCreated(_) => EventKind::SchemaCreated,
            EventPayload::RowInserted(_) => EventKind::RowInserted,
            EventPayload::RowUpdated(_) => EventKind::RowUpdated,
            EventPayload::RowDeleted(_) => EventKind::RowDeleted,
            EventPayload::SchemaEvolved(_) => EventKind::SchemaEvolved,
            EventPayload::SnapshotCreated(_) => EventKind::SnapshotCreated,
        }
    }

    /// Canonical JSON form (sorted keys) for hashing and storage.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Typed conversion from a raw payload, dispatched by kind.
    pub fn from_value(
        kind: EventKind,
        value: serde_json::Value,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::SchemaCreated => EventPayload::SchemaCreated(serde_json::from_value(value)?),
            EventKind::RowInserted => EventPayload::RowInserted(serde_json::from_value(value)?),
            EventKind::RowUpdated => EventPayload::RowUpdated(serde_json::from_value(value)?),
            EventKind::RowDeleted => EventPayload::RowDeleted(serde_json::from_value(value)?),
            EventKind::SchemaEvolved => EventPayload::SchemaEvolved(serde_json::from_value(value)?),
            EventKind::SnapshotCreated => {
                EventPayload::SnapshotCreated(serde_json::from_value(value)?)
            }
        })
    }
}

/// The wire form of an event: one JSON object per log line.
///
/// Field declaration order is the serialization order; it must not change,
/// or existing checksums stop verifying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub checksum: String,
}

impl EventRecord {
    /// SHA-256 over this record serialized with `checksum` cleared,
    /// lowercase hex.
    pub fn compute_checksum(&self) -> Result<String> {
        let mut copy = self.clone();
        copy.checksum = String::new();
        let bytes = serde_json::to_vec(&copy)?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(digest))
    }

    /// Recompute and compare. A record that cannot be re-serialized counts
    /// as failing validation.
    pub fn validate_checksum(&self) -> bool {
        match self.compute_checksum() {
            Ok(expected) => expected == self.checksum,
            Err(_) => false,
        }
    }

    /// Whether the payload has the required shape for this record's kind.
    pub fn payload_is_valid(&self) -> bool {
        EventPayload::from_value(self.kind, self.payload.clone()).is_ok()
    }

    /// Typed conversion; fails with `InvalidPayload` naming the event.
    pub fn into_event(self) -> Result<Event> {
        let payload =
            EventPayload::from_value(self.kind, self.payload).map_err(|e| {
                LedgerError::InvalidPayload {
                    event_id: self.id,
                    kind: self.kind.to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Event {
            id: self.id,
            kind: self.kind,
            timestamp: self.timestamp,
            version: self.version,
            tx_id: self.tx_id,
            payload,
            checksum: self.checksum,
        })
    }
}

/// A typed event. Created once by the event store, read-only thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Monotonic identifier, 1-indexed, no gaps for valid events.
    pub id: u64,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Schema version assumed by this event's payload.
    pub version: u32,
    /// Optional transaction-group tag.
    pub tx_id: Option<String>,
    pub payload: EventPayload,
    pub checksum: String,
}

impl Event {
    /// The wire form of this event (payload re-canonicalized).
    pub fn to_record(&self) -> Result<EventRecord> {
        Ok(EventRecord {
            id: self.id,
            kind: self.kind,
            timestamp: self.timestamp,
            version: self.version,
            tx_id: self.tx_id.clone(),
            payload: self.payload.to_value()?,
            checksum: self.checksum.clone(),
        })
    }

    /// Table this event touches, if any.
    pub fn table_name(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::SchemaCreated(p) => Some(&p.table_name),
            EventPayload::RowInserted(p) => Some(&p.table_name),
            EventPayload::RowUpdated(p) => Some(&p.table_name),
            EventPayload::RowDeleted(p) => Some(&p.table_name),
            EventPayload::SchemaEvolved(p) => Some(&p.table_name),
            EventPayload::SnapshotCreated(_) => None,
        }
    }

    /// Row id this event touches, if any.
    pub fn row_id(&self) -> Option<RowId> {
        match &self.payload {
            EventPayload::RowInserted(p) => Some(p.row_id),
            EventPayload::RowUpdated(p) => Some(p.row_id),
            EventPayload::RowDeleted(p) => Some(p.row_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use crate::value::Value;

    fn sample_record() -> EventRecord {
        let payload = EventPayload::RowInserted(RowInsertedPayload {
            table_name: "users".into(),
            row_id: 0,
            data: [
                ("id".to_string(), Value::Int(1)),
                ("name".to_string(), Value::Text("Alice".into())),
            ]
            .into_iter()
            .collect(),
        });
        let mut record = EventRecord {
            id: 1,
            kind: payload.kind(),
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            version: 1,
            tx_id: Some("tx_0".into()),
            payload: payload.to_value().unwrap(),
            checksum: String::new(),
        };
        record.checksum = record.compute_checksum().unwrap();
        record
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        let record = sample_record();
        assert_eq!(record.checksum.len(), 64);
        assert!(record.checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(record.validate_checksum());
    }

    #[test]
    fn test_checksum_stable_across_round_trip() {
        let record = sample_record();
        let line = serde_json::to_string(&record).unwrap();
        let decoded: EventRecord = serde_json::from_str(&line).unwrap();
        assert!(decoded.validate_checksum());
        assert_eq!(decoded.checksum, record.checksum);
    }

    #[test]
    fn test_tampering_breaks_checksum() {
        let mut record = sample_record();
        record.version = 2;
        assert!(!record.validate_checksum());
    }

    #[test]
    fn test_tx_id_omitted_when_absent() {
        let mut record = sample_record();
        record.tx_id = None;
        record.checksum = record.compute_checksum().unwrap();
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains("tx_id"));
        let decoded: EventRecord = serde_json::from_str(&line).unwrap();
        assert!(decoded.validate_checksum());
    }

    #[test]
    fn test_typed_round_trip() {
        let record = sample_record();
        let event = record.clone().into_event().unwrap();
        assert_eq!(event.kind, EventKind::RowInserted);
        assert_eq!(event.table_name(), Some("users"));
        assert_eq!(event.row_id(), Some(0));
        assert_eq!(event.to_record().unwrap(), record);
    }

    #[test]
    fn test_invalid_payload_detected() {
        let mut record = sample_record();
        // ROW_INSERTED without row_id is structurally sound JSON but not a
        // valid payload for its kind.
        record.payload = serde_json::json!({"table_name": "users"});
        record.checksum = record.compute_checksum().unwrap();
        assert!(record.validate_checksum());
        assert!(!record.payload_is_valid());
        let err = record.into_event().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPayload { event_id: 1, .. }));
    }

    #[test]
    fn test_schema_evolution_payload_round_trip() {
        let evolution = SchemaEvolution {
            added_columns: vec![
                Column::new("email", ColumnType::Text).with_default(Value::Text("none".into()))
            ],
            ..Default::default()
        };
        let payload = EventPayload::SchemaEvolved(SchemaEvolvedPayload {
            table_name: "users".into(),
            evolution,
            old_schema: vec![Column::new("id", ColumnType::Int).primary_key()],
            new_schema: vec![
                Column::new("id", ColumnType::Int).primary_key(),
                Column::new("email", ColumnType::Text),
            ],
        });
        let value = payload.to_value().unwrap();
        // Empty evolution lists are omitted on the wire
        assert!(value["evolution"].get("removed_columns").is_none());
        let back = EventPayload::from_value(EventKind::SchemaEvolved, value).unwrap();
        assert_eq!(back, payload);
    }
}

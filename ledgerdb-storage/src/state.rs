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

//! Derived state: the table contents reconstructed from events
//!
//! Replay is a pure, total, order-preserving function: the same event
//! sequence always yields the same state, and replaying `[1..k]` equals
//! restoring any snapshot at `s <= k` and replaying `[s+1..k]`. BTreeMaps
//! everywhere keep iteration order, and therefore serialization and
//! hashing, deterministic.
//!
//! Deletion is logical: a tombstoned row id stays in the row map (history
//! is never destroyed) but is invisible to the projections. Updates landing
//! on a tombstoned or never-inserted id merge into the stored map and stay
//! hidden by the tombstone rule; they never resurrect a row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use ledgerdb_core::{Event, EventPayload, Row, RowId};

use crate::migration::MigrationHandler;

/// Replayed table contents plus tombstones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedState {
    /// table -> row id -> row (active and logically-deleted union)
    pub tables: BTreeMap<String, BTreeMap<RowId, Row>>,
    /// table -> tombstoned row ids
    pub deleted_rows: BTreeMap<String, BTreeMap<RowId, bool>>,
}

impl DerivedState {
    pub fn ensure_table(&mut self, table: &str) {
        if !self.tables.contains_key(table) {
            self.tables.insert(table.to_string(), BTreeMap::new());
            self.deleted_rows.insert(table.to_string(), BTreeMap::new());
        }
    }

    pub fn is_deleted(&self, table: &str, row_id: RowId) -> bool {
        self.deleted_rows
            .get(table)
            .is_some_and(|dead| dead.contains_key(&row_id))
    }

    /// Rows visible through the tombstone filter, ascending by row id.
    pub fn visible_rows(&self, table: &str) -> Vec<(RowId, &Row)> {
        let Some(rows) = self.tables.get(table) else {
            return Vec::new();
        };
        rows.iter()
            .filter(|(id, _)| !self.is_deleted(table, **id))
            .map(|(id, row)| (*id, row))
            .collect()
    }

    /// A single row, if present and not tombstoned.
    pub fn get_row(&self, table: &str, row_id: RowId) -> Option<&Row> {
        if self.is_deleted(table, row_id) {
            return None;
        }
        self.tables.get(table)?.get(&row_id)
    }

    /// The stored row regardless of tombstones (historical view).
    pub fn raw_row(&self, table: &str, row_id: RowId) -> Option<&Row> {
        self.tables.get(table)?.get(&row_id)
    }

    /// Apply one event. `migrate` carries the migration handler and the
    /// target schema version; rows from older-versioned ROW_INSERTED events
    /// are migrated forward, and a failed migration keeps the row as
    /// written (logged, never fatal).
    pub fn apply(&mut self, event: &Event, migrate: Option<(&MigrationHandler, u32)>) {
        match &event.payload {
            EventPayload::SchemaCreated(p) => {
                self.ensure_table(&p.table_name);
            }
            EventPayload::RowInserted(p) => {
                self.ensure_table(&p.table_name);
                let mut row = p.data.clone();
                if let Some((handler, target)) = migrate {
                    if event.version < target {
                        match handler.migrate_row_if_needed(
                            &p.table_name,
                            &row,
                            event.version,
                            target,
                        ) {
                            Ok(migrated) => row = migrated,
                            Err(e) => warn!(
                                table = %p.table_name,
                                row_id = p.row_id,
                                error = %e,
                                "row migration failed during replay; keeping original shape"
                            ),
                        }
                    }
                }
                self.tables
                    .get_mut(&p.table_name)
                    .expect("table ensured above")
                    .insert(p.row_id, row);
                self.deleted_rows
                    .get_mut(&p.table_name)
                    .expect("table ensured above")
                    .remove(&p.row_id);
            }
            EventPayload::RowUpdated(p) => {
                self.ensure_table(&p.table_name);
                let row = self
                    .tables
                    .get_mut(&p.table_name)
                    .expect("table ensured above")
                    .entry(p.row_id)
                    .or_default();
                for (column, value) in &p.changes {
                    row.insert(column.clone(), value.clone());
                }
                // Tombstone state is deliberately untouched.
            }
            EventPayload::RowDeleted(p) => {
                self.ensure_table(&p.table_name);
                self.deleted_rows
                    .get_mut(&p.table_name)
                    .expect("table ensured above")
                    .insert(p.row_id, true);
                // The row entry is retained for historical reconstruction.
            }
            EventPayload::SchemaEvolved(p) => {
                self.ensure_table(&p.table_name);
            }
            EventPayload::SnapshotCreated(_) => {}
        }
    }
}

/// Replay a full event sequence into a fresh state.
pub fn replay_events(events: &[Event]) -> DerivedState {
    replay_events_up_to(events, 0)
}

/// Replay events up to and including `up_to_event_id` (0 means all),
/// reconstructing the state as of that point in history.
pub fn replay_events_up_to(events: &[Event], up_to_event_id: u64) -> DerivedState {
    let mut state = DerivedState::default();
    for event in events {
        if up_to_event_id > 0 && event.id > up_to_event_id {
            break;
        }
        state.apply(event, None);
    }
    state
}

/// Replay events onto a clone of `base`, ignoring events already covered by
/// the base (`id <= base_event_id`).
pub fn replay_onto(
    base: &DerivedState,
    events: &[Event],
    base_event_id: u64,
    migrate: Option<(&MigrationHandler, u32)>,
) -> DerivedState {
    let mut state = base.clone();
    for event in events {
        if event.id <= base_event_id {
            continue;
        }
        state.apply(event, migrate);
    }
    state
}

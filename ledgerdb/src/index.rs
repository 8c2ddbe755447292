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

//! Hash indexes for equality lookups
//!
//! One index per (table, column): canonical value string -> row ids. Not
//! durable: indexes live in memory and are rebuilt from derived state at
//! startup, which keeps them always consistent with the log.

use std::collections::HashMap;

use ledgerdb_core::{Row, RowId, Value};

/// In-memory equality index over one column.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    column: String,
    data: HashMap<String, Vec<RowId>>,
}

impl HashIndex {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            data: HashMap::new(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Record a row under a value. Duplicates are allowed; uniqueness is a
    /// schema concern enforced by the caller before insertion.
    pub fn add(&mut self, value: &Value, row_id: RowId) {
        self.data
            .entry(value.canonical_key())
            .or_default()
            .push(row_id);
    }

    /// Remove one occurrence of (value, row id); drops the key once empty.
    pub fn remove(&mut self, value: &Value, row_id: RowId) {
        let key = value.canonical_key();
        if let Some(ids) = self.data.get_mut(&key) {
            if let Some(pos) = ids.iter().position(|id| *id == row_id) {
                ids.remove(pos);
            }
            if ids.is_empty() {
                self.data.remove(&key);
            }
        }
    }

    /// Row ids recorded under a value; empty when the value is unknown.
    pub fn lookup(&self, value: &Value) -> &[RowId] {
        self.data
            .get(&value.canonical_key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn exists(&self, value: &Value) -> bool {
        self.data.contains_key(&value.canonical_key())
    }

    /// Replace the contents by scanning a row set.
    pub fn rebuild<'a>(&mut self, rows: impl IntoIterator<Item = (RowId, &'a Row)>) {
        self.data.clear();
        for (row_id, row) in rows {
            if let Some(value) = row.get(&self.column) {
                self.add(value, row_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

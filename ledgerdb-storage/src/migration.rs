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

//! Replay-time migration bridge
//!
//! Connects the schema registry to the derived-state builder: rows from
//! ROW_INSERTED events whose schema version is older than the replay target
//! are migrated forward before landing in the state.

use std::sync::Arc;

use ledgerdb_core::{Result, Row, SchemaRegistry};

/// Applies registered migrations to rows during replay.
#[derive(Clone)]
pub struct MigrationHandler {
    registry: Arc<SchemaRegistry>,
}

impl MigrationHandler {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Identity when the versions match, otherwise a stepwise forward
    /// migration through the registry.
    pub fn migrate_row_if_needed(
        &self,
        table: &str,
        row: &Row,
        from_version: u32,
        to_version: u32,
    ) -> Result<Row> {
        if from_version == to_version {
            return Ok(row.clone());
        }
        self.registry.migrate_row(table, row, from_version, to_version)
    }
}

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

//! LedgerDB Core
//!
//! Fundamental types for an event-sourced relational database:
//!
//! - **Values & rows**: heterogeneous rows with one canonical string form
//!   driving every equality decision
//! - **Schemas**: typed column sets with row validation
//! - **Events**: the checksummed, sequentially-numbered records that are the
//!   single source of truth
//! - **Catalog**: current table definitions, persisted per data directory
//! - **Evolution**: versioned schemas with forward, on-read row migration
//!
//! The storage layer (`ledgerdb-storage`) persists and replays these types;
//! the façade crate (`ledgerdb`) is the user-facing entry point.

pub mod catalog;
pub mod error;
pub mod event;
pub mod evolution;
pub mod schema;
pub mod value;

pub use catalog::{Catalog, CATALOG_FILE};
pub use error::{LedgerError, Result};
pub use event::{
    ColumnModification, Event, EventKind, EventPayload, EventRecord, RowDeletedPayload,
    RowInsertedPayload, RowUpdatedPayload, SchemaCreatedPayload, SchemaEvolution,
    SchemaEvolvedPayload, SnapshotCreatedPayload,
};
pub use evolution::{
    CompatibilityCheck, CompatibilityStatus, Migration, MigrationOp, SchemaRegistry,
    SchemaVersionDef,
};
pub use schema::{Column, ColumnType, TableSchema};
pub use value::{values_equal, Row, RowId, Value};

/// Crate version.
pub const LEDGERDB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initial schema version of a fresh database.
pub const INITIAL_SCHEMA_VERSION: u32 = 1;

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

//! # LedgerDB
//!
//! An event-sourced relational database: the append-only, checksummed event
//! log is the single source of truth, and every observable state is a
//! deterministic replay of it.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Database                          │
//! │   validation · uniqueness · row ids · indexes · cache    │
//! ├───────────────┬────────────────────┬─────────────────────┤
//! │  EventStore   │    QueryEngine     │    SnapshotStore    │
//! │ (typed log)   │ (snapshot + tail)  │  (hashed restore)   │
//! ├───────────────┴────────────────────┴─────────────────────┤
//! │          events.log · snapshots/ · _catalog              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerdb::{Column, ColumnType, Database, Row, Value, WhereClause};
//!
//! let db = Database::open("./data")?;
//! db.create_table("users", vec![
//!     Column::new("id", ColumnType::Int).primary_key(),
//!     Column::new("name", ColumnType::Text),
//! ])?;
//!
//! let mut row = Row::new();
//! row.insert("id".into(), Value::Int(1));
//! row.insert("name".into(), Value::Text("Alice".into()));
//! db.insert("users", row)?;
//!
//! let rows = db.select("users", Some(&WhereClause::new("id", Value::Int(1))))?;
//! ```

pub mod database;
pub mod index;

pub use database::{Database, DatabaseConfig, JoinOn, WhereClause};
pub use index::HashIndex;

// The full core and storage vocabulary, re-exported for callers
pub use ledgerdb_core::{
    values_equal, Catalog, Column, ColumnModification, ColumnType, CompatibilityCheck,
    CompatibilityStatus, Event, EventKind, EventPayload, EventRecord, LedgerError, Migration,
    MigrationOp, Result, Row, RowId, SchemaEvolution, SchemaRegistry, TableSchema, Value,
};
pub use ledgerdb_storage::{
    CorruptionIssue, CorruptionReport, DerivedState, EventStore, QueryEngine, ReplayOptions,
    ReplayOutcome, SnapshotMeta, SnapshotStore,
};

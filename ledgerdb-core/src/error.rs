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

//! Error types for LedgerDB

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("validation failed for table '{table}': {reason}")]
    Validation { table: String, reason: String },

    #[error("duplicate key in '{table}.{column}': value '{value}' already exists")]
    DuplicateKey {
        table: String,
        column: String,
        value: String,
    },

    #[error("table '{0}' does not exist")]
    NoSuchTable(String),

    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    #[error("{0} requires a WHERE clause")]
    WhereRequired(&'static str),

    #[error("checksum mismatch on event {event_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        event_id: u64,
        expected: String,
        actual: String,
    },

    #[error("invalid {kind} payload on event {event_id}: {reason}")]
    InvalidPayload {
        event_id: u64,
        kind: String,
        reason: String,
    },

    #[error("no migration path for table '{table}' from v{from} to v{to}")]
    NoMigrationPath { table: String, from: u32, to: u32 },

    #[error("cannot migrate backwards from v{from} to v{to}")]
    BackwardMigration { from: u32, to: u32 },

    #[error("snapshot '{0}' is corrupt: data hash mismatch")]
    SnapshotCorrupt(String),

    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("no snapshots available")]
    NoSnapshot,
}

pub type Result<T> = std::result::Result<T, LedgerError>;

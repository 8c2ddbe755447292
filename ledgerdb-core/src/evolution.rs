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

//! Schema versioning and forward migration
//!
//! Every table's column set is versioned; migrations are registered between
//! adjacent versions and applied lazily, on read: rows written under an old
//! version are migrated forward when replayed under a newer target version.
//! Stored data is never rewritten.
//!
//! A migration is an ordered list of column-level operators from a closed
//! set: add (with default), remove, modify, rename. Paths are strictly
//! forward and stepwise: migrating v1 to v3 applies v1->v2 then v2->v3.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::schema::Column;
use crate::value::{Row, Value};

/// A single column-level migration operator.
#[derive(Debug, Clone)]
pub enum MigrationOp {
    /// Add a column; rows missing it get `default`.
    AddColumn { column: Column, default: Value },
    /// Delete a column.
    RemoveColumn { name: String },
    /// Change a column definition; the value is preserved as-is
    /// (no type coercion is performed).
    ModifyColumn {
        name: String,
        old_def: Column,
        new_def: Column,
    },
    /// Move a value under a new name.
    RenameColumn { old_name: String, new_name: String },
}

/// An ordered list of operators taking rows from one version to the next.
#[derive(Debug, Clone)]
pub struct Migration {
    pub from_version: u32,
    pub to_version: u32,
    pub operations: Vec<MigrationOp>,
}

impl Migration {
    pub fn apply(&self, row: &Row) -> Row {
        let mut result = row.clone();
        for op in &self.operations {
            match op {
                MigrationOp::AddColumn { column, default } => {
                    result
                        .entry(column.name.clone())
                        .or_insert_with(|| default.clone());
                }
                MigrationOp::RemoveColumn { name } => {
                    result.remove(name);
                }
                MigrationOp::ModifyColumn { .. } => {
                    // Value preserved; the definition change is metadata only.
                }
                MigrationOp::RenameColumn { old_name, new_name } => {
                    if let Some(value) = result.remove(old_name) {
                        result.insert(new_name.clone(), value);
                    }
                }
            }
        }
        result
    }
}

/// Outcome of a compatibility check between two schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityStatus {
    /// Same version.
    Compatible,
    /// Older rows are readable through a registered forward path.
    MigrationNeeded,
    /// A version is unknown or the forward path has gaps.
    Incompatible,
}

impl fmt::Display for CompatibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityStatus::Compatible => write!(f, "COMPATIBLE"),
            CompatibilityStatus::MigrationNeeded => write!(f, "MIGRATION_NEEDED"),
            CompatibilityStatus::Incompatible => write!(f, "INCOMPATIBLE"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompatibilityCheck {
    pub status: CompatibilityStatus,
    pub message: String,
}

/// One registered version of a table's column set.
#[derive(Debug, Clone)]
pub struct SchemaVersionDef {
    pub table_name: String,
    pub version: u32,
    pub columns: Vec<Column>,
}

#[derive(Default)]
struct RegistryInner {
    /// table -> version -> column set
    schemas: HashMap<String, HashMap<u32, SchemaVersionDef>>,
    /// (table, from, to) -> migration; only adjacent steps are registered
    migrations: HashMap<(String, u32, u32), Migration>,
}

/// Tracks all known schema versions per table and the migrations between
/// them. Shared between the write path (which registers versions) and the
/// replay path (which migrates rows), hence the interior lock.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<RegistryInner>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_schema(&self, table: impl Into<String>, version: u32, columns: Vec<Column>) {
        let table = table.into();
        let mut inner = self.inner.write();
        inner.schemas.entry(table.clone()).or_default().insert(
            version,
            SchemaVersionDef {
                table_name: table,
                version,
                columns,
            },
        );
    }

    pub fn register_migration(
        &self,
        table: impl Into<String>,
        from_version: u32,
        to_version: u32,
        operations: Vec<MigrationOp>,
    ) {
        let table = table.into();
        let mut inner = self.inner.write();
        inner.migrations.insert(
            (table, from_version, to_version),
            Migration {
                from_version,
                to_version,
                operations,
            },
        );
    }

    pub fn get_schema(&self, table: &str, version: u32) -> Option<SchemaVersionDef> {
        self.inner
            .read()
            .schemas
            .get(table)
            .and_then(|versions| versions.get(&version))
            .cloned()
    }

    /// Highest registered version for a table, 0 if unknown.
    pub fn latest_version(&self, table: &str) -> u32 {
        self.inner
            .read()
            .schemas
            .get(table)
            .map(|versions| versions.keys().copied().max().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Whether every step `v -> v+1` in `[from, to)` is registered.
    pub fn has_migration_path(&self, table: &str, from: u32, to: u32) -> bool {
        let inner = self.inner.read();
        (from..to).all(|v| {
            inner
                .migrations
                .contains_key(&(table.to_string(), v, v + 1))
        })
    }

    /// Migrate a row forward through the registered steps.
    ///
    /// Identity when `from == to`; `BackwardMigration` when `from > to`;
    /// `NoMigrationPath` if any step is missing.
    pub fn migrate_row(&self, table: &str, row: &Row, from: u32, to: u32) -> Result<Row> {
        if from == to {
            return Ok(row.clone());
        }
        if from > to {
            return Err(LedgerError::BackwardMigration { from, to });
        }

        let inner = self.inner.read();
        let mut current = row.clone();
        for version in from..to {
            let migration = inner
                .migrations
                .get(&(table.to_string(), version, version + 1))
                .ok_or_else(|| LedgerError::NoMigrationPath {
                    table: table.to_string(),
                    from: version,
                    to: version + 1,
                })?;
            current = migration.apply(&current);
        }
        Ok(current)
    }

    pub fn check_compatibility(&self, table: &str, old: u32, new: u32) -> CompatibilityCheck {
        let inner = self.inner.read();
        let known = |v: u32| {
            inner
                .schemas
                .get(table)
                .is_some_and(|versions| versions.contains_key(&v))
        };

        if !known(old) || !known(new) {
            return CompatibilityCheck {
                status: CompatibilityStatus::Incompatible,
                message: format!("unknown schema version for table '{}'", table),
            };
        }
        if old == new {
            return CompatibilityCheck {
                status: CompatibilityStatus::Compatible,
                message: format!("{}: v{} == v{}", table, old, new),
            };
        }
        if old > new {
            return CompatibilityCheck {
                status: CompatibilityStatus::Incompatible,
                message: format!("{}: backward read v{} -> v{}", table, old, new),
            };
        }
        drop(inner);
        if self.has_migration_path(table, old, new) {
            CompatibilityCheck {
                status: CompatibilityStatus::MigrationNeeded,
                message: format!("{}: migration available v{} -> v{}", table, old, new),
            }
        } else {
            CompatibilityCheck {
                status: CompatibilityStatus::Incompatible,
                message: format!("{}: no migration path v{} -> v{}", table, old, new),
            }
        }
    }
}

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

//! Table catalog
//!
//! Current table definitions, persisted as a single `_catalog` JSON file in
//! the data directory. Loaded at startup (absent file means empty catalog),
//! written on every table creation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};
use crate::schema::{Column, TableSchema};

pub const CATALOG_FILE: &str = "_catalog";

#[derive(Debug)]
pub struct Catalog {
    data_dir: PathBuf,
    tables: BTreeMap<String, TableSchema>,
}

impl Catalog {
    /// Load the catalog from `data_dir`, or start empty if no file exists.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let path = data_dir.join(CATALOG_FILE);
        let tables = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };

        Ok(Self { data_dir, tables })
    }

    fn catalog_file(&self) -> PathBuf {
        self.data_dir.join(CATALOG_FILE)
    }

    fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.tables)?;
        fs::write(self.catalog_file(), bytes)?;
        Ok(())
    }

    /// Register a new table. Fails with `DuplicateTable` if the name is
    /// taken; persists the catalog file on success.
    pub fn create_table(&mut self, name: impl Into<String>, columns: Vec<Column>) -> Result<&TableSchema> {
        let name = name.into();
        if self.tables.contains_key(&name) {
            return Err(LedgerError::DuplicateTable(name));
        }
        let schema = TableSchema::new(name.clone(), columns);
        self.tables.insert(name.clone(), schema);
        self.save()?;
        Ok(&self.tables[&name])
    }

    /// Re-insert a table observed in the event log but missing from the
    /// catalog file (recovery path). Overwrites nothing and persists.
    pub fn restore_table(&mut self, schema: TableSchema) -> Result<()> {
        if self.tables.contains_key(&schema.name) {
            return Ok(());
        }
        self.tables.insert(schema.name.clone(), schema);
        self.save()
    }

    pub fn get_table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| LedgerError::NoSuchTable(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn all_tables(&self) -> &BTreeMap<String, TableSchema> {
        &self.tables
    }
}

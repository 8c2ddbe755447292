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

//! The database façade
//!
//! The single entry point for mutations and queries. Every logical change
//! appends exactly one event; the write path is: validate against the
//! catalog schema, check index-backed uniqueness, allocate the row id,
//! append the event, maintain indexes, invalidate the query cache, and
//! snapshot when the log crosses the configured interval.
//!
//! One readers/writer lock guards the catalog, the indexes and the row-id
//! counters. Mutations hold the write lock across validation, event
//! emission and index maintenance so indexes and log can never drift;
//! selects and joins take the read lock and see a per-call snapshot of
//! derived state. Lock order below the façade: event store, then snapshot
//! store, then the query-engine cache.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use ledgerdb_core::{
    values_equal, Catalog, Column, Event, EventPayload, LedgerError, MigrationOp, Result, Row,
    RowId, SchemaEvolution, SchemaRegistry, TableSchema, Value,
};
use ledgerdb_storage::{
    detect_corruption, replay_events_up_to, replay_with_options, schema_version_history,
    CorruptionReport, DerivedState, EventStore, MigrationHandler, QueryEngine, ReplayOptions,
    ReplayOutcome, SnapshotStore,
};

use crate::index::HashIndex;

/// A simple equality predicate: `column = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub column: String,
    pub value: Value,
}

impl WhereClause {
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column)
            .is_some_and(|v| values_equal(v, &self.value))
    }
}

/// An inner-equijoin condition: `left_table.left_column = right_table.right_column`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOn {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

/// Database tuning knobs.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// A snapshot is captured whenever `last_event_id % snapshot_interval`
    /// lands on zero. Because one statement can emit several events, a
    /// boundary can be stepped over without firing; the next aligned event
    /// id catches up. 0 disables snapshotting.
    pub snapshot_interval: u64,
    /// Whether reads compose from the latest snapshot plus tail replay.
    pub use_snapshots: bool,
    /// Keep at most this many snapshots, pruning the oldest after each
    /// capture. `None` keeps everything.
    pub max_snapshots: Option<usize>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 100,
            use_snapshots: true,
            max_snapshots: None,
        }
    }
}

struct DbInner {
    catalog: Catalog,
    /// table -> column -> index (primary-key and unique columns)
    indexes: HashMap<String, HashMap<String, HashIndex>>,
    /// table -> next row id to allocate
    next_row_id: HashMap<String, RowId>,
}

/// An event-sourced relational database over one data directory.
///
/// Concurrent use of the same data directory from several instances is not
/// supported; each instance assumes exclusive ownership of its files.
pub struct Database {
    event_store: Arc<EventStore>,
    snapshot_store: Arc<SnapshotStore>,
    query: Arc<QueryEngine>,
    registry: Arc<SchemaRegistry>,
    config: DatabaseConfig,
    inner: RwLock<DbInner>,
}

impl Database {
    /// Open a database with default configuration.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(data_dir, DatabaseConfig::default())
    }

    /// Open a database, replaying the event log to rebuild catalog entries,
    /// indexes and row-id counters.
    pub fn open_with_config(data_dir: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let event_store = Arc::new(EventStore::open(data_dir)?);
        let snapshot_store = Arc::new(SnapshotStore::open(data_dir)?);
        let registry = Arc::new(SchemaRegistry::new());
        let query = Arc::new(QueryEngine::new(
            event_store.clone(),
            snapshot_store.clone(),
            MigrationHandler::new(registry.clone()),
            config.use_snapshots,
        ));
        let mut catalog = Catalog::open(data_dir)?;

        // Reconcile the catalog with the log: every SCHEMA_CREATED for a
        // name the catalog file does not know yet is re-inserted, and every
        // observed schema version lands in the registry.
        let (events, _) = event_store.all_events();
        for event in &events {
            match &event.payload {
                EventPayload::SchemaCreated(p) => {
                    registry.register_schema(&p.table_name, event.version, p.columns.clone());
                    if !catalog.table_exists(&p.table_name) {
                        catalog.restore_table(TableSchema::new(
                            p.table_name.clone(),
                            p.columns.clone(),
                        ))?;
                    }
                }
                EventPayload::SchemaEvolved(p) => {
                    registry.register_schema(&p.table_name, event.version + 1, p.new_schema.clone());
                    // The evolution descriptor doubles as the forward
                    // migration for rows written before it.
                    registry.register_migration(
                        &p.table_name,
                        event.version,
                        event.version + 1,
                        migration_ops(&p.evolution),
                    );
                }
                _ => {}
            }
        }

        let db = Self {
            event_store,
            snapshot_store,
            query,
            registry,
            config,
            inner: RwLock::new(DbInner {
                catalog,
                indexes: HashMap::new(),
                next_row_id: HashMap::new(),
            }),
        };
        db.rebuild_all_indexes()?;
        Ok(db)
    }

    /// Rebuild every table's indexes and row-id counter from the current
    /// derived state. Row-id counters come from all observed ids,
    /// tombstoned rows included, so a deleted row's id is never reissued.
    fn rebuild_all_indexes(&self) -> Result<()> {
        let state = self.query.current_state()?;
        let mut inner = self.inner.write();
        let DbInner {
            catalog,
            indexes,
            next_row_id,
        } = &mut *inner;

        for (name, schema) in catalog.all_tables() {
            let mut table_indexes: HashMap<String, HashIndex> = schema
                .constrained_columns()
                .map(|col| (col.name.clone(), HashIndex::new(col.name.clone())))
                .collect();

            for (row_id, row) in state.visible_rows(name) {
                for idx in table_indexes.values_mut() {
                    if let Some(value) = row.get(idx.column()) {
                        idx.add(value, row_id);
                    }
                }
            }

            let next = state
                .tables
                .get(name)
                .and_then(|rows| rows.keys().max())
                .map(|max| max + 1)
                .unwrap_or(0);
            next_row_id.insert(name.clone(), next);
            indexes.insert(name.clone(), table_indexes);
        }

        info!(
            tables = inner.catalog.all_tables().len(),
            last_event_id = self.event_store.last_event_id(),
            "database recovered"
        );
        Ok(())
    }

    fn tx_tag(&self) -> String {
        format!("tx_{}", self.event_store.last_event_id())
    }

    /// Create a table: catalog entry, indexes for constrained columns, a
    /// fresh row-id counter, and one SCHEMA_CREATED event.
    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<Event> {
        let mut inner = self.inner.write();
        let schema = inner.catalog.create_table(name, columns)?.clone();

        let table_indexes: HashMap<String, HashIndex> = schema
            .constrained_columns()
            .map(|col| (col.name.clone(), HashIndex::new(col.name.clone())))
            .collect();
        inner.indexes.insert(name.to_string(), table_indexes);
        inner.next_row_id.insert(name.to_string(), 0);

        let event = self.event_store.record_schema_created(
            name,
            schema.columns.clone(),
            schema.primary_key.clone(),
            Some(self.tx_tag()),
        )?;
        self.registry
            .register_schema(name, event.version, schema.columns);
        self.query.invalidate_cache();
        Ok(event)
    }

    /// Insert a row. Validation and uniqueness checks run before anything
    /// is emitted, so a rejected insert leaves log and indexes untouched.
    pub fn insert(&self, table: &str, row: Row) -> Result<RowId> {
        let mut inner = self.inner.write();
        let schema = inner.catalog.get_table(table)?.clone();
        schema.validate_row(&row)?;

        if let Some(table_indexes) = inner.indexes.get(table) {
            for col in schema.constrained_columns() {
                if let (Some(idx), Some(value)) =
                    (table_indexes.get(&col.name), row.get(&col.name))
                {
                    if idx.exists(value) {
                        return Err(LedgerError::DuplicateKey {
                            table: table.to_string(),
                            column: col.name.clone(),
                            value: value.canonical_key(),
                        });
                    }
                }
            }
        }

        let row_id = inner.next_row_id.get(table).copied().unwrap_or(0);
        self.event_store
            .record_row_inserted(table, row_id, row.clone(), Some(self.tx_tag()))?;
        inner.next_row_id.insert(table.to_string(), row_id + 1);

        if let Some(table_indexes) = inner.indexes.get_mut(table) {
            for idx in table_indexes.values_mut() {
                if let Some(value) = row.get(idx.column()) {
                    idx.add(value, row_id);
                }
            }
        }

        self.query.invalidate_cache();
        self.maybe_snapshot();
        Ok(row_id)
    }

    /// Update one column on every row matching the where clause. All
    /// post-images are validated before any event is emitted, so a failing
    /// update changes nothing.
    pub fn update(
        &self,
        table: &str,
        set_column: &str,
        set_value: Value,
        where_clause: Option<&WhereClause>,
    ) -> Result<usize> {
        let mut inner = self.inner.write();
        let schema = inner.catalog.get_table(table)?.clone();
        let where_clause = where_clause.ok_or(LedgerError::WhereRequired("UPDATE"))?;

        let rows = self.query.visible_rows(table)?;
        let mut pending: Vec<(RowId, Row, Row)> = Vec::new();
        for (row_id, row) in rows {
            if !where_clause.matches(&row) {
                continue;
            }
            let mut new_row = row.clone();
            new_row.insert(set_column.to_string(), set_value.clone());
            schema.validate_row(&new_row)?;
            pending.push((row_id, row, new_row));
        }

        let tx = self.tx_tag();
        let mut count = 0;
        for (row_id, old_row, new_row) in pending {
            let changes: Row = [(set_column.to_string(), set_value.clone())]
                .into_iter()
                .collect();
            let old_values: Row = old_row
                .get(set_column)
                .map(|v| {
                    [(set_column.to_string(), v.clone())]
                        .into_iter()
                        .collect()
                })
                .unwrap_or_default();
            self.event_store.record_row_updated(
                table,
                row_id,
                changes,
                Some(old_values),
                Some(tx.clone()),
            )?;

            if let Some(table_indexes) = inner.indexes.get_mut(table) {
                for idx in table_indexes.values_mut() {
                    if let Some(value) = old_row.get(idx.column()) {
                        idx.remove(value, row_id);
                    }
                    if let Some(value) = new_row.get(idx.column()) {
                        idx.add(value, row_id);
                    }
                }
            }
            count += 1;
        }

        self.query.invalidate_cache();
        Ok(count)
    }

    /// Tombstone every row matching the where clause, carrying the previous
    /// row data in each ROW_DELETED event.
    pub fn delete(&self, table: &str, where_clause: Option<&WhereClause>) -> Result<usize> {
        let mut inner = self.inner.write();
        if !inner.catalog.table_exists(table) {
            return Err(LedgerError::NoSuchTable(table.to_string()));
        }
        let where_clause = where_clause.ok_or(LedgerError::WhereRequired("DELETE"))?;

        let rows = self.query.visible_rows(table)?;
        let tx = self.tx_tag();
        let mut count = 0;
        for (row_id, row) in rows {
            if !where_clause.matches(&row) {
                continue;
            }
            self.event_store.record_row_deleted(
                table,
                row_id,
                Some(row.clone()),
                Some(tx.clone()),
            )?;

            if let Some(table_indexes) = inner.indexes.get_mut(table) {
                for idx in table_indexes.values_mut() {
                    if let Some(value) = row.get(idx.column()) {
                        idx.remove(value, row_id);
                    }
                }
            }
            count += 1;
        }

        self.query.invalidate_cache();
        Ok(count)
    }

    /// Select rows, using the column's hash index when the where clause
    /// targets an indexed column, a filtered scan otherwise.
    pub fn select(&self, table: &str, where_clause: Option<&WhereClause>) -> Result<Vec<Row>> {
        let inner = self.inner.read();
        if !inner.catalog.table_exists(table) {
            return Err(LedgerError::NoSuchTable(table.to_string()));
        }
        let state = self.query.current_state()?;

        let mut result = Vec::new();
        match where_clause {
            Some(clause) => {
                let indexed = inner
                    .indexes
                    .get(table)
                    .and_then(|cols| cols.get(&clause.column));
                if let Some(idx) = indexed {
                    for row_id in idx.lookup(&clause.value) {
                        if let Some(row) = state.get_row(table, *row_id) {
                            result.push(row.clone());
                        }
                    }
                } else {
                    for (_, row) in state.visible_rows(table) {
                        if clause.matches(row) {
                            result.push(row.clone());
                        }
                    }
                }
            }
            None => {
                for (_, row) in state.visible_rows(table) {
                    result.push(row.clone());
                }
            }
        }
        Ok(result)
    }

    /// Nested-loop inner equijoin. Joined rows are keyed
    /// `"<table>.<column>"`; the optional where clause filters the joined
    /// row.
    pub fn join(
        &self,
        left: &str,
        right: &str,
        on: &JoinOn,
        where_clause: Option<&WhereClause>,
    ) -> Result<Vec<Row>> {
        let inner = self.inner.read();
        if !inner.catalog.table_exists(left) {
            return Err(LedgerError::NoSuchTable(left.to_string()));
        }
        if !inner.catalog.table_exists(right) {
            return Err(LedgerError::NoSuchTable(right.to_string()));
        }
        let state = self.query.current_state()?;

        let left_rows = state.visible_rows(left);
        let right_rows = state.visible_rows(right);
        let mut result = Vec::new();

        for (_, left_row) in &left_rows {
            let Some(left_value) = left_row.get(&on.left_column) else {
                continue;
            };
            for (_, right_row) in &right_rows {
                let Some(right_value) = right_row.get(&on.right_column) else {
                    continue;
                };
                if !values_equal(left_value, right_value) {
                    continue;
                }

                let mut joined = Row::new();
                for (column, value) in left_row.iter() {
                    joined.insert(format!("{}.{}", left, column), value.clone());
                }
                for (column, value) in right_row.iter() {
                    joined.insert(format!("{}.{}", right, column), value.clone());
                }

                if let Some(clause) = where_clause {
                    if !clause.matches(&joined) {
                        continue;
                    }
                }
                result.push(joined);
            }
        }
        Ok(result)
    }

    /// Evolve a table's schema: emits SCHEMA_EVOLVED, registers the new
    /// version and the matching forward migration. The catalog file keeps
    /// the creation-time schema; old rows are migrated on read.
    pub fn evolve_table(&self, table: &str, evolution: SchemaEvolution) -> Result<Event> {
        let _guard = self.inner.write();
        let schema = {
            let inner = &*_guard;
            inner.catalog.get_table(table)?.clone()
        };

        let old_columns = schema.columns;
        let new_columns = apply_evolution(&old_columns, &evolution);

        let event = self.event_store.record_schema_evolved(
            table,
            old_columns,
            new_columns.clone(),
            evolution.clone(),
            Some(self.tx_tag()),
        )?;
        let new_version = event.version + 1;
        self.registry.register_schema(table, new_version, new_columns);
        self.registry.register_migration(
            table,
            event.version,
            new_version,
            migration_ops(&evolution),
        );
        self.query.invalidate_cache();
        Ok(event)
    }

    fn maybe_snapshot(&self) {
        let interval = self.config.snapshot_interval;
        let last = self.event_store.last_event_id();
        if interval == 0 || last == 0 || last % interval != 0 {
            return;
        }
        match self.query.current_state() {
            Ok(state) => {
                if let Err(e) = self.snapshot_store.create(&state, last, last as i64) {
                    warn!(error = %e, base_event_id = last, "snapshot capture failed");
                    return;
                }
                if let Some(keep) = self.config.max_snapshots {
                    if let Err(e) = self.snapshot_store.prune(keep) {
                        warn!(error = %e, "snapshot prune failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "state derivation for snapshot failed"),
        }
    }

    /// Create an additional equality index over any column, populated from
    /// the current visible rows. Primary-key and unique columns are indexed
    /// automatically at table creation; this covers the rest.
    pub fn create_index(&self, table: &str, column: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let schema = inner.catalog.get_table(table)?.clone();
        let rows = self.query.visible_rows(table)?;
        if schema.column(column).is_none() {
            return Err(LedgerError::Validation {
                table: table.to_string(),
                reason: format!("cannot index unknown column '{}'", column),
            });
        }

        let mut index = HashIndex::new(column);
        for (row_id, row) in &rows {
            if let Some(value) = row.get(column) {
                index.add(value, *row_id);
            }
        }
        inner
            .indexes
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), index);
        Ok(())
    }

    /// Reconstruct the state as of a past event id (0 means the full log).
    /// Damaged events are skipped, exactly as in live replay.
    pub fn state_at(&self, event_id: u64) -> Result<DerivedState> {
        let events = self.event_store.events_from(1)?;
        Ok(replay_events_up_to(&events, event_id))
    }

    /// Schema versions each table has been observed under, in log order.
    pub fn schema_version_history(&self) -> Result<BTreeMap<String, Vec<u32>>> {
        let (events, _) = self.event_store.all_events();
        Ok(schema_version_history(&events))
    }

    /// Schema of a table as currently cataloged.
    pub fn table_schema(&self, table: &str) -> Result<TableSchema> {
        Ok(self.inner.read().catalog.get_table(table)?.clone())
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.inner.read().catalog.table_exists(table)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.inner.read().catalog.all_tables().keys().cloned().collect()
    }

    /// Analyze the full log for integrity faults.
    pub fn detect_corruption(&self) -> Result<CorruptionReport> {
        let records = self.event_store.read_records()?;
        Ok(detect_corruption(&records))
    }

    /// Tolerant replay of the full log under explicit options.
    pub fn replay_with_options(&self, opts: &ReplayOptions) -> Result<ReplayOutcome> {
        let records = self.event_store.read_records()?;
        let handler = MigrationHandler::new(self.registry.clone());
        Ok(replay_with_options(&records, opts, Some(&handler)))
    }

    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.event_store
    }

    pub fn snapshot_store(&self) -> &Arc<SnapshotStore> {
        &self.snapshot_store
    }

    pub fn query_engine(&self) -> &Arc<QueryEngine> {
        &self.query
    }

    pub fn schema_registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn close(&self) -> Result<()> {
        self.event_store.close()
    }
}

/// Apply an evolution descriptor to a column list, producing the new list.
fn apply_evolution(columns: &[Column], evolution: &SchemaEvolution) -> Vec<Column> {
    let mut result: Vec<Column> = columns
        .iter()
        .filter(|c| !evolution.removed_columns.contains(&c.name))
        .cloned()
        .collect();

    for modification in &evolution.modified_columns {
        if let Some(col) = result.iter_mut().find(|c| c.name == modification.name) {
            *col = modification.new_def.clone();
        }
    }
    for (old_name, new_name) in &evolution.renamed_columns {
        if let Some(col) = result.iter_mut().find(|c| c.name == *old_name) {
            col.name = new_name.clone();
        }
    }
    result.extend(evolution.added_columns.iter().cloned());
    result
}

/// The forward migration equivalent to an evolution descriptor.
fn migration_ops(evolution: &SchemaEvolution) -> Vec<MigrationOp> {
    let mut ops = Vec::new();
    for column in &evolution.added_columns {
        ops.push(MigrationOp::AddColumn {
            default: column.default.clone().unwrap_or(Value::Null),
            column: column.clone(),
        });
    }
    for name in &evolution.removed_columns {
        ops.push(MigrationOp::RemoveColumn { name: name.clone() });
    }
    for modification in &evolution.modified_columns {
        ops.push(MigrationOp::ModifyColumn {
            name: modification.name.clone(),
            old_def: modification.old_def.clone(),
            new_def: modification.new_def.clone(),
        });
    }
    for (old_name, new_name) in &evolution.renamed_columns {
        ops.push(MigrationOp::RenameColumn {
            old_name: old_name.clone(),
            new_name: new_name.clone(),
        });
    }
    ops
}

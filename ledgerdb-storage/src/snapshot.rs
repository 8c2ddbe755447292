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

//! Snapshot persistence
//!
//! A snapshot is a serialized derived state at a specific base event id,
//! protected by a SHA-256 over its `{tables, deleted_rows}` serialization.
//! Snapshots shorten recovery: restore the latest, then replay only the
//! tail. A persistent index file lists every snapshot in creation order;
//! the latest is the one with the highest base event id.
//!
//! Snapshot files are written to a temp name and renamed into place, so a
//! crash mid-write never leaves a half-snapshot under a live name.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use std::collections::BTreeMap;

use ledgerdb_core::{LedgerError, Result, Row, RowId};

use crate::state::DerivedState;

pub const SNAPSHOT_DIR: &str = "snapshots";
pub const SNAPSHOT_INDEX_FILE: &str = "index";

/// Snapshot metadata; matches the SNAPSHOT_CREATED payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub snapshot_id: String,
    pub base_event_id: u64,
    pub created_at: chrono::DateTime<Utc>,
    pub snapshot_path: String,
    pub data_hash: String,
    pub events_included: i64,
}

/// On-disk snapshot file: metadata plus the state's two maps inline.
///
/// The state is spelled out field by field (rather than flattened) so the
/// integer row-id map keys round-trip through serde_json's own key
/// handling.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    meta: SnapshotMeta,
    tables: BTreeMap<String, BTreeMap<RowId, Row>>,
    deleted_rows: BTreeMap<String, BTreeMap<RowId, bool>>,
}

impl SnapshotFile {
    fn into_state(self) -> DerivedState {
        DerivedState {
            tables: self.tables,
            deleted_rows: self.deleted_rows,
        }
    }
}

/// SHA-256 over the canonical serialization of a state, lowercase hex.
pub fn compute_state_hash(state: &DerivedState) -> Result<String> {
    let bytes = serde_json::to_vec(state)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Creates, restores, lists and prunes snapshots for one data directory.
pub struct SnapshotStore {
    snapshot_dir: PathBuf,
    history: RwLock<Vec<SnapshotMeta>>,
}

impl SnapshotStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let snapshot_dir = data_dir.as_ref().join(SNAPSHOT_DIR);
        fs::create_dir_all(&snapshot_dir)?;

        let index_path = snapshot_dir.join(SNAPSHOT_INDEX_FILE);
        let history = if index_path.exists() {
            let bytes = fs::read(&index_path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };

        Ok(Self {
            snapshot_dir,
            history: RwLock::new(history),
        })
    }

    fn index_path(&self) -> PathBuf {
        self.snapshot_dir.join(SNAPSHOT_INDEX_FILE)
    }

    fn save_index(&self, history: &[SnapshotMeta]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(history)?;
        fs::write(self.index_path(), bytes)?;
        Ok(())
    }

    /// Snapshot ids are `snap_<base>_<yyyymmdd_hhmmss>`; a numeric suffix
    /// disambiguates two snapshots landing in the same second.
    fn unique_snapshot_id(&self, history: &[SnapshotMeta], base_event_id: u64) -> String {
        let stem = format!(
            "snap_{}_{}",
            base_event_id,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let taken = |candidate: &str| {
            history.iter().any(|m| m.snapshot_id == candidate)
                || self.snapshot_dir.join(candidate).exists()
        };
        if !taken(&stem) {
            return stem;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", stem, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Persist a state at `base_event_id`, append its metadata to the index
    /// and return it.
    pub fn create(
        &self,
        state: &DerivedState,
        base_event_id: u64,
        events_included: i64,
    ) -> Result<SnapshotMeta> {
        let mut history = self.history.write();

        let snapshot_id = self.unique_snapshot_id(&history, base_event_id);
        let path = self.snapshot_dir.join(&snapshot_id);
        let meta = SnapshotMeta {
            snapshot_id: snapshot_id.clone(),
            base_event_id,
            created_at: Utc::now(),
            snapshot_path: path.to_string_lossy().into_owned(),
            data_hash: compute_state_hash(state)?,
            events_included,
        };

        let file = SnapshotFile {
            meta: meta.clone(),
            tables: state.tables.clone(),
            deleted_rows: state.deleted_rows.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        let tmp_path = self.snapshot_dir.join(format!("{}.tmp", snapshot_id));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        history.push(meta.clone());
        self.save_index(&history)?;

        info!(
            snapshot_id = %meta.snapshot_id,
            base_event_id,
            "snapshot created"
        );
        Ok(meta)
    }

    fn restore_meta(&self, meta: &SnapshotMeta) -> Result<DerivedState> {
        let bytes = fs::read(&meta.snapshot_path)?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)?;

        let stored_hash = file.meta.data_hash.clone();
        let state = file.into_state();
        let recomputed = compute_state_hash(&state)?;
        if recomputed != stored_hash {
            return Err(LedgerError::SnapshotCorrupt(meta.snapshot_id.clone()));
        }
        Ok(state)
    }

    /// Restore a snapshot by id, verifying its data hash.
    pub fn restore(&self, snapshot_id: &str) -> Result<(DerivedState, SnapshotMeta)> {
        let history = self.history.read();
        let meta = history
            .iter()
            .find(|m| m.snapshot_id == snapshot_id)
            .cloned()
            .ok_or_else(|| LedgerError::SnapshotNotFound(snapshot_id.to_string()))?;
        drop(history);

        let state = self.restore_meta(&meta)?;
        Ok((state, meta))
    }

    /// Restore the snapshot with the greatest base event id.
    pub fn restore_latest(&self) -> Result<(DerivedState, SnapshotMeta)> {
        let history = self.history.read();
        let meta = history
            .iter()
            .max_by_key(|m| m.base_event_id)
            .cloned()
            .ok_or(LedgerError::NoSnapshot)?;
        drop(history);

        let state = self.restore_meta(&meta)?;
        Ok((state, meta))
    }

    pub fn latest_meta(&self) -> Option<SnapshotMeta> {
        self.history
            .read()
            .iter()
            .max_by_key(|m| m.base_event_id)
            .cloned()
    }

    /// All snapshot metadata, ascending by base event id.
    pub fn history(&self) -> Vec<SnapshotMeta> {
        let mut metas = self.history.read().clone();
        metas.sort_by_key(|m| m.base_event_id);
        metas
    }

    /// Keep only the most recent `keep_n` snapshots, deleting the rest and
    /// rewriting the index.
    pub fn prune(&self, keep_n: usize) -> Result<()> {
        let mut history = self.history.write();
        if history.len() <= keep_n {
            return Ok(());
        }

        let cutoff = history.len() - keep_n;
        for meta in &history[..cutoff] {
            if let Err(e) = fs::remove_file(&meta.snapshot_path) {
                warn!(
                    snapshot_id = %meta.snapshot_id,
                    error = %e,
                    "failed to delete pruned snapshot file"
                );
            }
        }
        history.drain(..cutoff);
        self.save_index(&history)?;
        info!(kept = keep_n, "snapshots pruned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdb_core::{Row, Value};
    use tempfile::tempdir;

    fn sample_state() -> DerivedState {
        let mut state = DerivedState::default();
        state.ensure_table("users");
        let row: Row = [
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::Text("Alice".into())),
        ]
        .into_iter()
        .collect();
        state.tables.get_mut("users").unwrap().insert(0, row);
        state
            .deleted_rows
            .get_mut("users")
            .unwrap()
            .insert(7, true);
        state
    }

    #[test]
    fn test_create_restore_round_trip() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let state = sample_state();

        let meta = store.create(&state, 5, 5).unwrap();
        assert!(meta.snapshot_id.starts_with("snap_5_"));
        assert_eq!(meta.data_hash.len(), 64);

        let (restored, restored_meta) = store.restore(&meta.snapshot_id).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored_meta, meta);
    }

    #[test]
    fn test_restore_latest_picks_highest_base() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let state = sample_state();

        store.create(&state, 10, 10).unwrap();
        store.create(&state, 30, 30).unwrap();
        store.create(&state, 20, 20).unwrap();

        let (_, meta) = store.restore_latest().unwrap();
        assert_eq!(meta.base_event_id, 30);

        let history = store.history();
        assert_eq!(
            history.iter().map(|m| m.base_event_id).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
    }

    #[test]
    fn test_no_snapshot_error() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.restore_latest().unwrap_err(),
            LedgerError::NoSnapshot
        ));
        assert!(matches!(
            store.restore("snap_1_x").unwrap_err(),
            LedgerError::SnapshotNotFound(_)
        ));
    }

    #[test]
    fn test_corrupt_snapshot_detected() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let meta = store.create(&sample_state(), 3, 3).unwrap();

        // Flip row data inside the file without touching the stored hash
        let contents = fs::read_to_string(&meta.snapshot_path).unwrap();
        let tampered = contents.replace("Alice", "Mallory");
        assert_ne!(contents, tampered);
        fs::write(&meta.snapshot_path, tampered).unwrap();

        assert!(matches!(
            store.restore(&meta.snapshot_id).unwrap_err(),
            LedgerError::SnapshotCorrupt(_)
        ));
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempdir().unwrap();
        let meta = {
            let store = SnapshotStore::open(dir.path()).unwrap();
            store.create(&sample_state(), 4, 4).unwrap()
        };

        let store = SnapshotStore::open(dir.path()).unwrap();
        let (restored, _) = store.restore(&meta.snapshot_id).unwrap();
        assert_eq!(restored, sample_state());
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let state = sample_state();
        let metas: Vec<_> = (1..=4).map(|i| store.create(&state, i, i as i64).unwrap()).collect();

        store.prune(2).unwrap();
        let history = store.history();
        assert_eq!(
            history.iter().map(|m| m.base_event_id).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert!(!Path::new(&metas[0].snapshot_path).exists());
        assert!(Path::new(&metas[3].snapshot_path).exists());

        // Index on disk reflects the prune
        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.history().len(), 2);
    }

    #[test]
    fn test_same_second_snapshots_get_unique_ids() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let state = sample_state();
        let a = store.create(&state, 1, 1).unwrap();
        let b = store.create(&state, 1, 1).unwrap();
        assert_ne!(a.snapshot_id, b.snapshot_id);
    }
}

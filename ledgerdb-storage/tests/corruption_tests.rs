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

//! Corruption resilience tests for the event log and replay pipeline.
//!
//! Scenarios covered:
//!
//! 1. A single flipped event is detected, reported with its position, and
//!    excluded; the remaining log replays to the expected state
//! 2. A torn tail (truncation at an arbitrary byte) never breaks recovery;
//!    the valid prefix survives and id assignment restarts past it
//! 3. Snapshot + tail replay always equals full replay, with damage or not

use proptest::prelude::*;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::tempdir;

use ledgerdb_core::{Column, ColumnType, Row, Value};
use ledgerdb_storage::{
    detect_corruption, replay_with_options, EventStore, ReplayOptions, SnapshotStore,
    ISSUE_CHECKSUM_MISMATCH,
};

/// Flip all bits of one byte in a file (simulated bit rot).
fn corrupt_byte(path: &Path, offset: u64) -> std::io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    if file.read(&mut byte)? == 1 {
        byte[0] ^= 0xFF;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&byte)?;
    }
    Ok(())
}

/// Truncate a file at a byte boundary (simulated torn write).
fn truncate_file(path: &Path, len: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    Ok(())
}

/// Tamper with one event's payload inside its log line, keeping the line
/// valid JSON so the damage is an integrity fault, not a structural one.
fn tamper_event_payload(log_path: &Path, line_index: usize) {
    let contents = fs::read_to_string(log_path).unwrap();
    let mut lines: Vec<String> = contents.lines().map(String::from).collect();
    lines[line_index] = lines[line_index].replace("\"name\":\"user", "\"name\":\"USER");
    fs::write(log_path, lines.join("\n") + "\n").unwrap();
}

fn seed_users(store: &EventStore, count: i64) {
    store
        .record_schema_created(
            "users",
            vec![
                Column::new("id", ColumnType::Int).primary_key(),
                Column::new("name", ColumnType::Text),
            ],
            Some("id".into()),
            Some("tx_0".into()),
        )
        .unwrap();
    for i in 0..count {
        let row: Row = [
            ("id".to_string(), Value::Int(i)),
            ("name".to_string(), Value::Text(format!("user{}", i))),
        ]
        .into_iter()
        .collect();
        store
            .record_row_inserted("users", i, row, Some(format!("tx_{}", i)))
            .unwrap();
    }
}

#[test]
fn corrupting_event_7_of_20_is_detected_and_skipped() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("events.log");

    {
        let store = EventStore::open(dir.path()).unwrap();
        seed_users(&store, 19); // 1 schema event + 19 inserts = 20 events
        assert_eq!(store.last_event_id(), 20);
    }
    tamper_event_payload(&log_path, 6); // event id 7

    let store = EventStore::open(dir.path()).unwrap();
    let records = store.read_records().unwrap();
    let report = detect_corruption(&records);

    assert_eq!(report.total_events, 20);
    assert_eq!(report.corrupted_events, 1);
    assert_eq!(report.first_issue_at, 7);
    assert_eq!(report.last_valid_event, 20);
    assert!(report.can_partial_replay);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].issue_type, ISSUE_CHECKSUM_MISMATCH);

    // Replay with skip_corrupted yields the state of the 19 intact events
    let opts = ReplayOptions {
        skip_corrupted: true,
        collect_issues: true,
        ..Default::default()
    };
    let outcome = replay_with_options(&records, &opts, None);
    assert_eq!(outcome.events_processed, 19);

    let visible = outcome.state.visible_rows("users");
    assert_eq!(visible.len(), 18); // event 7 carried row id 5
    assert!(visible.iter().all(|(id, _)| *id != 5));
    assert!(outcome.state.get_row("users", 4).is_some());
    assert!(outcome.state.get_row("users", 6).is_some());
}

#[test]
fn valid_prefix_survives_mid_log_truncation() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("events.log");

    {
        let store = EventStore::open(dir.path()).unwrap();
        seed_users(&store, 10);
    }
    let full_len = fs::metadata(&log_path).unwrap().len();
    truncate_file(&log_path, full_len - 25).unwrap();

    let store = EventStore::open(dir.path()).unwrap();
    // The torn last record no longer counts toward id assignment
    assert_eq!(store.last_event_id(), 10);

    let (events, issues) = store.all_events();
    assert_eq!(events.len(), 10);
    assert_eq!(issues.len(), 1); // the structural tail

    // Appending after damage continues the id sequence of the valid prefix
    let row: Row = [
        ("id".to_string(), Value::Int(100)),
        ("name".to_string(), Value::Text("post-damage".into())),
    ]
    .into_iter()
    .collect();
    let event = store
        .record_row_inserted("users", 100, row, None)
        .unwrap();
    assert_eq!(event.id, 11);
}

#[test]
fn snapshot_plus_tail_matches_full_replay_around_damage() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("events.log");

    let store = EventStore::open(dir.path()).unwrap();
    let snapshots = SnapshotStore::open(dir.path()).unwrap();
    seed_users(&store, 8);

    // Snapshot at event 5, then more writes, then damage one tail event
    let records = store.read_records().unwrap();
    let base = replay_with_options(&records[..5], &ReplayOptions::default(), None).state;
    let meta = snapshots.create(&base, 5, 5).unwrap();
    drop(store);
    tamper_event_payload(&log_path, 7); // event id 8

    let store = EventStore::open(dir.path()).unwrap();
    let records = store.read_records().unwrap();
    let opts = ReplayOptions {
        skip_corrupted: true,
        ..Default::default()
    };

    let full = replay_with_options(&records, &opts, None).state;

    let (restored, _) = snapshots.restore(&meta.snapshot_id).unwrap();
    let tail_events: Vec<_> = records[5..]
        .iter()
        .filter(|r| r.validate_checksum())
        .cloned()
        .filter_map(|r| r.into_event().ok())
        .collect();
    let resumed = ledgerdb_storage::replay_onto(&restored, &tail_events, meta.base_event_id, None);
    assert_eq!(full, resumed);

    let tail_outcome = replay_with_options(&records[5..], &opts, None);
    assert_eq!(tail_outcome.report.corrupted_events, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Flipping any single byte inside the log never panics recovery, and
    /// replay produces exactly the state of the events that still verify.
    #[test]
    fn any_single_byte_flip_is_survivable(offset_frac in 0.0f64..1.0) {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("events.log");
        {
            let store = EventStore::open(dir.path()).unwrap();
            seed_users(&store, 12);
        }
        let len = fs::metadata(&log_path).unwrap().len();
        let offset = ((len as f64 - 1.0) * offset_frac) as u64;
        corrupt_byte(&log_path, offset).unwrap();

        // Recovery must not panic, whatever the flip hit
        let store = EventStore::open(dir.path()).unwrap();
        let records = store.read_records().unwrap();
        let opts = ReplayOptions { skip_corrupted: true, ..Default::default() };
        let outcome = replay_with_options(&records, &opts, None);

        // Cross-check against a replay of only the records that verify
        let clean: Vec<_> = records
            .iter()
            .filter(|r| r.validate_checksum() && r.payload_is_valid())
            .cloned()
            .collect();
        let expected = replay_with_options(&clean, &ReplayOptions::default(), None).state;
        prop_assert_eq!(outcome.state, expected);
    }

    /// Truncating the log at any byte leaves a readable valid prefix and a
    /// consistent next-id.
    #[test]
    fn any_truncation_leaves_consistent_prefix(len_frac in 0.0f64..1.0) {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("events.log");
        {
            let store = EventStore::open(dir.path()).unwrap();
            seed_users(&store, 12);
        }
        let len = fs::metadata(&log_path).unwrap().len();
        let keep = (len as f64 * len_frac) as u64;
        truncate_file(&log_path, keep).unwrap();

        let store = EventStore::open(dir.path()).unwrap();
        let (events, _issues) = store.all_events();
        // Events form a contiguous 1..=n prefix
        for (i, event) in events.iter().enumerate() {
            prop_assert_eq!(event.id, i as u64 + 1);
        }
        prop_assert_eq!(store.last_event_id(), events.len() as u64);
    }
}

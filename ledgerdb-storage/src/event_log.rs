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

//! The append-only event log
//!
//! Durable, ordered, checksum-protected storage for events: one JSON record
//! per line in `events.log`, fsynced on every append.
//!
//! ## Id assignment
//!
//! Opening the log counts structurally-decodable records from the start and
//! sets `next_id = count + 1`. The first undecodable record ends the
//! counting scan: a damaged tail is ignored for id assignment, so a fresh
//! append after a torn write overwrites nothing but may shadow ids of any
//! records stranded past the damage. That is the contract: ids of valid
//! events form the contiguous sequence `1..=last_id`.
//!
//! ## Read tolerance
//!
//! Readers distinguish two failure classes per record:
//! - structural (the line is not a decodable record): reading stops there
//! - integrity (checksum mismatch, payload invalid for the kind): the
//!   record is skipped and reading continues

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use ledgerdb_core::{Event, EventKind, EventPayload, EventRecord, Result};

pub const LOG_FILE: &str = "events.log";

/// A per-record diagnostic produced while reading the log.
#[derive(Debug, Clone)]
pub struct LogIssue {
    /// Id of the offending record, when it could be decoded far enough.
    pub event_id: Option<u64>,
    pub kind: Option<EventKind>,
    pub error: String,
    pub observed_at: DateTime<Utc>,
}

impl LogIssue {
    fn structural(line_no: usize, err: impl std::fmt::Display) -> Self {
        Self {
            event_id: None,
            kind: None,
            error: format!("structural error at record {}: {}", line_no, err),
            observed_at: Utc::now(),
        }
    }

    fn for_record(record: &EventRecord, err: impl std::fmt::Display) -> Self {
        Self {
            event_id: Some(record.id),
            kind: Some(record.kind),
            error: err.to_string(),
            observed_at: Utc::now(),
        }
    }
}

/// An event waiting for an id, used by [`EventLog::append_batch`].
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub payload: EventPayload,
    pub tx_id: Option<String>,
    pub version: u32,
}

struct LogInner {
    path: PathBuf,
    file: File,
    next_id: u64,
}

/// The append-only event log. All mutation goes through the interior write
/// lock; readers open the file independently under the read lock.
pub struct EventLog {
    inner: RwLock<LogInner>,
}

impl EventLog {
    /// Open (or create) the log at `data_dir/filename`. A fresh log starts
    /// with `next_id = 1`.
    pub fn open(data_dir: impl AsRef<Path>, filename: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let path = data_dir.as_ref().join(filename);

        let next_id = if path.exists() {
            Self::count_records(&path)? + 1
        } else {
            1
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), next_id, "event log opened");

        Ok(Self {
            inner: RwLock::new(LogInner {
                path,
                file,
                next_id,
            }),
        })
    }

    /// Count decodable records; the first structural failure ends the scan.
    fn count_records(path: &Path) -> Result<u64> {
        let reader = BufReader::new(File::open(path)?);
        let mut count = 0u64;
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if serde_json::from_str::<EventRecord>(&line).is_err() {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Append one event: assigns the next id, stamps the current UTC time,
    /// computes the checksum, writes the record and flushes it to stable
    /// storage before returning.
    pub fn append(
        &self,
        payload: EventPayload,
        tx_id: Option<String>,
        version: u32,
    ) -> Result<Event> {
        let mut inner = self.inner.write();

        let mut record = EventRecord {
            id: inner.next_id,
            kind: payload.kind(),
            timestamp: Utc::now(),
            version,
            tx_id: tx_id.clone(),
            payload: payload.to_value()?,
            checksum: String::new(),
        };
        record.checksum = record.compute_checksum()?;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        inner.file.write_all(&line)?;
        inner.file.sync_data()?;
        inner.next_id += 1;

        Ok(Event {
            id: record.id,
            kind: record.kind,
            timestamp: record.timestamp,
            version: record.version,
            tx_id,
            payload,
            checksum: record.checksum,
        })
    }

    /// Append a batch with consecutive ids and a single flush. If the write
    /// fails partway, the unflushed suffix becomes a recoverable damaged
    /// tail; no id is considered assigned until the flush succeeds.
    pub fn append_batch(&self, drafts: Vec<EventDraft>) -> Result<Vec<Event>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.write();

        let mut buffer = Vec::new();
        let mut events = Vec::with_capacity(drafts.len());
        let mut id = inner.next_id;
        for draft in drafts {
            let mut record = EventRecord {
                id,
                kind: draft.payload.kind(),
                timestamp: Utc::now(),
                version: draft.version,
                tx_id: draft.tx_id.clone(),
                payload: draft.payload.to_value()?,
                checksum: String::new(),
            };
            record.checksum = record.compute_checksum()?;
            buffer.extend_from_slice(&serde_json::to_vec(&record)?);
            buffer.push(b'\n');
            events.push(Event {
                id,
                kind: record.kind,
                timestamp: record.timestamp,
                version: record.version,
                tx_id: draft.tx_id,
                payload: draft.payload,
                checksum: record.checksum,
            });
            id += 1;
        }

        inner.file.write_all(&buffer)?;
        inner.file.sync_data()?;
        inner.next_id = id;
        Ok(events)
    }

    /// Read every valid event from the start. Integrity failures are
    /// reported and skipped; the first structural failure is reported and
    /// ends the read.
    pub fn read_all(&self) -> (Vec<Event>, Vec<LogIssue>) {
        let inner = self.inner.read();
        let mut events = Vec::new();
        let mut issues = Vec::new();

        let reader = match File::open(&inner.path) {
            Ok(f) => BufReader::new(f),
            Err(e) => {
                issues.push(LogIssue::structural(0, format!("cannot open log: {}", e)));
                return (events, issues);
            }
        };

        for (line_no, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    issues.push(LogIssue::structural(line_no + 1, e));
                    break;
                }
            };
            let record: EventRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    issues.push(LogIssue::structural(line_no + 1, e));
                    break;
                }
            };
            if !record.validate_checksum() {
                issues.push(LogIssue::for_record(&record, "checksum mismatch"));
                continue;
            }
            let (id, kind) = (record.id, record.kind);
            match record.into_event() {
                Ok(event) => events.push(event),
                Err(e) => {
                    issues.push(LogIssue {
                        event_id: Some(id),
                        kind: Some(kind),
                        error: e.to_string(),
                        observed_at: Utc::now(),
                    });
                }
            }
        }

        (events, issues)
    }

    /// The raw structurally-decodable prefix, checksums unverified.
    /// Corruption analysis and tolerant replay start from this.
    pub fn read_records(&self) -> Result<Vec<EventRecord>> {
        let inner = self.inner.read();
        let reader = BufReader::new(File::open(&inner.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            match serde_json::from_str::<EventRecord>(&line) {
                Ok(r) => records.push(r),
                Err(_) => break,
            }
        }
        Ok(records)
    }

    /// Events with `id >= start_id`, damaged records skipped silently.
    pub fn read_from(&self, start_id: u64) -> Result<Vec<Event>> {
        let inner = self.inner.read();
        let reader = BufReader::new(File::open(&inner.path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            let record: EventRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(_) => break,
            };
            if record.id < start_id {
                continue;
            }
            if !record.validate_checksum() {
                continue;
            }
            if let Ok(event) = record.into_event() {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// One less than the next id to assign; 0 for an empty log.
    pub fn last_id(&self) -> u64 {
        self.inner.read().next_id - 1
    }

    /// Flush and release the file handle's buffered state. Dropping the log
    /// closes the descriptor either way.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.file.flush()?;
        inner.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdb_core::{RowInsertedPayload, Value};
    use std::io::Seek;
    use tempfile::tempdir;

    fn insert_payload(table: &str, row_id: i64, name: &str) -> EventPayload {
        EventPayload::RowInserted(RowInsertedPayload {
            table_name: table.into(),
            row_id,
            data: [
                ("id".to_string(), Value::Int(row_id)),
                ("name".to_string(), Value::Text(name.into())),
            ]
            .into_iter()
            .collect(),
        })
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        assert_eq!(log.last_id(), 0);

        for i in 0..3 {
            let event = log
                .append(insert_payload("users", i, "x"), Some(format!("tx_{}", i)), 1)
                .unwrap();
            assert_eq!(event.id, i as u64 + 1);
        }
        assert_eq!(log.last_id(), 3);
    }

    #[test]
    fn test_append_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        let written = log
            .append(insert_payload("users", 0, "Alice"), Some("tx_0".into()), 1)
            .unwrap();

        let (events, issues) = log.read_all();
        assert!(issues.is_empty());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, written.id);
        assert_eq!(events[0].checksum, written.checksum);
        assert!(events[0].to_record().unwrap().validate_checksum());
    }

    #[test]
    fn test_reopen_continues_id_sequence() {
        let dir = tempdir().unwrap();
        {
            let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
            log.append(insert_payload("users", 0, "a"), None, 1).unwrap();
            log.append(insert_payload("users", 1, "b"), None, 1).unwrap();
        }
        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        assert_eq!(log.last_id(), 2);
        let event = log.append(insert_payload("users", 2, "c"), None, 1).unwrap();
        assert_eq!(event.id, 3);
    }

    #[test]
    fn test_append_batch_consecutive_ids_one_flush() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        log.append(insert_payload("users", 0, "a"), None, 1).unwrap();

        let drafts = (1..4)
            .map(|i| EventDraft {
                payload: insert_payload("users", i, "x"),
                tx_id: None,
                version: 1,
            })
            .collect();
        let events = log.append_batch(drafts).unwrap();
        assert_eq!(
            events.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
        let (read, issues) = log.read_all();
        assert!(issues.is_empty());
        assert_eq!(read.len(), 4);
    }

    #[test]
    fn test_damaged_tail_ends_counting_scan() {
        let dir = tempdir().unwrap();
        {
            let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
            log.append(insert_payload("users", 0, "a"), None, 1).unwrap();
            log.append(insert_payload("users", 1, "b"), None, 1).unwrap();
        }
        // Tear the last line in half
        let path = dir.path().join(LOG_FILE);
        let contents = std::fs::read_to_string(&path).unwrap();
        let keep = contents.len() - 20;
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(keep as u64).unwrap();
        file.sync_all().unwrap();

        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        // Only the intact first record counts toward id assignment
        assert_eq!(log.last_id(), 1);
    }

    #[test]
    fn test_checksum_corruption_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        {
            let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
            for i in 0..3 {
                log.append(insert_payload("users", i, "x"), None, 1).unwrap();
            }
        }
        // Flip a byte inside the second record's checksum field
        let path = dir.path().join(LOG_FILE);
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(String::from).collect();
        lines[1] = lines[1].replacen("\"checksum\":\"", "\"checksum\":\"0", 1);
        let mut file = OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
        file.rewind().unwrap();
        file.write_all((lines.join("\n") + "\n").as_bytes()).unwrap();

        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        let (events, issues) = log.read_all();
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].event_id, Some(2));

        // read_from skips the damaged record silently
        let tail = log.read_from(2).unwrap();
        assert_eq!(tail.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_empty_log_reads_empty() {
        let dir = tempdir().unwrap();
        let log = EventLog::open(dir.path(), LOG_FILE).unwrap();
        let (events, issues) = log.read_all();
        assert!(events.is_empty());
        assert!(issues.is_empty());
        assert_eq!(log.last_id(), 0);
    }
}

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

//! Corruption analysis and tolerant replay
//!
//! Corruption is localized: a damaged event is detected by its checksum (or
//! a payload that does not fit its kind), reported, and excluded, so the
//! rest of the log stays usable. Both entry points here work on raw
//! [`EventRecord`]s (the structurally-decodable prefix of the log) because
//! a record must be examinable even when it cannot be trusted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use ledgerdb_core::{Event, EventPayload, EventRecord};

use crate::migration::MigrationHandler;
use crate::state::DerivedState;

pub const ISSUE_CHECKSUM_MISMATCH: &str = "checksum_mismatch";
pub const ISSUE_INVALID_PAYLOAD: &str = "invalid_payload";

/// Replay configuration.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Migrate ROW_INSERTED rows written under an older schema version
    /// forward to this version.
    pub target_schema_version: Option<u32>,
    /// Recovery mode: damaged events are counted as recovered-over rather
    /// than merely diagnosed. Damaged events are never applied either way.
    pub skip_corrupted: bool,
    /// Collect per-event issues into the report.
    pub collect_issues: bool,
}

/// One corruption problem found in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorruptionIssue {
    pub event_id: u64,
    pub event_kind: String,
    /// `checksum_mismatch` or `invalid_payload`
    pub issue_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated corruption diagnostics for an event sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorruptionReport {
    pub total_events: usize,
    pub corrupted_events: usize,
    pub issues: Vec<CorruptionIssue>,
    /// Valid events encountered after the first issue.
    pub recovered_events: usize,
    /// Event id of the first corruption; 0 when the log is clean.
    pub first_issue_at: u64,
    /// Last event id that passed both integrity checks.
    pub last_valid_event: u64,
    pub can_partial_replay: bool,
}

impl CorruptionReport {
    pub fn is_clean(&self) -> bool {
        self.corrupted_events == 0
    }

    fn record_issue(&mut self, record: &EventRecord, issue_type: &str, collect: bool) {
        self.corrupted_events += 1;
        if self.first_issue_at == 0 {
            self.first_issue_at = record.id;
        }
        if collect {
            self.issues.push(CorruptionIssue {
                event_id: record.id,
                event_kind: record.kind.to_string(),
                issue_type: issue_type.to_string(),
                message: match issue_type {
                    ISSUE_CHECKSUM_MISMATCH => {
                        format!("event {} failed checksum validation", record.id)
                    }
                    _ => format!("event {} has an invalid {} payload", record.id, record.kind),
                },
                timestamp: record.timestamp,
            });
        }
    }

    fn record_valid(&mut self, event_id: u64) {
        self.last_valid_event = event_id;
        if self.first_issue_at != 0 {
            self.recovered_events += 1;
        }
    }

    fn finish(&mut self) {
        self.can_partial_replay = self.corrupted_events < self.total_events;
    }
}

impl fmt::Display for CorruptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Integrity report:")?;
        writeln!(
            f,
            "  events: {} total, {} corrupted, {} recovered",
            self.total_events, self.corrupted_events, self.recovered_events
        )?;
        if self.first_issue_at != 0 {
            writeln!(f, "  first issue at event: {}", self.first_issue_at)?;
            writeln!(f, "  last valid event: {}", self.last_valid_event)?;
        }
        writeln!(f, "  partial replay possible: {}", self.can_partial_replay)?;
        for issue in &self.issues {
            writeln!(
                f,
                "  - event {} ({}): {} - {}",
                issue.event_id, issue.event_kind, issue.issue_type, issue.message
            )?;
        }
        Ok(())
    }
}

/// Result of a tolerant replay: the state built from the trustworthy events
/// plus the diagnostics gathered along the way.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    pub state: DerivedState,
    pub report: CorruptionReport,
    pub events_processed: usize,
    /// Schema version in effect per table after replay (creation version,
    /// bumped by each SCHEMA_EVOLVED).
    pub table_versions: BTreeMap<String, u32>,
}

/// Schema versions each table has been observed under, in log order:
/// the creation version plus one entry per evolution.
pub fn schema_version_history(events: &[Event]) -> BTreeMap<String, Vec<u32>> {
    let mut history: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for event in events {
        match &event.payload {
            EventPayload::SchemaCreated(p) => {
                history
                    .entry(p.table_name.clone())
                    .or_default()
                    .push(event.version);
            }
            EventPayload::SchemaEvolved(p) => {
                let versions = history.entry(p.table_name.clone()).or_default();
                let new_version = event.version + 1;
                if !versions.contains(&new_version) {
                    versions.push(new_version);
                }
            }
            _ => {}
        }
    }
    history
}

/// Analyze a record sequence for integrity faults without building state.
pub fn detect_corruption(records: &[EventRecord]) -> CorruptionReport {
    let mut report = CorruptionReport {
        total_events: records.len(),
        ..Default::default()
    };

    for record in records {
        if !record.validate_checksum() {
            report.record_issue(record, ISSUE_CHECKSUM_MISMATCH, true);
        } else if !record.payload_is_valid() {
            report.record_issue(record, ISSUE_INVALID_PAYLOAD, true);
        } else {
            report.record_valid(record.id);
        }
    }

    report.finish();
    report
}

/// Replay a raw record sequence into derived state, excluding events that
/// fail integrity checks and reporting them per [`ReplayOptions`].
pub fn replay_with_options(
    records: &[EventRecord],
    opts: &ReplayOptions,
    migration: Option<&MigrationHandler>,
) -> ReplayOutcome {
    let mut outcome = ReplayOutcome {
        report: CorruptionReport {
            total_events: records.len(),
            ..Default::default()
        },
        ..Default::default()
    };

    let migrate = match (migration, opts.target_schema_version) {
        (Some(handler), Some(target)) => Some((handler, target)),
        _ => None,
    };

    for record in records {
        if !record.validate_checksum() {
            outcome
                .report
                .record_issue(record, ISSUE_CHECKSUM_MISMATCH, opts.collect_issues);
            continue;
        }
        let event = match record.clone().into_event() {
            Ok(event) => event,
            Err(_) => {
                outcome
                    .report
                    .record_issue(record, ISSUE_INVALID_PAYLOAD, opts.collect_issues);
                continue;
            }
        };

        outcome.report.record_valid(event.id);
        outcome.events_processed += 1;

        match &event.payload {
            EventPayload::SchemaCreated(p) => {
                outcome
                    .table_versions
                    .insert(p.table_name.clone(), event.version);
            }
            EventPayload::SchemaEvolved(p) => {
                // The event is stamped with the pre-evolution version; the
                // table is on the next one from here forward.
                outcome
                    .table_versions
                    .insert(p.table_name.clone(), event.version + 1);
            }
            _ => {}
        }

        outcome.state.apply(&event, migrate);
    }

    outcome.report.finish();
    outcome
}

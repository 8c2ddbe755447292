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

//! LedgerDB Storage
//!
//! The persistence and replay layer:
//!
//! - **Event log**: durable, ordered, checksummed records on disk
//! - **Event store**: typed operations over the log, row-version tracking
//! - **Derived state**: deterministic replay of events into table contents
//! - **Replay diagnostics**: corruption detection and tolerant replay
//! - **Snapshots**: hashed copies of derived state that shorten recovery
//! - **Query engine**: snapshot + tail composition behind a cache
//!
//! ```text
//!   events.log ──read──> EventStore ──replay──> DerivedState
//!        ▲                   │                      │
//!     append              tail events           snapshot
//!        │                   ▼                      ▼
//!    (façade)           QueryEngine <──restore── SnapshotStore
//! ```

pub mod event_log;
pub mod event_store;
pub mod migration;
pub mod query;
pub mod replay;
pub mod snapshot;
pub mod state;

pub use event_log::{EventDraft, EventLog, LogIssue, LOG_FILE};
pub use event_store::EventStore;
pub use migration::MigrationHandler;
pub use query::QueryEngine;
pub use replay::{
    detect_corruption, replay_with_options, schema_version_history, CorruptionIssue,
    CorruptionReport, ReplayOptions, ReplayOutcome, ISSUE_CHECKSUM_MISMATCH,
    ISSUE_INVALID_PAYLOAD,
};
pub use snapshot::{compute_state_hash, SnapshotMeta, SnapshotStore, SNAPSHOT_DIR};
pub use state::{replay_events, replay_events_up_to, replay_onto, DerivedState};

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

//! LedgerDB command line: an interactive SQL prompt by default, or the
//! HTTP adapter via `ledgerdb web [port]`.

mod error;
mod executor;
mod parser;
mod repl;
mod web;

use clap::{Parser as ClapParser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ledgerdb::Database;

use crate::executor::Executor;

#[derive(ClapParser)]
#[command(name = "ledgerdb", version, about = "An event-sourced relational database")]
struct Cli {
    /// Data directory holding the event log, snapshots and catalog
    #[arg(long, default_value = "./ledgerdb_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP adapter
    Web {
        /// Port to bind
        #[arg(default_value_t = 8080)]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db = match Database::open(&cli.data_dir) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("failed to open database at {}: {}", cli.data_dir.display(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        None => {
            let executor = Executor::new(db);
            repl::run(&executor);
        }
        Some(Command::Web { port }) => {
            if let Err(e) = web::serve(db, port) {
                eprintln!("http adapter failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

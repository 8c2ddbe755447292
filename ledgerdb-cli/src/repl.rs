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

//! The interactive SQL prompt

use std::io::{self, BufRead, Write};

use crate::executor::Executor;

const PROMPT: &str = "ledgerdb> ";

/// Read statements line by line until EOF or `exit`/`quit`. Errors are
/// printed and the loop continues.
pub fn run(executor: &Executor) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!(
        "LedgerDB {} (type 'exit' or 'quit' to leave)",
        env!("CARGO_PKG_VERSION")
    );
    loop {
        print!("{}", PROMPT);
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("input error: {}", e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        match executor.execute(input) {
            Ok(output) => println!("{}", output),
            Err(e) => eprintln!("error: {}", e),
        }
    }
}

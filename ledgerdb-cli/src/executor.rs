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

//! Statement executor: parsed SQL onto database operations.

use std::sync::Arc;

use ledgerdb::{Database, Row};

use crate::error::CliError;
use crate::parser::{Parser, Statement};

pub struct Executor {
    db: Arc<Database>,
    parser: Parser,
}

impl Executor {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            parser: Parser::new(),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Parse and run one statement, returning a printable result.
    pub fn execute(&self, sql: &str) -> Result<String, CliError> {
        match self.parser.parse(sql)? {
            Statement::CreateTable { table, columns } => {
                self.db.create_table(&table, columns)?;
                Ok(format!("Table '{}' created", table))
            }
            Statement::Insert { table, values } => {
                // Positional values map onto the schema's column order
                let schema = self.db.table_schema(&table)?;
                if values.len() != schema.columns.len() {
                    return Err(CliError::Parse(format!(
                        "expected {} values for table '{}', got {}",
                        schema.columns.len(),
                        table,
                        values.len()
                    )));
                }
                let row: Row = schema
                    .columns
                    .iter()
                    .zip(values)
                    .map(|(col, value)| (col.name.clone(), value))
                    .collect();
                let row_id = self.db.insert(&table, row)?;
                Ok(format!("Inserted row with ID {}", row_id))
            }
            Statement::Select {
                table,
                where_clause,
            } => {
                let rows = self.db.select(&table, where_clause.as_ref())?;
                Ok(format_rows(&rows))
            }
            Statement::Update {
                table,
                set_column,
                set_value,
                where_clause,
            } => {
                let count =
                    self.db
                        .update(&table, &set_column, set_value, where_clause.as_ref())?;
                Ok(format!("Updated {} row(s)", count))
            }
            Statement::Delete {
                table,
                where_clause,
            } => {
                let count = self.db.delete(&table, where_clause.as_ref())?;
                Ok(format!("Deleted {} row(s)", count))
            }
            Statement::Join {
                left,
                right,
                on,
                where_clause,
            } => {
                let rows = self.db.join(&left, &right, &on, where_clause.as_ref())?;
                Ok(format_rows(&rows))
            }
        }
    }
}

fn format_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "No rows returned".to_string();
    }
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|(column, value)| format!("{}: {}", column, value))
            .collect();
        lines.push(format!("{{{}}}", fields.join(", ")));
    }
    lines.push(format!("{} row(s)", rows.len()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn executor(dir: &std::path::Path) -> Executor {
        Executor::new(Arc::new(Database::open(dir).unwrap()))
    }

    #[test]
    fn test_full_statement_round() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());

        exec.execute("CREATE TABLE users (id INT PRIMARY KEY, name TEXT, active BOOL)")
            .unwrap();
        assert_eq!(
            exec.execute("INSERT INTO users VALUES (1, 'Alice', true)")
                .unwrap(),
            "Inserted row with ID 0"
        );
        exec.execute("INSERT INTO users VALUES (2, 'Bob', false)")
            .unwrap();

        let out = exec.execute("SELECT * FROM users WHERE id = 2").unwrap();
        assert!(out.contains("name: Bob"));
        assert!(out.contains("1 row(s)"));

        assert_eq!(
            exec.execute("UPDATE users SET name = 'Bobby' WHERE id = 2")
                .unwrap(),
            "Updated 1 row(s)"
        );
        assert_eq!(
            exec.execute("DELETE FROM users WHERE id = 1").unwrap(),
            "Deleted 1 row(s)"
        );
        let out = exec.execute("SELECT * FROM users").unwrap();
        assert!(out.contains("Bobby"));
        assert!(!out.contains("Alice"));
    }

    #[test]
    fn test_insert_arity_mismatch() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        exec.execute("CREATE TABLE users (id INT, name TEXT)").unwrap();
        assert!(exec.execute("INSERT INTO users VALUES (1)").is_err());
    }

    #[test]
    fn test_errors_are_printable() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        let err = exec.execute("SELECT * FROM ghosts").unwrap_err();
        assert!(err.to_string().contains("ghosts"));
    }
}

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

//! SQL statement parser
//!
//! A small regex-driven parser for the statement forms the database
//! supports: CREATE TABLE, INSERT, SELECT (with optional equality WHERE),
//! SELECT ... JOIN ... ON, UPDATE and DELETE. Anything fancier belongs to a
//! real SQL frontend, which this deliberately is not.

use regex::Regex;

use ledgerdb::{Column, ColumnType, JoinOn, Value, WhereClause};

use crate::error::CliError;

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Vec<Column>,
    },
    Insert {
        table: String,
        values: Vec<Value>,
    },
    Select {
        table: String,
        where_clause: Option<WhereClause>,
    },
    Update {
        table: String,
        set_column: String,
        set_value: Value,
        where_clause: Option<WhereClause>,
    },
    Delete {
        table: String,
        where_clause: Option<WhereClause>,
    },
    Join {
        left: String,
        right: String,
        on: JoinOn,
        where_clause: Option<WhereClause>,
    },
}

pub struct Parser {
    create_table: Regex,
    insert: Regex,
    select: Regex,
    join: Regex,
    update: Regex,
    delete: Regex,
    column_def: Regex,
    where_expr: Regex,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            create_table: Regex::new(r"(?i)^CREATE\s+TABLE\s+(\w+)\s*\((.+)\)$").unwrap(),
            insert: Regex::new(r"(?i)^INSERT\s+INTO\s+(\w+)\s+VALUES\s*\((.+)\)$").unwrap(),
            select: Regex::new(r"(?i)^SELECT\s+\*\s+FROM\s+(\w+)(?:\s+WHERE\s+(.+))?$").unwrap(),
            join: Regex::new(
                r"(?i)^SELECT\s+\*\s+FROM\s+(\w+)\s+JOIN\s+(\w+)\s+ON\s+(\w+)\.(\w+)\s*=\s*(\w+)\.(\w+)(?:\s+WHERE\s+(.+))?$",
            )
            .unwrap(),
            update: Regex::new(
                r"(?i)^UPDATE\s+(\w+)\s+SET\s+(\w+)\s*=\s*(.+?)(?:\s+WHERE\s+(.+))?$",
            )
            .unwrap(),
            delete: Regex::new(r"(?i)^DELETE\s+FROM\s+(\w+)(?:\s+WHERE\s+(.+))?$").unwrap(),
            column_def: Regex::new(
                r"(?i)^(\w+)\s+(INT|TEXT|BOOL)(\s+PRIMARY\s+KEY)?(\s+UNIQUE)?$",
            )
            .unwrap(),
            where_expr: Regex::new(r"(?i)^(\w+(?:\.\w+)?)\s*=\s*(.+)$").unwrap(),
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Statement, CliError> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(CliError::Parse("empty statement".into()));
        }
        let upper = sql.to_uppercase();

        if upper.starts_with("CREATE TABLE") {
            self.parse_create_table(sql)
        } else if upper.starts_with("INSERT INTO") {
            self.parse_insert(sql)
        } else if upper.starts_with("SELECT") {
            if upper.contains(" JOIN ") {
                self.parse_join(sql)
            } else {
                self.parse_select(sql)
            }
        } else if upper.starts_with("UPDATE") {
            self.parse_update(sql)
        } else if upper.starts_with("DELETE FROM") {
            self.parse_delete(sql)
        } else {
            Err(CliError::Parse(format!("unsupported statement: {}", sql)))
        }
    }

    fn parse_create_table(&self, sql: &str) -> Result<Statement, CliError> {
        let caps = self
            .create_table
            .captures(sql)
            .ok_or_else(|| CliError::Parse("invalid CREATE TABLE syntax".into()))?;
        let table = caps[1].to_string();

        let mut columns = Vec::new();
        for part in split_top_level(&caps[2]) {
            let def = self
                .column_def
                .captures(part.trim())
                .ok_or_else(|| CliError::Parse(format!("invalid column definition: {}", part)))?;
            let column_type = match def[2].to_uppercase().as_str() {
                "INT" => ColumnType::Int,
                "TEXT" => ColumnType::Text,
                "BOOL" => ColumnType::Bool,
                other => return Err(CliError::Parse(format!("unknown type: {}", other))),
            };
            let mut column = Column::new(def[1].to_string(), column_type);
            if def.get(3).is_some() {
                column = column.primary_key();
            }
            if def.get(4).is_some() {
                column = column.unique();
            }
            columns.push(column);
        }
        if columns.is_empty() {
            return Err(CliError::Parse("a table needs at least one column".into()));
        }
        Ok(Statement::CreateTable { table, columns })
    }

    fn parse_insert(&self, sql: &str) -> Result<Statement, CliError> {
        let caps = self
            .insert
            .captures(sql)
            .ok_or_else(|| CliError::Parse("invalid INSERT syntax".into()))?;
        let values = split_top_level(&caps[2])
            .iter()
            .map(|part| parse_value(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Statement::Insert {
            table: caps[1].to_string(),
            values,
        })
    }

    fn parse_select(&self, sql: &str) -> Result<Statement, CliError> {
        let caps = self
            .select
            .captures(sql)
            .ok_or_else(|| CliError::Parse("invalid SELECT syntax".into()))?;
        let where_clause = match caps.get(2) {
            Some(expr) => Some(self.parse_where(expr.as_str())?),
            None => None,
        };
        Ok(Statement::Select {
            table: caps[1].to_string(),
            where_clause,
        })
    }

    fn parse_join(&self, sql: &str) -> Result<Statement, CliError> {
        let caps = self
            .join
            .captures(sql)
            .ok_or_else(|| CliError::Parse("invalid JOIN syntax".into()))?;
        let where_clause = match caps.get(7) {
            Some(expr) => Some(self.parse_where(expr.as_str())?),
            None => None,
        };
        Ok(Statement::Join {
            left: caps[1].to_string(),
            right: caps[2].to_string(),
            on: JoinOn {
                left_table: caps[3].to_string(),
                left_column: caps[4].to_string(),
                right_table: caps[5].to_string(),
                right_column: caps[6].to_string(),
            },
            where_clause,
        })
    }

    fn parse_update(&self, sql: &str) -> Result<Statement, CliError> {
        let caps = self
            .update
            .captures(sql)
            .ok_or_else(|| CliError::Parse("invalid UPDATE syntax".into()))?;
        let where_clause = match caps.get(4) {
            Some(expr) => Some(self.parse_where(expr.as_str())?),
            None => None,
        };
        Ok(Statement::Update {
            table: caps[1].to_string(),
            set_column: caps[2].to_string(),
            set_value: parse_value(caps[3].trim())?,
            where_clause,
        })
    }

    fn parse_delete(&self, sql: &str) -> Result<Statement, CliError> {
        let caps = self
            .delete
            .captures(sql)
            .ok_or_else(|| CliError::Parse("invalid DELETE syntax".into()))?;
        let where_clause = match caps.get(2) {
            Some(expr) => Some(self.parse_where(expr.as_str())?),
            None => None,
        };
        Ok(Statement::Delete {
            table: caps[1].to_string(),
            where_clause,
        })
    }

    fn parse_where(&self, expr: &str) -> Result<WhereClause, CliError> {
        let caps = self
            .where_expr
            .captures(expr.trim())
            .ok_or_else(|| CliError::Parse(format!("invalid WHERE clause: {}", expr)))?;
        Ok(WhereClause::new(
            caps[1].to_string(),
            parse_value(caps[2].trim())?,
        ))
    }
}

/// Split a comma-separated list, ignoring commas inside quoted strings.
fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// A literal: quoted text, true/false, integer, float, or a bare word.
fn parse_value(raw: &str) -> Result<Value, CliError> {
    if raw.is_empty() {
        return Err(CliError::Parse("empty value".into()));
    }
    if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
    {
        return Ok(Value::Text(raw[1..raw.len() - 1].to_string()));
    }
    match raw.to_lowercase().as_str() {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Ok(Value::Float(f));
    }
    Ok(Value::Text(raw.to_string()))
}

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

//! Table schemas and row validation

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::value::{Row, Value};

/// Supported column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "INT")]
    Int,
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "BOOL")]
    Bool,
}

impl ColumnType {
    /// Whether a value is acceptable for this column type.
    ///
    /// `Int` accepts the floating-point representation as well: JSON has a
    /// single number type, so an INT written through the log can come back
    /// as either shape.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ColumnType::Int, Value::Int(_)) | (ColumnType::Int, Value::Float(_)) => true,
            (ColumnType::Text, Value::Text(_)) => true,
            (ColumnType::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Bool => write!(f, "BOOL"),
        }
    }
}

/// A column definition.
///
/// This is both the catalog shape and the wire shape used inside
/// SCHEMA_CREATED / SCHEMA_EVOLVED payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A table schema: name, ordered column list, optional primary-key column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

impl TableSchema {
    /// Build a schema, deriving `primary_key` from the column flags.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let primary_key = columns
            .iter()
            .find(|c| c.primary_key)
            .map(|c| c.name.clone());
        Self {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns that carry a uniqueness constraint (primary key included).
    pub fn constrained_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key || c.unique)
    }

    /// Validate a row against this schema: every column present with an
    /// acceptable value, and nothing the schema does not know about.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        for col in &self.columns {
            let value = row.get(&col.name).ok_or_else(|| LedgerError::Validation {
                table: self.name.clone(),
                reason: format!("missing column '{}'", col.name),
            })?;
            if !col.column_type.accepts(value) {
                return Err(LedgerError::Validation {
                    table: self.name.clone(),
                    reason: format!(
                        "column '{}' expects {}, got {}",
                        col.name,
                        col.column_type,
                        value.type_name()
                    ),
                });
            }
        }
        for key in row.keys() {
            if self.column(key).is_none() {
                return Err(LedgerError::Validation {
                    table: self.name.clone(),
                    reason: format!("unexpected column '{}'", key),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::new("id", ColumnType::Int).primary_key(),
                Column::new("name", ColumnType::Text),
                Column::new("active", ColumnType::Bool),
            ],
        )
    }

    fn row(id: Value, name: &str, active: bool) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), id);
        r.insert("name".into(), Value::Text(name.into()));
        r.insert("active".into(), Value::Bool(active));
        r
    }

    #[test]
    fn test_primary_key_derived_from_columns() {
        assert_eq!(users_schema().primary_key.as_deref(), Some("id"));
    }

    #[test]
    fn test_validate_accepts_int_and_float_for_int_column() {
        let schema = users_schema();
        assert!(schema.validate_row(&row(Value::Int(1), "Alice", true)).is_ok());
        assert!(schema.validate_row(&row(Value::Float(1.0), "Alice", true)).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let schema = users_schema();
        let mut r = row(Value::Int(1), "Alice", true);
        r.remove("active");
        let err = schema.validate_row(&r).unwrap_err();
        assert!(err.to_string().contains("missing column 'active'"));
    }

    #[test]
    fn test_validate_rejects_extra_column() {
        let schema = users_schema();
        let mut r = row(Value::Int(1), "Alice", true);
        r.insert("extra".into(), Value::Int(9));
        let err = schema.validate_row(&r).unwrap_err();
        assert!(err.to_string().contains("unexpected column 'extra'"));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let schema = users_schema();
        let r = row(Value::Text("one".into()), "Alice", true);
        assert!(schema.validate_row(&r).is_err());
    }

    #[test]
    fn test_column_wire_names() {
        let col = Column::new("id", ColumnType::Int).primary_key();
        let json = serde_json::to_string(&col).unwrap();
        assert!(json.contains(r#""type":"INT""#));
        assert!(json.contains(r#""primary_key":true"#));
    }
}

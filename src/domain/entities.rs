// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Domain Entities
//!
//! The "Nouns" of the pipeline: columns, source values as the driver hands
//! them over, batches of rows, and the spreadsheet-safe cells they become.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Text written into a cell whose source value could not be converted.
pub const UNCONVERTIBLE_MARKER: &str = "#UNCONVERTIBLE";

/// The source type tag of a column, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Integer,
    /// Arbitrary-precision number (Oracle `NUMBER`).
    Decimal,
    Float,
    Boolean,
    Date,
    Timestamp,
    Binary,
    /// Character large object.
    Clob,
    /// Binary large object.
    Blob,
    /// Anything the driver reports that has no dedicated tag.
    Other(String),
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Text => write!(f, "TEXT"),
            SourceType::Integer => write!(f, "INTEGER"),
            SourceType::Decimal => write!(f, "DECIMAL"),
            SourceType::Float => write!(f, "FLOAT"),
            SourceType::Boolean => write!(f, "BOOLEAN"),
            SourceType::Date => write!(f, "DATE"),
            SourceType::Timestamp => write!(f, "TIMESTAMP"),
            SourceType::Binary => write!(f, "BINARY"),
            SourceType::Clob => write!(f, "CLOB"),
            SourceType::Blob => write!(f, "BLOB"),
            SourceType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Everything downstream stages need to know about one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name as returned by the query (e.g. "USER_ID").
    pub name: String,
    pub source_type: SourceType,
    pub nullable: bool,
    /// Zero-based position in the result set.
    pub ordinal: usize,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, source_type: SourceType, nullable: bool, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            source_type,
            nullable,
            ordinal,
        }
    }
}

/// A cell value exactly as the source produced it.
#[derive(Debug)]
pub enum SourceValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    /// Canonical decimal text, e.g. "12.50" or "-3".
    Decimal(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Binary(Vec<u8>),
    /// CLOB/NCLOB/LONG content, read inline by the driver.
    Lob(String),
    /// The driver could not read the value; carries the reason.
    Unreadable(String),
}

/// One source row, in column order.
pub type SourceRow = Vec<SourceValue>;

/// A bounded group of rows fetched together, in source order.
#[derive(Debug)]
pub struct RowBatch {
    /// Position of this batch in the stream, starting at 0.
    pub sequence: u64,
    /// Shared by every batch of the same stream.
    pub columns: Arc<[ColumnDescriptor]>,
    pub rows: Vec<SourceRow>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A spreadsheet-safe cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// The source value could not be mapped; rendered as [`UNCONVERTIBLE_MARKER`].
    Unconvertible,
}

impl CellValue {
    /// Text form used for width sampling and the delimited fallback file.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Text(s) => Cow::Borrowed(s.as_str()),
            CellValue::Integer(i) => Cow::Owned(i.to_string()),
            CellValue::Float(f) => Cow::Owned(f.to_string()),
            CellValue::Boolean(true) => Cow::Borrowed("TRUE"),
            CellValue::Boolean(false) => Cow::Borrowed("FALSE"),
            CellValue::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
            CellValue::DateTime(dt) => {
                if dt.nanosecond() == 0 {
                    Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string())
                } else {
                    Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
                }
            }
            CellValue::Unconvertible => Cow::Borrowed(UNCONVERTIBLE_MARKER),
        }
    }

    pub fn is_unconvertible(&self) -> bool {
        matches!(self, CellValue::Unconvertible)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The cell became the unconvertible marker.
    Unconvertible,
    /// The cell text was cut to the spreadsheet cell limit.
    Truncated,
}

/// A note about one cell produced while transforming a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDiagnostic {
    pub column: String,
    pub ordinal: usize,
    pub kind: DiagnosticKind,
    pub reason: String,
}

/// A row whose cells are all spreadsheet-safe.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub cells: Vec<CellValue>,
    pub diagnostics: Vec<CellDiagnostic>,
}

impl TransformedRow {
    pub fn failed_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_unconvertible()).count()
    }
}

/// A bind value for a parameterised query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Integer(i64),
    Text(String),
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryParam::Integer(i) => write!(f, "{}", i),
            QueryParam::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// What the server reports about itself, logged once per export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Product banner, e.g. "Oracle Database 19c Enterprise Edition".
    pub version: String,
    pub database: String,
    pub user: String,
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version={}, database={}, user={}",
            self.version, self.database, self.user
        )
    }
}

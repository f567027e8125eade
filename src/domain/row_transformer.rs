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

//! Maps source values to spreadsheet-safe cells.
//!
//! Conversion failures never leave this module: a cell that cannot be mapped
//! becomes [`CellValue::Unconvertible`] and the row carries a diagnostic.

use crate::domain::entities::{
    CellDiagnostic, CellValue, ColumnDescriptor, DiagnosticKind, SourceValue, TransformedRow,
};

/// Maximum characters a spreadsheet cell can hold.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Largest integer a spreadsheet stores without losing digits (15 significant digits).
pub const MAX_EXACT_INTEGER: i64 = 999_999_999_999_999;

/// Outcome of converting a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    Cell(CellValue),
    Truncated(CellValue, String),
    Failed(String),
}

/// Converts one row. The output always has one cell per input value.
pub fn transform(row: Vec<SourceValue>, columns: &[ColumnDescriptor]) -> TransformedRow {
    let mut cells = Vec::with_capacity(row.len());
    let mut diagnostics = Vec::new();

    for (idx, value) in row.into_iter().enumerate() {
        let column = columns
            .get(idx)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("COLUMN_{}", idx + 1));

        match convert_value(value) {
            Conversion::Cell(cell) => cells.push(cell),
            Conversion::Truncated(cell, reason) => {
                cells.push(cell);
                diagnostics.push(CellDiagnostic {
                    column,
                    ordinal: idx,
                    kind: DiagnosticKind::Truncated,
                    reason,
                });
            }
            Conversion::Failed(reason) => {
                cells.push(CellValue::Unconvertible);
                diagnostics.push(CellDiagnostic {
                    column,
                    ordinal: idx,
                    kind: DiagnosticKind::Unconvertible,
                    reason,
                });
            }
        }
    }

    TransformedRow { cells, diagnostics }
}

pub fn convert_value(value: SourceValue) -> Conversion {
    match value {
        SourceValue::Null => Conversion::Cell(CellValue::Empty),
        SourceValue::Text(s) => text_cell(s),
        SourceValue::Integer(i) => integer_cell(i),
        SourceValue::Float(f) => float_cell(f),
        SourceValue::Decimal(s) => decimal_cell(&s),
        SourceValue::Boolean(b) => Conversion::Cell(CellValue::Boolean(b)),
        SourceValue::Date(d) => Conversion::Cell(CellValue::Date(d)),
        SourceValue::DateTime(dt) => Conversion::Cell(CellValue::DateTime(dt)),
        SourceValue::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(s) => text_cell(s),
            Err(e) => Conversion::Failed(format!("binary value is not valid UTF-8: {}", e)),
        },
        SourceValue::Lob(s) => text_cell(s),
        SourceValue::Unreadable(reason) => Conversion::Failed(reason),
    }
}

fn text_cell(s: String) -> Conversion {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        None => Conversion::Cell(CellValue::Text(s)),
        Some((cut, _)) => {
            let total = s.chars().count();
            let mut s = s;
            s.truncate(cut);
            Conversion::Truncated(
                CellValue::Text(s),
                format!("text of {} chars truncated to {}", total, MAX_CELL_CHARS),
            )
        }
    }
}

fn integer_cell(i: i64) -> Conversion {
    if i.unsigned_abs() > MAX_EXACT_INTEGER as u64 {
        Conversion::Cell(CellValue::Text(i.to_string()))
    } else {
        Conversion::Cell(CellValue::Integer(i))
    }
}

fn float_cell(f: f64) -> Conversion {
    if f.is_finite() {
        Conversion::Cell(CellValue::Float(f))
    } else {
        Conversion::Cell(CellValue::Text(f.to_string()))
    }
}

fn decimal_cell(raw: &str) -> Conversion {
    let s = raw.trim();
    let integral = !s.contains(['.', 'e', 'E']);

    if integral {
        return match s.parse::<i64>() {
            Ok(i) => integer_cell(i),
            // Wider than i64 but still a well-formed integer literal.
            Err(_) if is_integer_literal(s) => Conversion::Cell(CellValue::Text(s.to_string())),
            Err(_) => Conversion::Failed(format!("invalid numeric value '{}'", raw)),
        };
    }

    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER as f64 => {
            Conversion::Cell(CellValue::Integer(f as i64))
        }
        Ok(f) => float_cell(f),
        Err(_) => Conversion::Failed(format!("invalid numeric value '{}'", raw)),
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

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

//! Builds the single-table export query.
//!
//! Only identifiers are interpolated into the SQL text, and only after
//! validation. Filter values are always bound as positional parameters.

use crate::domain::entities::QueryParam;
use crate::domain::errors::{ExportError, Result};
use std::collections::BTreeMap;

const MAX_IDENTIFIER_LEN: usize = 128;

/// SQL text plus its positional bind values (`:1`, `:2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl SourceQuery {
    /// `SELECT * FROM "SCHEMA"."TABLE" [WHERE "COL" = :1 AND ...] [ORDER BY ...]`
    pub fn for_table(
        table: &str,
        filters: &BTreeMap<String, QueryParam>,
        order_by: Option<&str>,
    ) -> Result<Self> {
        let mut sql = format!("SELECT * FROM {}", quote_qualified(table)?);
        let mut params = Vec::with_capacity(filters.len());

        if !filters.is_empty() {
            let mut clauses = Vec::with_capacity(filters.len());
            for (i, (column, value)) in filters.iter().enumerate() {
                clauses.push(format!("{} = :{}", quote_identifier(column)?, i + 1));
                params.push(value.clone());
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if let Some(order) = order_by.map(str::trim).filter(|o| !o.is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_clause(order)?);
        }

        Ok(Self { sql, params })
    }
}

/// Validates one identifier and returns it upper-cased and double-quoted,
/// which resolves the same object as the unquoted form would.
pub fn quote_identifier(name: &str) -> Result<String> {
    let name = name.trim();
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'));

    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(ExportError::ConfigError(format!(
            "invalid identifier '{}': expected a letter followed by letters, digits, '_', '$' or '#'",
            name
        )));
    }
    Ok(format!("\"{}\"", name.to_ascii_uppercase()))
}

/// Accepts `TABLE` or `SCHEMA.TABLE`.
pub fn quote_qualified(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.trim().split('.').collect();
    if parts.len() > 2 {
        return Err(ExportError::ConfigError(format!(
            "invalid table identifier '{}': at most one schema qualifier is allowed",
            name
        )));
    }
    let quoted = parts
        .into_iter()
        .map(quote_identifier)
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join("."))
}

fn order_clause(order: &str) -> Result<String> {
    let mut terms = Vec::new();
    for term in order.split(',') {
        let mut words = term.split_whitespace();
        let column = words.next().ok_or_else(|| {
            ExportError::ConfigError(format!("empty term in order_by '{}'", order))
        })?;
        let mut out = quote_identifier(column)?;
        match words.next().map(|w| w.to_ascii_uppercase()) {
            None => {}
            Some(dir) if dir == "ASC" || dir == "DESC" => {
                out.push(' ');
                out.push_str(&dir);
            }
            Some(other) => {
                return Err(ExportError::ConfigError(format!(
                    "invalid sort direction '{}' in order_by",
                    other
                )))
            }
        }
        if words.next().is_some() {
            return Err(ExportError::ConfigError(format!(
                "unexpected tokens in order_by term '{}'",
                term.trim()
            )));
        }
        terms.push(out);
    }
    Ok(terms.join(", "))
}

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

//! Oracle implementation of the source ports, on top of the `oracle` crate (ODPI-C).

use crate::domain::entities::{
    ColumnDescriptor, QueryParam, ServerInfo, SourceRow, SourceType, SourceValue,
};
use crate::domain::errors::SourceError;
use crate::domain::query::SourceQuery;
use crate::domain::secret::Secret;
use crate::infrastructure::oracle::error_codes::source_error;
use crate::ports::source_port::{Connector, SourceConnection, SourceCursor};
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use oracle::sql_type::{OracleType, Timestamp, ToSql};
use oracle::{Connection, ResultSet, Row};
use std::time::Duration;

/// Opens Oracle sessions for the pool.
#[derive(Debug, Clone)]
pub struct OracleConnector {
    username: String,
    password: Secret,
    connect_string: String,
    call_timeout: Option<Duration>,
    fetch_size: u32,
}

impl OracleConnector {
    pub fn new(
        username: &str,
        password: Secret,
        connect_string: &str,
        call_timeout: Option<Duration>,
        fetch_size: u32,
    ) -> Self {
        Self {
            username: username.to_string(),
            password,
            connect_string: connect_string.to_string(),
            call_timeout,
            fetch_size,
        }
    }
}

impl Connector for OracleConnector {
    fn connect(&self) -> Result<Box<dyn SourceConnection>, SourceError> {
        debug!("Connecting to {} as {}", self.connect_string, self.username);
        let conn = Connection::connect(
            &self.username,
            self.password.expose(),
            &self.connect_string,
        )
        .map_err(|e| source_error(&e))?;

        conn.set_call_timeout(self.call_timeout)
            .map_err(|e| source_error(&e))?;

        Ok(Box::new(OracleSourceConnection {
            conn,
            fetch_size: self.fetch_size,
        }))
    }
}

pub struct OracleSourceConnection {
    conn: Connection,
    fetch_size: u32,
}

impl SourceConnection for OracleSourceConnection {
    fn ping(&mut self) -> Result<(), SourceError> {
        self.conn.ping().map_err(|e| source_error(&e))
    }

    fn server_info(&mut self) -> Result<ServerInfo, SourceError> {
        let (version, banner) = self.conn.server_version().map_err(|e| source_error(&e))?;
        let (database, user) = self
            .conn
            .query_row_as::<(String, String)>(
                "SELECT SYS_CONTEXT('USERENV', 'DB_NAME'), USER FROM DUAL",
                &[],
            )
            .map_err(|e| source_error(&e))?;
        let version = match banner.lines().next() {
            Some(first) if !first.trim().is_empty() => first.trim().to_string(),
            _ => version.to_string(),
        };
        Ok(ServerInfo {
            version,
            database,
            user,
        })
    }

    fn execute<'a>(
        &'a mut self,
        query: &SourceQuery,
    ) -> Result<Box<dyn SourceCursor + 'a>, SourceError> {
        debug!("Executing: {}", query.sql);

        let binds: Vec<Box<dyn ToSql>> = query
            .params
            .iter()
            .map(|p| -> Box<dyn ToSql> {
                match p {
                    QueryParam::Integer(i) => Box::new(*i),
                    QueryParam::Text(s) => Box::new(s.clone()),
                }
            })
            .collect();
        let params: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();

        let stmt = self
            .conn
            .statement(&query.sql)
            .prefetch_rows(self.fetch_size)
            .fetch_array_size(self.fetch_size)
            .build()
            .map_err(|e| source_error(&e))?;
        let rows = stmt
            .into_result_set::<Row>(&params)
            .map_err(|e| source_error(&e))?;

        let column_types: Vec<OracleType> = rows
            .column_info()
            .iter()
            .map(|c| c.oracle_type().clone())
            .collect();
        let columns = rows
            .column_info()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                ColumnDescriptor::new(c.name(), map_oracle_type(c.oracle_type()), c.nullable(), i)
            })
            .collect();

        Ok(Box::new(OracleCursor {
            rows: Some(rows),
            columns,
            column_types,
        }))
    }
}

pub struct OracleCursor {
    rows: Option<ResultSet<'static, Row>>,
    columns: Vec<ColumnDescriptor>,
    column_types: Vec<OracleType>,
}

impl SourceCursor for OracleCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn fetch(&mut self, max_rows: usize) -> Result<Vec<SourceRow>, SourceError> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(max_rows);
        while out.len() < max_rows {
            match rows.next() {
                Some(Ok(row)) => {
                    let values = self
                        .column_types
                        .iter()
                        .enumerate()
                        .map(|(i, otype)| read_value(&row, i, otype))
                        .collect();
                    out.push(values);
                }
                Some(Err(e)) => return Err(source_error(&e)),
                None => break,
            }
        }
        Ok(out)
    }

    fn close(&mut self) {
        self.rows = None;
    }
}

/// Reads one column of a fetched row. Read failures stay inside the cell.
fn read_value(row: &Row, i: usize, otype: &OracleType) -> SourceValue {
    let value = match otype {
        OracleType::Number(_, _) | OracleType::Float(_) => row
            .get::<_, Option<String>>(i)
            .map(|v| v.map(SourceValue::Decimal)),
        OracleType::Int64 => row
            .get::<_, Option<i64>>(i)
            .map(|v| v.map(SourceValue::Integer)),
        OracleType::BinaryFloat | OracleType::BinaryDouble => row
            .get::<_, Option<f64>>(i)
            .map(|v| v.map(SourceValue::Float)),
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => row.get::<_, Option<Timestamp>>(i).map(|v| {
            v.map(|ts| match to_naive(&ts) {
                Some(dt) => SourceValue::DateTime(dt),
                None => SourceValue::Unreadable(format!("timestamp out of range: {}", ts)),
            })
        }),
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => row
            .get::<_, Option<Vec<u8>>>(i)
            .map(|v| v.map(SourceValue::Binary)),
        OracleType::CLOB | OracleType::NCLOB | OracleType::Long => row
            .get::<_, Option<String>>(i)
            .map(|v| v.map(SourceValue::Lob)),
        OracleType::Boolean => row
            .get::<_, Option<bool>>(i)
            .map(|v| v.map(SourceValue::Boolean)),
        _ => row
            .get::<_, Option<String>>(i)
            .map(|v| v.map(SourceValue::Text)),
    };

    match value {
        Ok(Some(v)) => v,
        Ok(None) => SourceValue::Null,
        Err(e) => SourceValue::Unreadable(e.to_string()),
    }
}

/// Converts an Oracle timestamp to a zone-less chrono value, keeping microseconds.
pub fn to_naive(ts: &Timestamp) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(ts.year(), ts.month(), ts.day())?.and_hms_micro_opt(
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.nanosecond() / 1000,
    )
}

pub fn map_oracle_type(otype: &OracleType) -> SourceType {
    match otype {
        OracleType::Varchar2(_)
        | OracleType::NVarchar2(_)
        | OracleType::Char(_)
        | OracleType::NChar(_)
        | OracleType::Rowid => SourceType::Text,
        OracleType::Int64 => SourceType::Integer,
        OracleType::Number(_, _) | OracleType::Float(_) => SourceType::Decimal,
        OracleType::BinaryFloat | OracleType::BinaryDouble => SourceType::Float,
        OracleType::Boolean => SourceType::Boolean,
        OracleType::Date => SourceType::Date,
        OracleType::Timestamp(_) | OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            SourceType::Timestamp
        }
        OracleType::Raw(_) | OracleType::LongRaw => SourceType::Binary,
        OracleType::CLOB | OracleType::NCLOB | OracleType::Long => SourceType::Clob,
        OracleType::BLOB => SourceType::Blob,
        other => SourceType::Other(other.to_string()),
    }
}

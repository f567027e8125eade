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

//! Core error definitions for the sheet exporter.
//!
//! `ExportError` is the crate-wide error, `SourceError` carries a categorised
//! database failure that the retry policy can reason about, and `WriteFault`
//! is what a workbook backend reports when it can no longer make progress.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// What went wrong on the database side, independent of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorCategory {
    /// The session was reset, closed or lost mid-call.
    ConnectionLost,
    /// No listener, service not registered, instance starting or stopping.
    ListenerUnavailable,
    /// Lock contention or exhausted server-side handlers.
    ResourceBusy,
    /// A call exceeded its timeout.
    Timeout,
    /// No pooled connection became available in time.
    PoolExhausted,
    Authentication,
    Authorization,
    /// Table, view or column does not exist.
    MissingObject,
    MalformedQuery,
    /// The server rejected a value (invalid number, overflow).
    DataError,
    Unknown,
}

impl fmt::Display for SourceErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceErrorCategory::ConnectionLost => "connection lost",
            SourceErrorCategory::ListenerUnavailable => "listener unavailable",
            SourceErrorCategory::ResourceBusy => "resource busy",
            SourceErrorCategory::Timeout => "timeout",
            SourceErrorCategory::PoolExhausted => "pool exhausted",
            SourceErrorCategory::Authentication => "authentication failed",
            SourceErrorCategory::Authorization => "insufficient privileges",
            SourceErrorCategory::MissingObject => "missing object",
            SourceErrorCategory::MalformedQuery => "malformed query",
            SourceErrorCategory::DataError => "data error",
            SourceErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A database failure with its driver code (e.g. `ORA-03113`) when known.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub category: SourceErrorCategory,
    pub code: Option<String>,
    pub message: String,
}

impl SourceError {
    pub fn new(category: SourceErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// True for failures after which the connection itself should not be reused.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self.category,
            SourceErrorCategory::ConnectionLost
                | SourceErrorCategory::ListenerUnavailable
                | SourceErrorCategory::Timeout
        )
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) if !self.message.contains(code.as_str()) => {
                write!(f, "{} [{}]: {}", self.category, code, self.message)
            }
            _ => write!(f, "{}: {}", self.category, self.message),
        }
    }
}

/// An unrecoverable failure of a workbook backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WriteFault(pub String);

impl WriteFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error types encountered during the export process.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source database error: {0}")]
    Source(#[from] SourceError),

    #[error("Workbook write failed: {0}")]
    Write(#[from] WriteFault),

    #[error("Fallback artifact failed: {0}")]
    FallbackError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Query stream is exhausted and cannot be advanced")]
    ExhaustedStream,

    #[error("Export cancelled")]
    Cancelled,
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::FallbackError(e.to_string())
    }
}

/// A specialized Result type for the sheet exporter.
pub type Result<T> = std::result::Result<T, ExportError>;

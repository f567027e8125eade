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

//! Session-scoped bookkeeping: counters, the error log and the final summary.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on conversion records kept in the log. The counter keeps
/// counting past it.
pub const MAX_CONVERSION_RECORDS: usize = 1000;

/// The pipeline stage an entry originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquire,
    Execute,
    Fetch,
    Transform,
    Write,
    Persist,
    Fallback,
    Release,
    Pool,
    Cancel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquire => "acquire",
            Stage::Execute => "execute",
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Write => "write",
            Stage::Persist => "persist",
            Stage::Fallback => "fallback",
            Stage::Release => "release",
            Stage::Pool => "pool",
            Stage::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordClass {
    Retryable,
    Fatal,
    Conversion,
    Fallback,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub class: RecordClass,
    pub stage: Stage,
    pub cause: String,
    /// 1-based attempt number within the operation that failed.
    pub attempt: u32,
    pub at: DateTime<Local>,
}

impl ErrorRecord {
    pub fn new(class: RecordClass, stage: Stage, cause: impl Into<String>, attempt: u32) -> Self {
        Self {
            class,
            stage,
            cause: cause.into(),
            attempt,
            at: Local::now(),
        }
    }
}

/// One line of the session log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionLogEntry {
    Failure(ErrorRecord),
    /// A retried operation eventually succeeded on `attempt`.
    Success { stage: Stage, attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Workbook,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// Counters and log for one export run. Owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct ExportSession {
    pub session_id: String,
    pub table: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub cells_failed: u64,
    pub retries: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub elapsed: Duration,
    pub artifact: Option<ArtifactInfo>,
    pub cancelled: bool,
    pub log: Vec<SessionLogEntry>,
    conversion_records: usize,
    /// Conversion failures past the record cap; counted, not logged.
    unlogged_conversions: usize,
}

impl ExportSession {
    pub fn new(session_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            table: table.into(),
            rows_read: 0,
            rows_written: 0,
            cells_failed: 0,
            retries: 0,
            started_at: Local::now(),
            finished_at: None,
            elapsed: Duration::ZERO,
            artifact: None,
            cancelled: false,
            log: Vec::new(),
            conversion_records: 0,
            unlogged_conversions: 0,
        }
    }

    pub fn record(&mut self, record: ErrorRecord) {
        self.log.push(SessionLogEntry::Failure(record));
    }

    pub fn record_success(&mut self, stage: Stage, attempt: u32) {
        self.log.push(SessionLogEntry::Success { stage, attempt });
    }

    /// Appends the attempt history of a retried operation.
    pub fn absorb(&mut self, history: Vec<SessionLogEntry>) {
        self.log.extend(history);
    }

    /// Counts a failed cell and logs it while under [`MAX_CONVERSION_RECORDS`].
    pub fn record_conversion(&mut self, cause: impl Into<String>) {
        self.cells_failed += 1;
        if self.conversion_records < MAX_CONVERSION_RECORDS {
            self.conversion_records += 1;
            self.record(ErrorRecord::new(RecordClass::Conversion, Stage::Transform, cause, 1));
        } else {
            self.unlogged_conversions += 1;
        }
    }

    /// Logs a cell-level warning (e.g. truncation) under the same cap.
    pub fn record_cell_warning(&mut self, cause: impl Into<String>) {
        if self.conversion_records < MAX_CONVERSION_RECORDS {
            self.conversion_records += 1;
            self.record(ErrorRecord::new(RecordClass::Warning, Stage::Transform, cause, 1));
        }
    }

    pub fn has_fatal(&self) -> bool {
        self.failures().any(|r| r.class == RecordClass::Fatal)
    }

    /// Failures excluding warnings, including conversions past the record cap.
    pub fn error_count(&self) -> usize {
        let logged = self.failures().filter(|r| r.class != RecordClass::Warning).count();
        logged + self.unlogged_conversions
    }

    pub fn failures(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.log.iter().filter_map(|e| match e {
            SessionLogEntry::Failure(r) => Some(r),
            SessionLogEntry::Success { .. } => None,
        })
    }

    pub fn mark_cancelled(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.record(ErrorRecord::new(
                RecordClass::Fatal,
                Stage::Cancel,
                "export cancelled by user",
                1,
            ));
        }
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        self.finished_at = Some(Local::now());
    }

    pub fn is_success(&self) -> bool {
        !self.has_fatal() && !self.cancelled
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            success: self.is_success(),
            session_id: self.session_id.clone(),
            table: self.table.clone(),
            rows_read: self.rows_read,
            rows_written: self.rows_written,
            cells_failed: self.cells_failed,
            retries: self.retries,
            error_count: self.error_count(),
            elapsed_secs: self.elapsed.as_secs_f64(),
            artifact_path: self.artifact.as_ref().map(|a| a.path.clone()),
            artifact_kind: self.artifact.as_ref().map(|a| a.kind),
            cancelled: self.cancelled,
        }
    }

    /// The values written to the workbook metadata sheet or JSON sidecar.
    pub fn metadata(&self) -> ExportMetadata {
        ExportMetadata {
            table: self.table.clone(),
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(Local::now),
            rows_written: self.rows_written,
            error_count: self.error_count(),
            cells_failed: self.cells_failed,
            retries: self.retries,
        }
    }
}

/// The externally visible status of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub success: bool,
    pub session_id: String,
    pub table: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub cells_failed: u64,
    pub retries: u32,
    pub error_count: usize,
    pub elapsed_secs: f64,
    pub artifact_path: Option<PathBuf>,
    pub artifact_kind: Option<ArtifactKind>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportMetadata {
    pub table: String,
    pub session_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub rows_written: u64,
    pub error_count: usize,
    pub cells_failed: u64,
    pub retries: u32,
}

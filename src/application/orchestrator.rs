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

//! The core application logic that drives one export session.
//!
//! acquire (with retry) -> execute -> open writer -> fetch / transform / write
//! -> close writer -> release. The connection is released on every exit path.
//! A retryable failure while streaming releases the connection, acquires a
//! fresh one, re-executes the query and skips the rows already written.

use crate::application::query_streamer::QueryStreamer;
use crate::application::sheet_writer::SheetStreamWriter;
use crate::config::ExportConfig;
use crate::domain::cancellation::CancellationToken;
use crate::domain::entities::{DiagnosticKind, RowBatch};
use crate::domain::errors::{ExportError, SourceError, SourceErrorCategory};
use crate::domain::query::SourceQuery;
use crate::domain::retry_policy::{classify, RetryClass, RetryDecision, RetryPolicy};
use crate::domain::row_transformer::transform;
use crate::domain::session::{ErrorRecord, ExportSession, RecordClass, Stage};
use crate::ports::connection_port::{ConnectionHandle, ConnectionProvider, ReleaseOutcome};
use crate::ports::log_port::LogSink;
use crate::ports::workbook_port::WorkbookFactory;
use std::sync::Arc;
use std::time::Instant;

/// Why a session stopped early. The cause is already in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    Failed,
    Cancelled,
}

/// A failed streaming pass.
enum PassError {
    /// A source failure the retry policy gets to look at.
    Source(Stage, SourceError),
    Abort(Abort),
}

impl From<Abort> for PassError {
    fn from(a: Abort) -> Self {
        PassError::Abort(a)
    }
}

/// Wires pool, streamer, transformer and writer into one session.
pub struct ExportOrchestrator {
    pool: Arc<dyn ConnectionProvider>,
    workbooks: Arc<dyn WorkbookFactory>,
    log: Arc<dyn LogSink>,
    cancel: CancellationToken,
}

impl ExportOrchestrator {
    pub fn new(
        pool: Arc<dyn ConnectionProvider>,
        workbooks: Arc<dyn WorkbookFactory>,
        log: Arc<dyn LogSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            workbooks,
            log,
            cancel,
        }
    }

    /// Runs one export. Never returns an error: every outcome, including
    /// fatal ones, is described by the returned session.
    pub fn run_export(&self, config: &ExportConfig) -> ExportSession {
        let start_time = Instant::now();
        let mut session = ExportSession::new(&config.session_id, &config.table);
        self.log.info(&format!(
            "Session {}: exporting {} to {}",
            config.session_id,
            config.table,
            config.output_path.display()
        ));

        if let Err(Abort::Cancelled) = self.export(config, &mut session) {
            session.mark_cancelled();
        }

        session.finish(start_time.elapsed());
        let summary = session.summary();
        let message = format!(
            "Session {} {}: {} rows read, {} rows written, {} cells failed, {} retries, {} errors in {:.2}s",
            summary.session_id,
            if summary.success { "succeeded" } else { "failed" },
            summary.rows_read,
            summary.rows_written,
            summary.cells_failed,
            summary.retries,
            summary.error_count,
            summary.elapsed_secs
        );
        if summary.success {
            self.log.info(&message);
        } else {
            self.log.error(&message);
        }
        session
    }

    fn export(&self, config: &ExportConfig, session: &mut ExportSession) -> Result<(), Abort> {
        let query = match config.query() {
            Ok(q) => q,
            Err(e) => return Err(self.fail(session, Stage::Execute, e.to_string())),
        };
        if self.cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }

        let mut handle = self.acquire(config, session)?;
        self.log_server_info(&mut handle);
        let result = self.stream(config, session, &mut handle, &query);
        if !handle.is_released() {
            self.release(&mut handle, session);
        }
        result
    }

    /// Streams with resume-by-offset, then closes the writer whatever happened.
    fn stream(
        &self,
        config: &ExportConfig,
        session: &mut ExportSession,
        handle: &mut ConnectionHandle,
        query: &SourceQuery,
    ) -> Result<(), Abort> {
        let mut writer: Option<SheetStreamWriter> = None;
        let mut attempt = 1u32;

        let result = loop {
            let before = session.rows_read;
            let error = match self.stream_pass(config, session, handle, query, &mut writer) {
                Ok(()) => {
                    if attempt > 1 {
                        session.record_success(Stage::Fetch, attempt);
                    }
                    break Ok(());
                }
                Err(PassError::Abort(a)) => break Err(a),
                Err(PassError::Source(stage, error)) => (stage, error),
            };
            let (stage, error) = error;

            // Progress since the last failure starts a fresh attempt budget.
            if session.rows_read > before {
                attempt = 1;
            }

            match config.retry.decide(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    session.record(ErrorRecord::new(
                        RecordClass::Retryable,
                        stage,
                        error.to_string(),
                        attempt,
                    ));
                    self.log.warn(&format!(
                        "{} failed after {} rows (attempt {}/{}), retrying in {:?}: {}",
                        stage, session.rows_read, attempt, config.retry.max_attempts, delay, error
                    ));
                    if !self.cancel.sleep(delay) {
                        break Err(Abort::Cancelled);
                    }
                    session.retries += 1;
                    attempt += 1;

                    if error.is_connectivity() {
                        handle.mark_broken();
                    }
                    self.release(handle, session);
                    match self.acquire(config, session) {
                        Ok(fresh) => *handle = fresh,
                        Err(a) => break Err(a),
                    }
                }
                RetryDecision::GiveUp => {
                    break Err(self.give_up(session, stage, &error, attempt, &config.retry));
                }
            }
        };

        let closed = match writer.take() {
            Some(w) => self.close_writer(w, session),
            None => Ok(()),
        };
        result.and(closed)
    }

    /// One execute-and-drain pass on the current connection.
    fn stream_pass(
        &self,
        config: &ExportConfig,
        session: &mut ExportSession,
        handle: &mut ConnectionHandle,
        query: &SourceQuery,
        writer: &mut Option<SheetStreamWriter>,
    ) -> Result<(), PassError> {
        let connection = handle.connection().ok_or_else(|| {
            PassError::Source(
                Stage::Execute,
                SourceError::new(SourceErrorCategory::ConnectionLost, "connection handle was released"),
            )
        })?;

        let mut streamer = QueryStreamer::open(connection, query, config.fetch_size)
            .map_err(|e| PassError::Source(Stage::Execute, e))?;

        if writer.is_none() {
            let columns = streamer.columns();
            match SheetStreamWriter::open(
                self.workbooks.as_ref(),
                &config.output_path,
                &columns,
                config.sheet.clone(),
            ) {
                Ok(mut w) => {
                    if let Some(fault) = w.take_fault() {
                        self.note_fallback(session, &w, &fault.to_string());
                    }
                    *writer = Some(w);
                }
                Err(e) => return Err(self.fail(session, Stage::Fallback, e.to_string()).into()),
            }
        }

        let delivered = session.rows_read;
        if delivered > 0 {
            let skipped = streamer
                .skip_rows(delivered)
                .map_err(|e| source_or_abort(self, session, Stage::Fetch, e))?;
            self.log.info(&format!("Resumed stream after skipping {} rows", skipped));
            if skipped < delivered {
                session.record(ErrorRecord::new(
                    RecordClass::Warning,
                    Stage::Fetch,
                    format!(
                        "source returned {} rows on resume, {} had already been written",
                        skipped, delivered
                    ),
                    1,
                ));
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                streamer.close();
                return Err(Abort::Cancelled.into());
            }
            match streamer.next_batch() {
                Ok(Some(batch)) => {
                    if let Some(w) = writer.as_mut() {
                        self.write_batch(config, session, w, batch)?;
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => return Err(source_or_abort(self, session, Stage::Fetch, e)),
            }
        }
    }

    fn write_batch(
        &self,
        config: &ExportConfig,
        session: &mut ExportSession,
        writer: &mut SheetStreamWriter,
        batch: RowBatch,
    ) -> Result<(), Abort> {
        let first_row = session.rows_read + 1;
        session.rows_read += batch.len() as u64;

        let columns = batch.columns;
        let mut rows = Vec::with_capacity(batch.rows.len());
        for (offset, source_row) in batch.rows.into_iter().enumerate() {
            let row = transform(source_row, &columns);
            for d in &row.diagnostics {
                let cause = format!(
                    "row {}, column {}: {}",
                    first_row + offset as u64,
                    d.column,
                    d.reason
                );
                match d.kind {
                    DiagnosticKind::Unconvertible => session.record_conversion(cause),
                    DiagnosticKind::Truncated => session.record_cell_warning(cause),
                }
            }
            rows.push(row);
        }

        if let Err(e) = writer.write_batch(&rows) {
            return Err(self.fail(session, Stage::Fallback, e.to_string()));
        }
        if let Some(fault) = writer.take_fault() {
            self.note_fallback(session, writer, &fault.to_string());
        }
        session.rows_written = writer.rows_written();

        if (batch.sequence + 1) % config.progress_interval.max(1) == 0 {
            self.log.info(&format!(
                "Progress: {} rows read, {} rows written",
                session.rows_read, session.rows_written
            ));
        }
        Ok(())
    }

    fn close_writer(&self, writer: SheetStreamWriter, session: &mut ExportSession) -> Result<(), Abort> {
        session.rows_written = writer.rows_written();
        let fallback = writer.paths().fallback.clone();
        match writer.close(&session.metadata()) {
            Ok(outcome) => {
                if let Some(fault) = outcome.fault {
                    session.record(ErrorRecord::new(
                        RecordClass::Fallback,
                        Stage::Persist,
                        format!("workbook could not be saved, wrote {}: {}", fallback.display(), fault),
                        1,
                    ));
                    self.log.warn(&format!(
                        "Workbook could not be saved ({}); data written to {}",
                        fault,
                        fallback.display()
                    ));
                }
                for warning in outcome.warnings {
                    session.record(ErrorRecord::new(RecordClass::Warning, Stage::Persist, warning, 1));
                }
                session.rows_written = outcome.rows_written;
                self.log.info(&format!(
                    "Wrote {} rows to {}",
                    outcome.rows_written,
                    outcome.artifact.path.display()
                ));
                session.artifact = Some(outcome.artifact);
                Ok(())
            }
            Err(e) => Err(self.fail(session, Stage::Fallback, e.to_string())),
        }
    }

    fn acquire(&self, config: &ExportConfig, session: &mut ExportSession) -> Result<ConnectionHandle, Abort> {
        let timeout = config.pool.acquire_timeout;
        let outcome = config.retry.run(Stage::Acquire, &self.cancel, |attempt| {
            if attempt > 1 {
                self.log.info(&format!("Acquiring connection (attempt {})", attempt));
            }
            self.pool.acquire(timeout)
        });

        match outcome {
            Ok(acquired) => {
                session.retries += acquired.retries;
                session.absorb(acquired.history);
                let status = self.pool.status();
                if status.is_degraded() {
                    let message = format!(
                        "pool degraded: {} live connections, minimum is {}",
                        status.connections, status.min
                    );
                    self.log.warn(&message);
                    session.record(ErrorRecord::new(RecordClass::Warning, Stage::Pool, message, 1));
                }
                Ok(acquired.value)
            }
            Err(failure) => {
                session.retries += failure.retries;
                session.absorb(failure.history);
                if failure.cancelled {
                    return Err(Abort::Cancelled);
                }
                let attempts = failure.retries + 1;
                if failure.exhausted {
                    session.record(ErrorRecord::new(
                        RecordClass::Fatal,
                        Stage::Acquire,
                        format!("giving up after {} attempts: {}", attempts, failure.error),
                        attempts,
                    ));
                }
                self.log.error(&format!("Could not acquire a connection: {}", failure.error));
                Err(Abort::Failed)
            }
        }
    }

    /// Informational only; a failed lookup never stops the export.
    fn log_server_info(&self, handle: &mut ConnectionHandle) {
        let Some(connection) = handle.connection() else {
            return;
        };
        match connection.server_info() {
            Ok(info) => self.log.info(&format!("Connected to database: {}", info)),
            Err(e) => self.log.warn(&format!("Could not read server information: {}", e)),
        }
    }

    fn release(&self, handle: &mut ConnectionHandle, session: &mut ExportSession) {
        if self.pool.release(handle) == ReleaseOutcome::AlreadyReleased {
            let message = format!("connection handle {} was already released", handle.id);
            self.log.warn(&message);
            session.record(ErrorRecord::new(RecordClass::Warning, Stage::Release, message, 1));
        }
    }

    fn give_up(
        &self,
        session: &mut ExportSession,
        stage: Stage,
        error: &SourceError,
        attempt: u32,
        retry: &RetryPolicy,
    ) -> Abort {
        let cause = match classify(error) {
            RetryClass::Retryable => {
                session.record(ErrorRecord::new(
                    RecordClass::Retryable,
                    stage,
                    error.to_string(),
                    attempt,
                ));
                format!("giving up after {} of {} attempts: {}", attempt, retry.max_attempts, error)
            }
            RetryClass::Fatal => error.to_string(),
        };
        session.record(ErrorRecord::new(RecordClass::Fatal, stage, cause.clone(), attempt));
        self.log.error(&format!("{} failed: {}", stage, cause));
        Abort::Failed
    }

    fn fail(&self, session: &mut ExportSession, stage: Stage, cause: String) -> Abort {
        self.log.error(&format!("{} failed: {}", stage, cause));
        session.record(ErrorRecord::new(RecordClass::Fatal, stage, cause, 1));
        Abort::Failed
    }

    fn note_fallback(&self, session: &mut ExportSession, writer: &SheetStreamWriter, fault: &str) {
        let fallback = writer.paths().fallback.display().to_string();
        self.log.warn(&format!(
            "Workbook write failed ({}); continuing in {}",
            fault, fallback
        ));
        session.record(ErrorRecord::new(
            RecordClass::Fallback,
            Stage::Write,
            format!("workbook write failed, continuing in {}: {}", fallback, fault),
            1,
        ));
    }
}

/// Source failures go back to the retry loop; anything else ends the session.
fn source_or_abort(
    orchestrator: &ExportOrchestrator,
    session: &mut ExportSession,
    stage: Stage,
    error: ExportError,
) -> PassError {
    match error {
        ExportError::Source(e) => PassError::Source(stage, e),
        ExportError::Cancelled => PassError::Abort(Abort::Cancelled),
        other => PassError::Abort(orchestrator.fail(session, stage, other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sheet_writer::SheetWriterOptions;
    use crate::config::{DatabaseTarget, DbKind};
    use crate::domain::entities::{CellValue, ColumnDescriptor, SourceType, SourceValue};
    use crate::domain::secret::Secret;
    use crate::domain::session::{ArtifactKind, SessionLogEntry};
    use crate::infrastructure::pool::connection_pool::{ConnectionPool, PoolConfig};
    use crate::test_support::{
        MemoryConnector, MemorySink, RecordingWorkbookFactory, ScriptedProvider,
    };
    use log::{Level, LevelFilter};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::time::Duration;

    fn config(output: &Path) -> ExportConfig {
        ExportConfig {
            database: DatabaseTarget {
                kind: DbKind::Oracle,
                username: "scott".into(),
                password: Secret::new("tiger"),
                connect_string: "//localhost:1521/XE".into(),
                call_timeout: None,
            },
            pool: PoolConfig {
                min: 0,
                max: 2,
                increment: 1,
                acquire_timeout: Duration::from_secs(2),
                validation_attempts: 2,
            },
            table: "EMP".into(),
            filters: BTreeMap::new(),
            order_by: Some("ID".into()),
            fetch_size: 100,
            output_path: output.to_path_buf(),
            session_id: "test-session".into(),
            sheet: SheetWriterOptions::default(),
            max_rows_per_sheet: 1_000_000,
            retry: RetryPolicy::new()
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
            progress_interval: 1,
            log_level: LevelFilter::Info,
        }
    }

    struct Harness {
        connector: Arc<MemoryConnector>,
        provider: Arc<ScriptedProvider>,
        factory: RecordingWorkbookFactory,
        sink: MemorySink,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new(connector: MemoryConnector) -> Self {
            Self::with_provider(connector, |p| p)
        }

        fn with_provider(
            connector: MemoryConnector,
            wrap: impl FnOnce(ScriptedProvider) -> ScriptedProvider,
        ) -> Self {
            let connector = Arc::new(connector);
            let pool = Arc::new(ConnectionPool::new(
                connector.clone(),
                PoolConfig {
                    min: 0,
                    max: 2,
                    increment: 1,
                    acquire_timeout: Duration::from_secs(2),
                    validation_attempts: 2,
                },
            ));
            Self {
                connector,
                provider: Arc::new(wrap(ScriptedProvider::new(pool))),
                factory: RecordingWorkbookFactory::new(),
                sink: MemorySink::default(),
                cancel: CancellationToken::new(),
            }
        }

        fn with_factory(mut self, factory: RecordingWorkbookFactory) -> Self {
            self.factory = factory;
            self
        }

        fn run(&self, config: &ExportConfig) -> ExportSession {
            let orchestrator = ExportOrchestrator::new(
                self.provider.clone(),
                Arc::new(self.factory.clone()),
                Arc::new(self.sink.clone()),
                self.cancel.clone(),
            );
            orchestrator.run_export(config)
        }
    }

    fn connectivity_error() -> SourceError {
        SourceError::new(SourceErrorCategory::ListenerUnavailable, "ORA-12541: TNS:no listener")
            .with_code("ORA-12541")
    }

    fn recorded_ids(factory: &RecordingWorkbookFactory) -> Vec<i64> {
        factory.snapshot(|r| {
            r.rows
                .iter()
                .map(|cells| match cells[0] {
                    CellValue::Integer(i) => i,
                    ref other => panic!("unexpected cell {:?}", other),
                })
                .collect()
        })
    }

    #[test]
    fn test_empty_result_writes_header_only_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(MemoryConnector::with_rows(0));
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        let summary = session.summary();
        assert!(summary.success);
        assert_eq!(summary.rows_written, 0);
        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.artifact_kind, Some(ArtifactKind::Workbook));
        h.factory.snapshot(|r| {
            assert_eq!(r.header, vec!["ID", "NAME"]);
            assert!(r.rows.is_empty());
            let meta = r.metadata.as_ref().unwrap();
            assert_eq!(meta.rows_written, 0);
            assert_eq!(meta.error_count, 0);
        });
        assert_eq!(h.provider.releases(), 1);
        assert!(!dir.path().join("emp.csv.partial").exists());
    }

    #[test]
    fn test_unconvertible_cell_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::with_generator(
            3,
            vec![
                ColumnDescriptor::new("ID", SourceType::Integer, false, 0),
                ColumnDescriptor::new("PAYLOAD", SourceType::Binary, true, 1),
            ],
            Arc::new(|i: usize| {
                vec![
                    SourceValue::Integer(i as i64 + 1),
                    if i == 1 {
                        SourceValue::Binary(vec![0xff, 0xfe])
                    } else {
                        SourceValue::Binary(b"ok".to_vec())
                    },
                ]
            }),
        );
        let h = Harness::new(connector);
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.is_success());
        assert_eq!(session.rows_written, 3);
        assert_eq!(session.cells_failed, 1);
        h.factory.snapshot(|r| {
            assert_eq!(r.rows.len(), 3);
            assert_eq!(r.rows[1][1], CellValue::Unconvertible);
            assert_eq!(r.rows[0][1], CellValue::Text("ok".into()));
            assert_eq!(r.rows[2][1], CellValue::Text("ok".into()));
            assert_eq!(r.metadata.as_ref().unwrap().cells_failed, 1);
        });
        assert!(session
            .failures()
            .any(|r| r.class == RecordClass::Conversion && r.cause.starts_with("row 2, column PAYLOAD")));
    }

    #[test]
    fn test_transient_acquire_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::with_provider(MemoryConnector::with_rows(5), |p| {
            p.fail_acquires(vec![connectivity_error(), connectivity_error()])
        });
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.is_success());
        assert_eq!(session.retries, 2);
        assert_eq!(session.rows_written, 5);
        assert_eq!(h.provider.acquires(), 3);
        assert!(session.log.contains(&SessionLogEntry::Success {
            stage: Stage::Acquire,
            attempt: 3
        }));
    }

    #[test]
    fn test_exhausted_acquire_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::with_provider(MemoryConnector::with_rows(5), |p| {
            p.fail_acquires(vec![connectivity_error(), connectivity_error(), connectivity_error()])
        });
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(!session.is_success());
        assert_eq!(session.retries, 2);
        assert!(session.artifact.is_none());
        assert!(session
            .failures()
            .any(|r| r.class == RecordClass::Fatal && r.cause.contains("giving up after 3 attempts")));
        assert!(h.sink.contains(Level::Error, "Could not acquire a connection"));
    }

    #[test]
    fn test_authentication_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SourceError::new(
            SourceErrorCategory::Authentication,
            "ORA-01017: invalid username/password; logon denied",
        )
        .with_code("ORA-01017");
        let h = Harness::with_provider(MemoryConnector::with_rows(5), |p| p.fail_acquires(vec![auth]));
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(!session.is_success());
        assert_eq!(session.retries, 0);
        assert_eq!(h.provider.acquires(), 1);
    }

    #[test]
    fn test_write_fault_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("emp.xlsx");
        let h = Harness::new(MemoryConnector::with_rows(1000))
            .with_factory(RecordingWorkbookFactory::failing_after_rows(500));
        let session = h.run(&config(&output));

        let summary = session.summary();
        assert!(summary.success);
        assert_eq!(summary.rows_written, 1000);
        assert_eq!(summary.artifact_kind, Some(ArtifactKind::Fallback));
        let fallback = dir.path().join("emp.csv");
        assert_eq!(summary.artifact_path.as_deref(), Some(fallback.as_path()));
        assert!(session.failures().any(|r| r.class == RecordClass::Fallback));

        let mut reader = csv::Reader::from_path(&fallback).unwrap();
        let ids: Vec<i64> = reader
            .records()
            .map(|r| r.unwrap()[0].parse().unwrap())
            .collect();
        assert_eq!(ids, (0..1000).collect::<Vec<_>>());
        assert!(dir.path().join("emp.metadata.json").exists());
    }

    #[test]
    fn test_mid_stream_failure_resumes_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::with_rows(950);
        connector.fail_fetch_at(
            300,
            SourceError::new(SourceErrorCategory::ConnectionLost, "ORA-03113: end-of-file on communication channel")
                .with_code("ORA-03113"),
        );
        let h = Harness::new(connector);
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.is_success(), "{:?}", session.log);
        assert_eq!(session.retries, 1);
        assert_eq!(session.rows_read, 950);
        assert_eq!(recorded_ids(&h.factory), (0..950).collect::<Vec<_>>());
        assert_eq!(h.connector.executions(), 2);
        assert_eq!(h.provider.releases(), 2);
        assert_eq!(h.connector.server_info_requests(), 1);
        assert!(session
            .failures()
            .any(|r| r.class == RecordClass::Retryable && r.stage == Stage::Fetch));
    }

    #[test]
    fn test_missing_table_is_fatal_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::with_rows(10);
        connector.fail_next_execute(
            SourceError::new(SourceErrorCategory::MissingObject, "ORA-00942: table or view does not exist")
                .with_code("ORA-00942"),
        );
        let h = Harness::new(connector);
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(!session.is_success());
        assert_eq!(session.retries, 0);
        assert!(session.artifact.is_none());
        assert_eq!(h.provider.releases(), 1);
        assert!(session
            .failures()
            .any(|r| r.class == RecordClass::Fatal && r.stage == Stage::Execute));
    }

    #[test]
    fn test_cancel_before_start_skips_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(MemoryConnector::with_rows(10));
        h.cancel.cancel();
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.cancelled);
        assert!(!session.summary().success);
        assert_eq!(h.provider.acquires(), 0);
    }

    #[test]
    fn test_cancel_between_batches() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let connector = MemoryConnector::with_generator(
            1000,
            vec![ColumnDescriptor::new("ID", SourceType::Integer, false, 0)],
            Arc::new(move |i: usize| {
                if i == 250 {
                    trigger.cancel();
                }
                vec![SourceValue::Integer(i as i64)]
            }),
        );
        let mut h = Harness::new(connector);
        h.cancel = cancel;
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.cancelled);
        assert_eq!(session.rows_written, 300);
        assert_eq!(h.provider.releases(), 1);
        assert_eq!(h.connector.closed_cursors(), 1);
        h.factory.snapshot(|r| assert!(r.finished));
    }

    #[test]
    fn test_degraded_pool_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::with_provider(MemoryConnector::with_rows(1), |p| p.degraded());
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.is_success());
        assert!(session
            .failures()
            .any(|r| r.class == RecordClass::Warning && r.stage == Stage::Pool));
        assert!(h.sink.contains(Level::Warn, "pool degraded"));
    }

    #[test]
    fn test_server_info_logged_after_connect() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(MemoryConnector::with_rows(3));
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.is_success());
        assert_eq!(h.connector.server_info_requests(), 1);
        assert!(h.sink.contains(
            Level::Info,
            "Connected to database: version=Memory Database 1.0, database=MEMDB, user=TESTER"
        ));
    }

    #[test]
    fn test_server_info_failure_does_not_stop_export() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::with_rows(3);
        connector.fail_server_info_with(
            SourceError::new(
                SourceErrorCategory::Authorization,
                "ORA-01031: insufficient privileges",
            )
            .with_code("ORA-01031"),
        );
        let h = Harness::new(connector);
        let session = h.run(&config(&dir.path().join("emp.xlsx")));

        assert!(session.is_success(), "{:?}", session.log);
        assert_eq!(session.rows_written, 3);
        assert_eq!(session.error_count(), 0);
        assert!(h.sink.contains(Level::Warn, "Could not read server information"));
    }
}

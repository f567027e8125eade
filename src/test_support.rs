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

//! In-memory implementations of the ports, shared by unit tests.

use crate::domain::entities::{
    CellValue, ColumnDescriptor, ServerInfo, SourceRow, SourceType, SourceValue,
};
use crate::domain::errors::{SourceError, SourceErrorCategory, WriteFault};
use crate::domain::query::SourceQuery;
use crate::domain::session::ExportMetadata;
use crate::ports::connection_port::{
    ConnectionHandle, ConnectionProvider, PoolStatus, ReleaseOutcome,
};
use crate::ports::log_port::LogSink;
use crate::ports::source_port::{Connector, SourceConnection, SourceCursor};
use crate::ports::workbook_port::{SheetLayout, WorkbookFactory, WorkbookSink};
use log::Level;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type RowGenerator = Arc<dyn Fn(usize) -> SourceRow + Send + Sync>;

#[derive(Default)]
struct ConnectorState {
    live: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    executions: AtomicUsize,
    closed_cursors: AtomicUsize,
    failing_pings: AtomicUsize,
    server_info_requests: AtomicUsize,
    server_info_error: Mutex<Option<SourceError>>,
    connect_error: Mutex<Option<SourceError>>,
    execute_errors: Mutex<VecDeque<SourceError>>,
    /// (row position at which the fetch fails, error), consumed once each.
    fetch_faults: Mutex<VecDeque<(usize, SourceError)>>,
}

/// A fake database holding one generated table.
pub struct MemoryConnector {
    rows: usize,
    columns: Vec<ColumnDescriptor>,
    generator: RowGenerator,
    state: Arc<ConnectorState>,
}

impl MemoryConnector {
    /// `ID` (integer) and `NAME` (text) columns; row `i` is `(i, "row i")`.
    pub fn with_rows(rows: usize) -> Self {
        Self::with_generator(
            rows,
            vec![
                ColumnDescriptor::new("ID", SourceType::Integer, false, 0),
                ColumnDescriptor::new("NAME", SourceType::Text, true, 1),
            ],
            Arc::new(|i: usize| {
                vec![
                    SourceValue::Integer(i as i64),
                    SourceValue::Text(format!("row {}", i)),
                ]
            }),
        )
    }

    pub fn with_generator(
        rows: usize,
        columns: Vec<ColumnDescriptor>,
        generator: RowGenerator,
    ) -> Self {
        Self {
            rows,
            columns,
            generator,
            state: Arc::new(ConnectorState::default()),
        }
    }

    pub fn fail_connects_with(&self, error: SourceError) {
        *self.state.connect_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_pings(&self, n: usize) {
        self.state.failing_pings.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_execute(&self, error: SourceError) {
        self.state.execute_errors.lock().unwrap().push_back(error);
    }

    pub fn fail_server_info_with(&self, error: SourceError) {
        *self.state.server_info_error.lock().unwrap() = Some(error);
    }

    /// The first fetch that starts at or after `row` fails once with `error`.
    pub fn fail_fetch_at(&self, row: usize, error: SourceError) {
        self.state.fetch_faults.lock().unwrap().push_back((row, error));
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn server_info_requests(&self) -> usize {
        self.state.server_info_requests.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.state.executions.load(Ordering::SeqCst)
    }

    pub fn closed_cursors(&self) -> usize {
        self.state.closed_cursors.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Box<dyn SourceConnection>, SourceError> {
        if let Some(e) = self.state.connect_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            rows: self.rows,
            columns: self.columns.clone(),
            generator: self.generator.clone(),
            state: self.state.clone(),
        }))
    }
}

pub struct MemoryConnection {
    rows: usize,
    columns: Vec<ColumnDescriptor>,
    generator: RowGenerator,
    state: Arc<ConnectorState>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SourceConnection for MemoryConnection {
    fn ping(&mut self) -> Result<(), SourceError> {
        let failing = self.state.failing_pings.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_pings.store(failing - 1, Ordering::SeqCst);
            return Err(SourceError::new(
                SourceErrorCategory::ConnectionLost,
                "ORA-03113: end-of-file on communication channel",
            )
            .with_code("ORA-03113"));
        }
        Ok(())
    }

    fn server_info(&mut self) -> Result<ServerInfo, SourceError> {
        self.state.server_info_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.state.server_info_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(ServerInfo {
            version: "Memory Database 1.0".into(),
            database: "MEMDB".into(),
            user: "TESTER".into(),
        })
    }

    fn execute<'a>(
        &'a mut self,
        _query: &SourceQuery,
    ) -> Result<Box<dyn SourceCursor + 'a>, SourceError> {
        if let Some(e) = self.state.execute_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.state.executions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            connection: self,
            position: 0,
            closed: false,
        }))
    }
}

pub struct MemoryCursor<'a> {
    connection: &'a MemoryConnection,
    position: usize,
    closed: bool,
}

impl SourceCursor for MemoryCursor<'_> {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.connection.columns
    }

    fn fetch(&mut self, max_rows: usize) -> Result<Vec<SourceRow>, SourceError> {
        if self.closed {
            return Ok(Vec::new());
        }
        {
            let mut faults = self.connection.state.fetch_faults.lock().unwrap();
            if let Some((at, _)) = faults.front() {
                if self.position >= *at {
                    if let Some((_, e)) = faults.pop_front() {
                        return Err(e);
                    }
                }
            }
        }
        let end = (self.position + max_rows).min(self.connection.rows);
        let rows = (self.position..end)
            .map(|i| (self.connection.generator)(i))
            .collect();
        self.position = end;
        Ok(rows)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.connection
                .state
                .closed_cursors
                .fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Wraps a real provider and fails the first acquires with queued errors.
pub struct ScriptedProvider {
    inner: Arc<dyn ConnectionProvider>,
    acquire_errors: Mutex<VecDeque<SourceError>>,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    degraded: bool,
}

impl ScriptedProvider {
    pub fn new(inner: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            inner,
            acquire_errors: Mutex::new(VecDeque::new()),
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            degraded: false,
        }
    }

    pub fn fail_acquires(self, errors: Vec<SourceError>) -> Self {
        self.acquire_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl ConnectionProvider for ScriptedProvider {
    fn acquire(&self, timeout: Duration) -> Result<ConnectionHandle, SourceError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.acquire_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.inner.acquire(timeout)
    }

    fn release(&self, handle: &mut ConnectionHandle) -> ReleaseOutcome {
        let outcome = self.inner.release(handle);
        if outcome == ReleaseOutcome::Released {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        outcome
    }

    fn status(&self) -> PoolStatus {
        let mut status = self.inner.status();
        if self.degraded {
            status.connections = 0;
            status.min = status.min.max(1);
        }
        status
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub header: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub layouts: Vec<SheetLayout>,
    pub metadata: Option<ExportMetadata>,
    pub finished: bool,
    pub discarded: bool,
    pub path: Option<PathBuf>,
}

/// Captures everything a workbook would receive. Can be told to fault.
#[derive(Clone, Default)]
pub struct RecordingWorkbookFactory {
    pub recorded: Arc<Mutex<Recorded>>,
    fail_after_rows: Option<usize>,
    fail_on_create: bool,
    fail_on_finish: bool,
}

impl RecordingWorkbookFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after_rows(rows: usize) -> Self {
        Self {
            fail_after_rows: Some(rows),
            ..Self::default()
        }
    }

    pub fn failing_on_create() -> Self {
        Self {
            fail_on_create: true,
            ..Self::default()
        }
    }

    pub fn failing_on_finish() -> Self {
        Self {
            fail_on_finish: true,
            ..Self::default()
        }
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        f(&self.recorded.lock().unwrap())
    }
}

impl WorkbookFactory for RecordingWorkbookFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn WorkbookSink>, WriteFault> {
        if self.fail_on_create {
            return Err(WriteFault::new("cannot create workbook"));
        }
        self.recorded.lock().unwrap().path = Some(path.to_path_buf());
        Ok(Box::new(RecordingWorkbook {
            factory: self.clone(),
        }))
    }
}

pub struct RecordingWorkbook {
    factory: RecordingWorkbookFactory,
}

impl WorkbookSink for RecordingWorkbook {
    fn start_sheet(&mut self, columns: &[ColumnDescriptor]) -> Result<(), WriteFault> {
        self.factory.recorded.lock().unwrap().header =
            columns.iter().map(|c| c.name.clone()).collect();
        Ok(())
    }

    fn append_row(&mut self, row: &crate::domain::entities::TransformedRow) -> Result<(), WriteFault> {
        let mut recorded = self.factory.recorded.lock().unwrap();
        if let Some(limit) = self.factory.fail_after_rows {
            if recorded.rows.len() >= limit {
                return Err(WriteFault::new("disk full"));
            }
        }
        recorded.rows.push(row.cells.clone());
        Ok(())
    }

    fn apply_layout(&mut self, layout: &SheetLayout) -> Result<(), WriteFault> {
        self.factory.recorded.lock().unwrap().layouts.push(layout.clone());
        Ok(())
    }

    fn finish(&mut self, metadata: &ExportMetadata) -> Result<(), WriteFault> {
        if self.factory.fail_on_finish {
            return Err(WriteFault::new("persist failed"));
        }
        let mut recorded = self.factory.recorded.lock().unwrap();
        recorded.metadata = Some(metadata.clone());
        recorded.finished = true;
        Ok(())
    }

    fn discard(&mut self) {
        self.factory.recorded.lock().unwrap().discarded = true;
    }
}

/// Collects log lines in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

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

//! Incremental spreadsheet writer with a delimited-file fallback.
//!
//! Every row goes to the workbook backend and to a `<stem>.csv.partial`
//! journal. If the backend faults, the journal is promoted to `<stem>.csv`
//! and takes over; on success it is deleted. Only a failure of the journal
//! itself is returned as an error.

use crate::domain::entities::{CellValue, ColumnDescriptor, TransformedRow};
use crate::domain::errors::{ExportError, Result, WriteFault};
use crate::domain::session::{ArtifactInfo, ArtifactKind, ExportMetadata};
use crate::infrastructure::local_storage::delimited_spool::{
    write_metadata_sidecar, DelimitedSpool,
};
use crate::ports::workbook_port::{SheetLayout, WorkbookFactory, WorkbookSink};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

const WIDTH_PADDING: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct SheetWriterOptions {
    pub max_column_width: usize,
    pub width_sample_size: usize,
    /// Written in place of NULL cells.
    pub null_text: String,
    pub delimiter: u8,
}

impl Default for SheetWriterOptions {
    fn default() -> Self {
        Self {
            max_column_width: 50,
            width_sample_size: 1000,
            null_text: String::new(),
            delimiter: b',',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Created,
    HeaderWritten,
    Streaming,
    Finalized,
    FallbackActive,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub artifact: ArtifactInfo,
    pub rows_written: u64,
    /// A workbook fault not yet handed out by [`SheetStreamWriter::take_fault`].
    pub fault: Option<WriteFault>,
    /// Cleanup problems that did not affect the artifact.
    pub warnings: Vec<String>,
}

/// Sibling paths derived from the configured output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub workbook: PathBuf,
    pub spool: PathBuf,
    pub fallback: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn for_output(output: &Path) -> Self {
        Self {
            workbook: output.to_path_buf(),
            spool: output.with_extension("csv.partial"),
            fallback: output.with_extension("csv"),
            metadata: output.with_extension("metadata.json"),
        }
    }
}

pub struct SheetStreamWriter {
    paths: ArtifactPaths,
    options: SheetWriterOptions,
    primary: Option<Box<dyn WorkbookSink>>,
    spool: Option<DelimitedSpool>,
    state: WriterState,
    widths: Vec<usize>,
    sampled: usize,
    layout_applied: bool,
    rows_written: u64,
    pending_fault: Option<WriteFault>,
}

impl SheetStreamWriter {
    /// Opens the journal, then the workbook, and writes the header row.
    ///
    /// A workbook that cannot be opened switches straight to the fallback.
    pub fn open(
        factory: &dyn WorkbookFactory,
        output: &Path,
        columns: &[ColumnDescriptor],
        options: SheetWriterOptions,
    ) -> Result<Self> {
        let paths = ArtifactPaths::for_output(output);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let headers: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let spool = DelimitedSpool::create(&paths.spool, options.delimiter, &headers)?;

        let mut writer = Self {
            widths: headers.iter().map(|h| h.chars().count()).collect(),
            paths,
            options,
            primary: None,
            spool: Some(spool),
            state: WriterState::Created,
            sampled: 0,
            layout_applied: false,
            rows_written: 0,
            pending_fault: None,
        };

        match factory.create(&writer.paths.workbook) {
            Ok(mut sink) => match sink.start_sheet(columns) {
                Ok(()) => {
                    writer.primary = Some(sink);
                    writer.state = WriterState::HeaderWritten;
                }
                Err(fault) => {
                    writer.primary = Some(sink);
                    writer.activate_fallback(fault)?;
                }
            },
            Err(fault) => writer.activate_fallback(fault)?,
        }
        Ok(writer)
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// The fault that triggered the fallback, handed out once.
    pub fn take_fault(&mut self) -> Option<WriteFault> {
        self.pending_fault.take()
    }

    pub fn write_batch(&mut self, rows: &[TransformedRow]) -> Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: &TransformedRow) -> Result<()> {
        let spool = self
            .spool
            .as_mut()
            .ok_or_else(|| ExportError::FallbackError("writer is already closed".into()))?;
        spool.append(row, &self.options.null_text)?;

        if let Some(primary) = self.primary.as_mut() {
            let result = if self.options.null_text.is_empty() {
                primary.append_row(row)
            } else {
                primary.append_row(&with_null_text(row, &self.options.null_text))
            };
            if let Err(fault) = result {
                self.activate_fallback(fault)?;
            }
        }

        if self.state != WriterState::FallbackActive {
            self.state = WriterState::Streaming;
        }
        self.rows_written += 1;

        if !self.layout_applied {
            self.sample(row);
            if self.sampled >= self.options.width_sample_size {
                self.finalize_layout()?;
            }
        }
        Ok(())
    }

    fn sample(&mut self, row: &TransformedRow) {
        for (i, cell) in row.cells.iter().enumerate() {
            let len = match cell {
                CellValue::Empty => self.options.null_text.chars().count(),
                other => other.render().chars().count(),
            };
            match self.widths.get_mut(i) {
                Some(w) => *w = (*w).max(len),
                None => self.widths.push(len),
            }
        }
        self.sampled += 1;
    }

    /// Column widths from the sampled rows, padded and capped.
    pub fn computed_layout(&self) -> SheetLayout {
        SheetLayout {
            column_widths: self
                .widths
                .iter()
                .map(|w| (w + WIDTH_PADDING).min(self.options.max_column_width) as f64)
                .collect(),
        }
    }

    /// Applies widths and print setup. Runs once, at the sample threshold or at close.
    pub fn finalize_layout(&mut self) -> Result<()> {
        if self.layout_applied {
            return Ok(());
        }
        self.layout_applied = true;
        let layout = self.computed_layout();
        if let Some(primary) = self.primary.as_mut() {
            if let Err(fault) = primary.apply_layout(&layout) {
                self.activate_fallback(fault)?;
            }
        }
        Ok(())
    }

    /// Discards the workbook and routes everything to the delimited file.
    fn activate_fallback(&mut self, fault: WriteFault) -> Result<()> {
        if let Some(mut primary) = self.primary.take() {
            primary.discard();
        }
        if self.paths.workbook.exists() {
            fs::remove_file(&self.paths.workbook)?;
        }
        let spool = self
            .spool
            .as_mut()
            .ok_or_else(|| ExportError::FallbackError("writer is already closed".into()))?;
        spool.promote(&self.paths.fallback)?;

        if self.pending_fault.is_none() {
            self.pending_fault = Some(fault);
        }
        self.state = WriterState::FallbackActive;
        Ok(())
    }

    /// Persists the workbook, or finishes the fallback file and its
    /// metadata sidecar if the workbook faulted at any point.
    pub fn close(mut self, metadata: &ExportMetadata) -> Result<WriteOutcome> {
        let mut warnings = Vec::new();
        self.finalize_layout()?;

        if let Some(mut primary) = self.primary.take() {
            match primary.finish(metadata) {
                Ok(()) => {
                    if let Some(spool) = self.spool.take() {
                        if let Err(e) = spool.discard() {
                            warnings.push(format!("could not remove journal: {}", e));
                        }
                    }
                    self.state = WriterState::Finalized;
                    return Ok(WriteOutcome {
                        artifact: ArtifactInfo {
                            kind: ArtifactKind::Workbook,
                            path: self.paths.workbook.clone(),
                        },
                        rows_written: self.rows_written,
                        fault: self.pending_fault.take(),
                        warnings,
                    });
                }
                Err(fault) => {
                    self.primary = Some(primary);
                    self.activate_fallback(fault)?;
                }
            }
        }

        let spool = self
            .spool
            .take()
            .ok_or_else(|| ExportError::FallbackError("writer is already closed".into()))?;
        let path = spool.finish()?;
        write_metadata_sidecar(&self.paths.metadata, metadata)?;
        self.state = WriterState::Finalized;
        Ok(WriteOutcome {
            artifact: ArtifactInfo {
                kind: ArtifactKind::Fallback,
                path,
            },
            rows_written: self.rows_written,
            fault: self.pending_fault.take(),
            warnings,
        })
    }
}

fn with_null_text<'a>(row: &'a TransformedRow, null_text: &str) -> Cow<'a, TransformedRow> {
    if !row.cells.iter().any(|c| matches!(c, CellValue::Empty)) {
        return Cow::Borrowed(row);
    }
    let mut owned = row.clone();
    for cell in owned.cells.iter_mut() {
        if matches!(cell, CellValue::Empty) {
            *cell = CellValue::Text(null_text.to_string());
        }
    }
    Cow::Owned(owned)
}

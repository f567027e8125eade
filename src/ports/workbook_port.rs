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

//! Port for a spreadsheet backend that accepts rows incrementally.

use crate::domain::entities::{ColumnDescriptor, TransformedRow};
use crate::domain::errors::WriteFault;
use crate::domain::session::ExportMetadata;
use std::path::Path;

/// Column widths and print setup computed from the sampled rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    /// One width per column, in characters.
    pub column_widths: Vec<f64>,
}

/// An open workbook being written row by row.
///
/// Any `Err` is unrecoverable for this workbook; the caller switches to its
/// fallback and only calls [`WorkbookSink::discard`] afterwards.
pub trait WorkbookSink {
    /// Writes the styled header row of the first data sheet.
    fn start_sheet(&mut self, columns: &[ColumnDescriptor]) -> Result<(), WriteFault>;

    fn append_row(&mut self, row: &TransformedRow) -> Result<(), WriteFault>;

    fn apply_layout(&mut self, layout: &SheetLayout) -> Result<(), WriteFault>;

    /// Adds the metadata sheet and persists the workbook.
    fn finish(&mut self, metadata: &ExportMetadata) -> Result<(), WriteFault>;

    /// Drops buffered state without persisting.
    fn discard(&mut self);
}

pub trait WorkbookFactory: Send + Sync {
    fn create(&self, path: &Path) -> Result<Box<dyn WorkbookSink>, WriteFault>;
}

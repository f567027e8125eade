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

//! Workbook backend on rust_xlsxwriter.
//!
//! Data sheets run in constant-memory mode: each row is flushed to a temp
//! file as soon as the next one starts, so memory stays flat regardless of
//! table size.

use crate::domain::entities::{CellValue, ColumnDescriptor, TransformedRow};
use crate::domain::errors::WriteFault;
use crate::domain::session::ExportMetadata;
use crate::ports::workbook_port::{SheetLayout, WorkbookFactory, WorkbookSink};
use log::debug;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};

/// Excel's hard limit is 1 048 576 rows including the header.
pub const EXCEL_MAX_DATA_ROWS: u32 = 1_048_575;

const DATA_SHEET: &str = "Data";
const METADATA_SHEET: &str = "Metadata";

impl From<XlsxError> for WriteFault {
    fn from(e: XlsxError) -> Self {
        WriteFault::new(format!("xlsx: {}", e))
    }
}

pub struct XlsxWorkbookFactory {
    max_rows_per_sheet: u32,
}

impl XlsxWorkbookFactory {
    pub fn new(max_rows_per_sheet: u32) -> Self {
        Self {
            max_rows_per_sheet: max_rows_per_sheet.clamp(1, EXCEL_MAX_DATA_ROWS),
        }
    }
}

impl WorkbookFactory for XlsxWorkbookFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn WorkbookSink>, WriteFault> {
        Ok(Box::new(XlsxWorkbook::new(path, self.max_rows_per_sheet)))
    }
}

struct SheetFormats {
    header: Format,
    date: Format,
    datetime: Format,
    unconvertible: Format,
}

impl SheetFormats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0xD9E1F2))
                .set_border(FormatBorder::Thin),
            date: Format::new().set_num_format("yyyy-mm-dd"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
            unconvertible: Format::new().set_font_color(Color::Red),
        }
    }
}

pub struct XlsxWorkbook {
    workbook: Workbook,
    path: PathBuf,
    headers: Vec<String>,
    /// Data rows written to each data sheet, by worksheet index.
    sheet_rows: Vec<u32>,
    sheet_names: Vec<String>,
    max_rows_per_sheet: u32,
    layout: Option<SheetLayout>,
    formats: SheetFormats,
}

impl XlsxWorkbook {
    pub fn new(path: &Path, max_rows_per_sheet: u32) -> Self {
        Self {
            workbook: Workbook::new(),
            path: path.to_path_buf(),
            headers: Vec::new(),
            sheet_rows: Vec::new(),
            sheet_names: Vec::new(),
            max_rows_per_sheet,
            layout: None,
            formats: SheetFormats::new(),
        }
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    fn add_data_sheet(&mut self) -> Result<(), XlsxError> {
        let name = match self.sheet_names.len() {
            0 => DATA_SHEET.to_string(),
            n => format!("{} ({})", DATA_SHEET, n + 1),
        };
        debug!("Adding worksheet '{}'", name);

        let worksheet = self.workbook.add_worksheet_with_constant_memory();
        worksheet.set_name(&name)?;
        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &self.formats.header)?;
        }
        worksheet.set_freeze_panes(1, 0)?;
        if let Some(layout) = &self.layout {
            apply_sheet_layout(worksheet, layout)?;
        }

        self.sheet_names.push(name);
        self.sheet_rows.push(0);
        Ok(())
    }

    fn write_cell(
        worksheet: &mut Worksheet,
        formats: &SheetFormats,
        row: u32,
        col: u16,
        cell: &CellValue,
    ) -> Result<(), XlsxError> {
        match cell {
            CellValue::Empty => {}
            CellValue::Text(s) => {
                worksheet.write_string(row, col, s)?;
            }
            CellValue::Integer(i) => {
                worksheet.write_number(row, col, *i as f64)?;
            }
            CellValue::Float(f) => {
                worksheet.write_number(row, col, *f)?;
            }
            CellValue::Boolean(b) => {
                worksheet.write_boolean(row, col, *b)?;
            }
            CellValue::Date(d) => {
                worksheet.write_datetime_with_format(row, col, d, &formats.date)?;
            }
            CellValue::DateTime(dt) => {
                worksheet.write_datetime_with_format(row, col, dt, &formats.datetime)?;
            }
            CellValue::Unconvertible => {
                worksheet.write_string_with_format(
                    row,
                    col,
                    cell.render().as_ref(),
                    &formats.unconvertible,
                )?;
            }
        }
        Ok(())
    }

    fn write_metadata_sheet(&mut self, metadata: &ExportMetadata) -> Result<(), XlsxError> {
        let bold = Format::new().set_bold();
        let entries: Vec<(&str, String)> = vec![
            ("Table", metadata.table.clone()),
            ("Session ID", metadata.session_id.clone()),
            ("Export Start", metadata.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("Export End", metadata.finished_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("Rows Written", metadata.rows_written.to_string()),
            ("Error Count", metadata.error_count.to_string()),
            ("Cells Failed", metadata.cells_failed.to_string()),
            ("Retries", metadata.retries.to_string()),
            ("Data Sheets", self.sheet_names.join(", ")),
        ];

        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(METADATA_SHEET)?;
        worksheet.write_string_with_format(0, 0, "Property", &bold)?;
        worksheet.write_string_with_format(0, 1, "Value", &bold)?;
        for (i, (key, value)) in entries.iter().enumerate() {
            let row = i as u32 + 1;
            worksheet.write_string(row, 0, *key)?;
            worksheet.write_string(row, 1, value)?;
        }
        worksheet.set_column_width(0, 16)?;
        worksheet.set_column_width(1, 40)?;
        Ok(())
    }
}

fn apply_sheet_layout(worksheet: &mut Worksheet, layout: &SheetLayout) -> Result<(), XlsxError> {
    for (col, width) in layout.column_widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }
    worksheet.set_print_gridlines(true);
    worksheet.set_landscape();
    worksheet.set_print_fit_to_pages(1, 0);
    worksheet.set_repeat_rows(0, 0)?;
    Ok(())
}

impl WorkbookSink for XlsxWorkbook {
    fn start_sheet(&mut self, columns: &[ColumnDescriptor]) -> Result<(), WriteFault> {
        self.headers = columns.iter().map(|c| c.name.clone()).collect();
        self.add_data_sheet()?;
        Ok(())
    }

    fn append_row(&mut self, row: &TransformedRow) -> Result<(), WriteFault> {
        if self.sheet_rows.last().copied().unwrap_or(0) >= self.max_rows_per_sheet {
            self.add_data_sheet()?;
        }

        let formats = &self.formats;
        let index = self.sheet_rows.len().saturating_sub(1);
        let excel_row = self.sheet_rows[index] + 1;
        let worksheet = self.workbook.worksheet_from_index(index)?;
        for (col, cell) in row.cells.iter().enumerate() {
            Self::write_cell(worksheet, formats, excel_row, col as u16, cell)?;
        }
        self.sheet_rows[index] += 1;
        Ok(())
    }

    fn apply_layout(&mut self, layout: &SheetLayout) -> Result<(), WriteFault> {
        for index in 0..self.sheet_rows.len() {
            let worksheet = self.workbook.worksheet_from_index(index)?;
            apply_sheet_layout(worksheet, layout)?;
        }
        self.layout = Some(layout.clone());
        Ok(())
    }

    fn finish(&mut self, metadata: &ExportMetadata) -> Result<(), WriteFault> {
        if !self.headers.is_empty() {
            let last_col = (self.headers.len() - 1) as u16;
            for index in 0..self.sheet_rows.len() {
                let rows = self.sheet_rows[index];
                let worksheet = self.workbook.worksheet_from_index(index)?;
                worksheet.autofilter(0, 0, rows, last_col)?;
            }
        }
        self.write_metadata_sheet(metadata)?;
        self.workbook.save(&self.path)?;
        debug!("Saved workbook {}", self.path.display());
        Ok(())
    }

    fn discard(&mut self) {
        // Constant-memory temp files are removed when the workbook is dropped.
        self.workbook = Workbook::new();
        self.sheet_rows.clear();
    }
}

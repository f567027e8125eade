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

//! Delimited journal of every written row, used as the fallback artifact.

use crate::domain::entities::{CellValue, TransformedRow};
use crate::domain::errors::{ExportError, Result};
use crate::domain::session::ExportMetadata;
use csv::{QuoteStyle, Writer, WriterBuilder};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// A csv writer over a file that can be renamed while rows keep flowing.
pub struct DelimitedSpool {
    path: PathBuf,
    delimiter: u8,
    writer: Option<Writer<File>>,
    rows: u64,
}

impl DelimitedSpool {
    /// Creates (or truncates) `path` and writes the header record.
    pub fn create(path: &Path, delimiter: u8, headers: &[String]) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = Self::builder(delimiter).from_writer(file);
        writer.write_record(headers)?;
        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
            writer: Some(writer),
            rows: 0,
        })
    }

    fn builder(delimiter: u8) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder.delimiter(delimiter).quote_style(QuoteStyle::Necessary);
        builder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn append(&mut self, row: &TransformedRow, null_text: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            ExportError::FallbackError(format!("{} is already closed", self.path.display()))
        })?;
        let record: Vec<_> = row
            .cells
            .iter()
            .map(|c| match c {
                CellValue::Empty => null_text.into(),
                other => other.render(),
            })
            .collect();
        writer.write_record(record.iter().map(|c| c.as_bytes()))?;
        self.rows += 1;
        Ok(())
    }

    /// Moves the spool to `target` and keeps appending there.
    pub fn promote(&mut self, target: &Path) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        fs::rename(&self.path, target)?;
        let file = OpenOptions::new().append(true).open(target)?;
        self.writer = Some(Self::builder(self.delimiter).from_writer(file));
        self.path = target.to_path_buf();
        Ok(())
    }

    /// Flushes and closes the file, returning its final path.
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(self.path)
    }

    /// Closes and deletes the file.
    pub fn discard(mut self) -> Result<()> {
        self.writer.take();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Writes the run metadata as pretty JSON next to the fallback file.
pub fn write_metadata_sidecar(path: &Path, metadata: &ExportMetadata) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, metadata)
        .map_err(|e| ExportError::FallbackError(e.to_string()))?;
    Ok(())
}

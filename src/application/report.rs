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

//! JSON run report: the session summary plus the full session log.

use crate::domain::errors::Result;
use crate::domain::session::ExportSession;
use log::info;
use std::fs::{self, File};
use std::io;
use std::path::Path;

pub fn write_report(path: &Path, session: &ExportSession) -> Result<()> {
    let summary = session.summary();
    let rows_per_sec = if summary.elapsed_secs > 0.0 {
        summary.rows_written as f64 / summary.elapsed_secs
    } else {
        0.0
    };

    let report = serde_json::json!({
        "summary": summary,
        "rows_per_sec": (rows_per_sec * 100.0).round() / 100.0,
        "started_at": session.started_at.to_rfc3339(),
        "finished_at": session.finished_at.map(|t| t.to_rfc3339()),
        "timezone": session.started_at.offset().to_string(),
        "log": session.log,
    });

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, &report).map_err(io::Error::from)?;

    info!("Saved run report to {}", path.display());
    Ok(())
}

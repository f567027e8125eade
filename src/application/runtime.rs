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

//! # Runtime Context
//!
//! Sets up the resources that live for the whole process: the Oracle
//! connector, the `r2d2` connection pool, the workbook backend and the
//! secret-masking log sink. The orchestrator only ever sees them as ports.

use crate::application::orchestrator::ExportOrchestrator;
use crate::config::{DbKind, ExportConfig};
use crate::domain::cancellation::CancellationToken;
use crate::domain::errors::{ExportError, Result};
use crate::infrastructure::logging::log_sinks::{LogFacadeSink, MaskingSink};
use crate::infrastructure::oracle::oracle_source_adapter::OracleConnector;
use crate::infrastructure::pool::connection_pool::ConnectionPool;
use crate::infrastructure::xlsx::xlsx_workbook_adapter::XlsxWorkbookFactory;
use crate::ports::connection_port::ConnectionProvider;
use crate::ports::log_port::LogSink;
use log::info;
use std::sync::Arc;

/// `RuntimeContext` holds shared resources that exist for the entire life of the app.
pub struct RuntimeContext {
    pub pool: Arc<ConnectionPool>,
    pub workbooks: Arc<XlsxWorkbookFactory>,
    pub log: Arc<dyn LogSink>,
}

impl RuntimeContext {
    /// Builds the connection pool. Connections are opened lazily, so an
    /// unreachable database surfaces on the first acquire, under retry.
    pub fn init(config: &ExportConfig) -> Result<Self> {
        let db = &config.database;
        let fetch_size = u32::try_from(config.fetch_size).map_err(|_| {
            ExportError::ConfigError(format!("fetch_size {} is too large", config.fetch_size))
        })?;

        let connector = match db.kind {
            DbKind::Oracle => OracleConnector::new(
                &db.username,
                db.password.clone(),
                &db.connect_string,
                db.call_timeout,
                fetch_size,
            ),
        };

        info!(
            "Initializing connection pool for {}@{} (min {}, max {}, acquire timeout {:?})",
            db.username,
            db.connect_string,
            config.pool.min,
            config.pool.max,
            config.pool.acquire_timeout
        );
        let pool = Arc::new(ConnectionPool::new(Arc::new(connector), config.pool.clone()));

        let log: Arc<dyn LogSink> =
            Arc::new(MaskingSink::new(LogFacadeSink).with_secret(db.password.clone()));

        Ok(Self {
            pool,
            workbooks: Arc::new(XlsxWorkbookFactory::new(config.max_rows_per_sheet)),
            log,
        })
    }

    pub fn orchestrator(&self, cancel: CancellationToken) -> ExportOrchestrator {
        let pool: Arc<dyn ConnectionProvider> = self.pool.clone();
        ExportOrchestrator::new(pool, self.workbooks.clone(), self.log.clone(), cancel)
    }
}

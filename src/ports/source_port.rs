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

//! Port for executing a query against the source database and reading rows.

use crate::domain::entities::{ColumnDescriptor, ServerInfo, SourceRow};
use crate::domain::errors::SourceError;
use crate::domain::query::SourceQuery;

/// Opens new physical connections. Used by the pool, never by the pipeline directly.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SourceConnection>, SourceError>;
}

/// A live database session.
pub trait SourceConnection: Send {
    /// Cheap liveness round-trip.
    fn ping(&mut self) -> Result<(), SourceError>;

    /// Server version banner, database name and session user.
    fn server_info(&mut self) -> Result<ServerInfo, SourceError>;

    /// Executes `query` and returns an open cursor borrowing this connection.
    fn execute<'a>(
        &'a mut self,
        query: &SourceQuery,
    ) -> Result<Box<dyn SourceCursor + 'a>, SourceError>;
}

/// An open result set.
pub trait SourceCursor {
    /// Column metadata, available right after execution.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Returns up to `max_rows` rows. An empty vector means the cursor is drained.
    fn fetch(&mut self, max_rows: usize) -> Result<Vec<SourceRow>, SourceError>;

    /// Releases server-side resources. Safe to call more than once.
    fn close(&mut self);
}

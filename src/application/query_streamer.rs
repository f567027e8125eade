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

//! Lazy, batch-wise iteration over a query result.

use crate::domain::entities::{ColumnDescriptor, RowBatch};
use crate::domain::errors::{ExportError, Result, SourceError};
use crate::domain::query::SourceQuery;
use crate::ports::source_port::{SourceConnection, SourceCursor};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    /// End-of-stream was reported; any further advance is an error.
    Exhausted,
    Failed,
    Closed,
}

/// A finite, non-restartable sequence of [`RowBatch`] over one cursor.
pub struct QueryStreamer<'c> {
    cursor: Box<dyn SourceCursor + 'c>,
    columns: Arc<[ColumnDescriptor]>,
    batch_size: usize,
    state: StreamState,
    /// A drained cursor seen while filling the previous batch.
    drained: bool,
    next_sequence: u64,
    rows_read: u64,
}

impl<'c> QueryStreamer<'c> {
    /// Executes `query` on `connection` and captures the column metadata.
    pub fn open(
        connection: &'c mut dyn SourceConnection,
        query: &SourceQuery,
        batch_size: usize,
    ) -> std::result::Result<Self, SourceError> {
        let cursor = connection.execute(query)?;
        let columns: Arc<[ColumnDescriptor]> = cursor.columns().to_vec().into();
        Ok(Self {
            cursor,
            columns,
            batch_size: batch_size.max(1),
            state: StreamState::Open,
            drained: false,
            next_sequence: 0,
            rows_read: 0,
        })
    }

    pub fn columns(&self) -> Arc<[ColumnDescriptor]> {
        self.columns.clone()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn has_next(&self) -> bool {
        self.state == StreamState::Open
    }

    /// Returns the next batch, `Ok(None)` exactly once at end-of-stream, then
    /// [`ExportError::ExhaustedStream`].
    ///
    /// A failing fetch closes the cursor and is returned as-is.
    pub fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        match self.state {
            StreamState::Open => {}
            StreamState::Exhausted | StreamState::Failed | StreamState::Closed => {
                return Err(ExportError::ExhaustedStream)
            }
        }

        let mut rows = Vec::with_capacity(self.batch_size);
        while !self.drained && rows.len() < self.batch_size {
            match self.cursor.fetch(self.batch_size - rows.len()) {
                Ok(fetched) if fetched.is_empty() => self.drained = true,
                Ok(fetched) => rows.extend(fetched),
                Err(e) => {
                    self.state = StreamState::Failed;
                    self.cursor.close();
                    return Err(e.into());
                }
            }
        }

        if rows.is_empty() {
            self.state = StreamState::Exhausted;
            self.cursor.close();
            return Ok(None);
        }

        self.rows_read += rows.len() as u64;
        let batch = RowBatch {
            sequence: self.next_sequence,
            columns: self.columns.clone(),
            rows,
        };
        self.next_sequence += 1;
        Ok(Some(batch))
    }

    /// Reads and drops the first `n` rows. Used to resume after a reconnect.
    pub fn skip_rows(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0u64;
        while skipped < n {
            if self.state != StreamState::Open || self.drained {
                break;
            }
            let want = (n - skipped).min(self.batch_size as u64) as usize;
            match self.cursor.fetch(want) {
                Ok(fetched) if fetched.is_empty() => self.drained = true,
                Ok(fetched) => skipped += fetched.len() as u64,
                Err(e) => {
                    self.state = StreamState::Failed;
                    self.cursor.close();
                    return Err(e.into());
                }
            }
        }
        Ok(skipped)
    }

    pub fn close(&mut self) {
        if self.state != StreamState::Closed {
            self.cursor.close();
            if self.state == StreamState::Open {
                self.state = StreamState::Closed;
            }
        }
    }
}

impl Drop for QueryStreamer<'_> {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SourceErrorCategory;
    use crate::ports::source_port::Connector;
    use crate::test_support::MemoryConnector;
    use std::collections::BTreeMap;

    fn query() -> SourceQuery {
        SourceQuery::for_table("EMP", &BTreeMap::new(), None).unwrap()
    }

    fn ids(batch: &RowBatch) -> Vec<i64> {
        batch
            .rows
            .iter()
            .map(|r| match r[0] {
                crate::domain::entities::SourceValue::Integer(i) => i,
                _ => panic!("unexpected value"),
            })
            .collect()
    }

    #[test]
    fn test_batches_preserve_order_and_count() {
        for total in [0usize, 1, 7, 100] {
            for batch_size in [1usize, 3, 7, 50, 1000] {
                let connector = MemoryConnector::with_rows(total);
                let mut conn = connector.connect().unwrap();
                let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), batch_size).unwrap();

                let mut seen = Vec::new();
                let mut sequences = Vec::new();
                while let Some(batch) = streamer.next_batch().unwrap() {
                    assert!(batch.len() <= batch_size);
                    sequences.push(batch.sequence);
                    seen.extend(ids(&batch));
                }
                assert_eq!(seen, (0..total as i64).collect::<Vec<_>>());
                assert_eq!(sequences, (0..sequences.len() as u64).collect::<Vec<_>>());
                assert_eq!(streamer.rows_read(), total as u64);
            }
        }
    }

    #[test]
    fn test_only_final_batch_is_short() {
        let connector = MemoryConnector::with_rows(10);
        let mut conn = connector.connect().unwrap();
        let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), 4).unwrap();
        let sizes: Vec<usize> = std::iter::from_fn(|| streamer.next_batch().unwrap())
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_end_reported_once_then_exhausted() {
        let connector = MemoryConnector::with_rows(2);
        let mut conn = connector.connect().unwrap();
        let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), 5).unwrap();
        assert!(streamer.has_next());
        assert_eq!(streamer.next_batch().unwrap().unwrap().len(), 2);
        assert!(streamer.next_batch().unwrap().is_none());
        assert!(!streamer.has_next());
        assert!(matches!(streamer.next_batch(), Err(ExportError::ExhaustedStream)));
        drop(streamer);
        assert!(connector.closed_cursors() >= 1);
    }

    #[test]
    fn test_columns_shared_by_batches() {
        let connector = MemoryConnector::with_rows(4);
        let mut conn = connector.connect().unwrap();
        let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), 2).unwrap();
        let a = streamer.next_batch().unwrap().unwrap();
        let b = streamer.next_batch().unwrap().unwrap();
        assert!(Arc::ptr_eq(&a.columns, &b.columns));
        assert_eq!(a.columns[0].name, "ID");
    }

    #[test]
    fn test_fetch_failure_closes_cursor() {
        let connector = MemoryConnector::with_rows(10);
        connector.fail_fetch_at(
            4,
            SourceError::new(SourceErrorCategory::ConnectionLost, "ORA-03113").with_code("ORA-03113"),
        );
        let mut conn = connector.connect().unwrap();
        let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), 4).unwrap();
        assert!(streamer.next_batch().unwrap().is_some());
        let err = streamer.next_batch().unwrap_err();
        assert!(matches!(err, ExportError::Source(ref e) if e.category == SourceErrorCategory::ConnectionLost));
        assert_eq!(streamer.state(), StreamState::Failed);
        assert_eq!(connector.closed_cursors(), 1);
    }

    #[test]
    fn test_skip_rows_resumes_at_offset() {
        let connector = MemoryConnector::with_rows(10);
        let mut conn = connector.connect().unwrap();
        let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), 3).unwrap();
        assert_eq!(streamer.skip_rows(7).unwrap(), 7);
        let batch = streamer.next_batch().unwrap().unwrap();
        assert_eq!(ids(&batch), vec![7, 8, 9]);
        assert!(streamer.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_skip_past_end_stops_early() {
        let connector = MemoryConnector::with_rows(3);
        let mut conn = connector.connect().unwrap();
        let mut streamer = QueryStreamer::open(conn.as_mut(), &query(), 2).unwrap();
        assert_eq!(streamer.skip_rows(10).unwrap(), 3);
        assert!(streamer.next_batch().unwrap().is_none());
    }
}

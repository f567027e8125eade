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

//! Bounded connection pool backed by r2d2.
//!
//! r2d2 keeps `min` connections warm (`min_idle`) and opens more on demand up
//! to `max`. Every hand-out is preceded by a ping; dead connections are
//! flagged broken so r2d2 drops them instead of recycling them.

use crate::domain::errors::{SourceError, SourceErrorCategory};
use crate::infrastructure::pool::connection_manager::SourceConnectionManager;
use crate::ports::connection_port::{
    ConnectionHandle, ConnectionProvider, LeasedConnection, PoolStatus, ReleaseOutcome,
};
use crate::ports::source_port::{Connector, SourceConnection};
use log::{debug, warn};
use r2d2::{Pool, PooledConnection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub min: u32,
    pub max: u32,
    /// Growth step. r2d2 opens one connection at a time, so this is only validated.
    pub increment: u32,
    pub acquire_timeout: Duration,
    pub validation_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: 5,
            increment: 1,
            acquire_timeout: Duration::from_secs(30),
            validation_attempts: 3,
        }
    }
}

pub struct ConnectionPool {
    pool: Pool<SourceConnectionManager>,
    manager: SourceConnectionManager,
    config: PoolConfig,
    next_id: AtomicU64,
}

impl ConnectionPool {
    /// Builds the pool without waiting for the warm connections, so a
    /// failing database surfaces on the first `acquire` instead of here.
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        let manager = SourceConnectionManager::new(connector);
        let pool = Pool::builder()
            .max_size(config.max.max(1))
            .min_idle(Some(config.min.min(config.max)))
            .connection_timeout(config.acquire_timeout)
            .test_on_check_out(false)
            .build_unchecked(manager.clone());
        Self {
            pool,
            manager,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    fn timeout_error(&self, timeout: Duration) -> SourceError {
        match self.manager.last_error() {
            Some(e) => e,
            None => SourceError::new(
                SourceErrorCategory::PoolExhausted,
                format!(
                    "no connection available within {:?} (max {} connections)",
                    timeout, self.config.max
                ),
            ),
        }
    }
}

impl LeasedConnection for PooledConnection<SourceConnectionManager> {
    fn connection(&mut self) -> &mut dyn SourceConnection {
        self.inner.as_mut()
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl ConnectionProvider for ConnectionPool {
    fn acquire(&self, timeout: Duration) -> Result<ConnectionHandle, SourceError> {
        let deadline = Instant::now() + timeout;
        let attempts = self.config.validation_attempts.max(1);
        let mut last_ping_error = None;

        for attempt in 1..=attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let mut conn = match self.pool.get_timeout(remaining) {
                Ok(conn) => conn,
                Err(e) => {
                    debug!("Pool checkout failed: {}", e);
                    return Err(last_ping_error.unwrap_or_else(|| self.timeout_error(timeout)));
                }
            };

            match conn.inner.ping() {
                Ok(()) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    return Ok(ConnectionHandle::new(id, Box::new(conn)));
                }
                Err(e) => {
                    warn!(
                        "Discarding dead connection (validation {}/{}): {}",
                        attempt, attempts, e
                    );
                    conn.broken = true;
                    drop(conn);
                    last_ping_error = Some(e);
                }
            }
        }

        Err(last_ping_error.unwrap_or_else(|| self.timeout_error(timeout)))
    }

    fn release(&self, handle: &mut ConnectionHandle) -> ReleaseOutcome {
        match handle.take_lease() {
            Some(lease) => {
                drop(lease);
                ReleaseOutcome::Released
            }
            None => ReleaseOutcome::AlreadyReleased,
        }
    }

    fn status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            connections: state.connections,
            idle: state.idle_connections,
            min: self.config.min,
            max: self.config.max,
        }
    }
}

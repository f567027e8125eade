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

//! Port for borrowing connections from a bounded pool.

use crate::domain::errors::SourceError;
use crate::ports::source_port::SourceConnection;
use serde::Serialize;
use std::time::Duration;

/// A pool-owned connection. Dropping the lease returns it to the pool.
pub trait LeasedConnection: Send {
    fn connection(&mut self) -> &mut dyn SourceConnection;

    /// Tells the pool to discard this connection instead of reusing it.
    fn mark_broken(&mut self);
}

/// Exclusive handle to one pooled connection.
///
/// [`ConnectionProvider::release`] empties the handle; a handle dropped
/// without an explicit release still returns its connection via `Drop`.
pub struct ConnectionHandle {
    pub id: u64,
    lease: Option<Box<dyn LeasedConnection>>,
}

impl ConnectionHandle {
    pub fn new(id: u64, lease: Box<dyn LeasedConnection>) -> Self {
        Self {
            id,
            lease: Some(lease),
        }
    }

    /// `None` once the handle has been released.
    pub fn connection(&mut self) -> Option<&mut dyn SourceConnection> {
        self.lease.as_mut().map(|l| l.connection())
    }

    pub fn mark_broken(&mut self) {
        if let Some(lease) = self.lease.as_mut() {
            lease.mark_broken();
        }
    }

    pub fn take_lease(&mut self) -> Option<Box<dyn LeasedConnection>> {
        self.lease.take()
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The handle had already been released; nothing was returned to the pool.
    AlreadyReleased,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Live connections, idle and in use.
    pub connections: u32,
    pub idle: u32,
    pub min: u32,
    pub max: u32,
}

impl PoolStatus {
    pub fn in_use(&self) -> u32 {
        self.connections.saturating_sub(self.idle)
    }

    /// Fewer live connections than the configured minimum.
    pub fn is_degraded(&self) -> bool {
        self.connections < self.min
    }
}

pub trait ConnectionProvider: Send + Sync {
    /// Blocks up to `timeout` for a validated connection.
    fn acquire(&self, timeout: Duration) -> Result<ConnectionHandle, SourceError>;

    fn release(&self, handle: &mut ConnectionHandle) -> ReleaseOutcome;

    fn status(&self) -> PoolStatus;
}

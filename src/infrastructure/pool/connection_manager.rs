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

use crate::domain::errors::SourceError;
use crate::ports::source_port::{Connector, SourceConnection};
use r2d2::ManageConnection;
use std::sync::{Arc, Mutex};

/// A pooled connection plus the flag r2d2 consults on return.
pub struct ManagedConnection {
    pub inner: Box<dyn SourceConnection>,
    pub broken: bool,
}

/// R2D2 connection manager over any [`Connector`].
///
/// Remembers the most recent connect failure so a pool timeout can report
/// the underlying cause (bad password, no listener) rather than a bare timeout.
#[derive(Clone)]
pub struct SourceConnectionManager {
    connector: Arc<dyn Connector>,
    last_error: Arc<Mutex<Option<SourceError>>>,
}

impl SourceConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn last_error(&self) -> Option<SourceError> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    pub fn set_last_error(&self, error: Option<SourceError>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = error;
        }
    }
}

impl ManageConnection for SourceConnectionManager {
    type Connection = ManagedConnection;
    type Error = SourceError;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        match self.connector.connect() {
            Ok(inner) => {
                self.set_last_error(None);
                Ok(ManagedConnection {
                    inner,
                    broken: false,
                })
            }
            Err(e) => {
                self.set_last_error(Some(e.clone()));
                Err(e)
            }
        }
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.inner.ping()
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken
    }
}

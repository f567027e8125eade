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

//! `LogSink` adapters for the process.

use crate::domain::secret::Secret;
use crate::ports::log_port::LogSink;
use log::Level;

pub const SESSION_TARGET: &str = "sheet_export::session";

/// Forwards to the `log` facade, so `env_logger` decides what is printed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacadeSink;

impl LogSink for LogFacadeSink {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: SESSION_TARGET, level, "{}", message);
    }
}

/// Replaces every registered secret with its masked form before forwarding.
pub struct MaskingSink<S> {
    inner: S,
    secrets: Vec<Secret>,
}

impl<S: LogSink> MaskingSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            secrets: Vec::new(),
        }
    }

    /// Empty values are ignored; longer secrets are replaced first.
    pub fn with_secret(mut self, secret: Secret) -> Self {
        if !secret.is_empty() {
            self.secrets.push(secret);
            self.secrets
                .sort_by_key(|s| std::cmp::Reverse(s.expose().len()));
        }
        self
    }

    pub fn mask(&self, message: &str) -> String {
        self.secrets
            .iter()
            .fold(message.to_string(), |acc, s| acc.replace(s.expose(), s.masked()))
    }
}

impl<S: LogSink> LogSink for MaskingSink<S> {
    fn log(&self, level: Level, message: &str) {
        self.inner.log(level, &self.mask(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySink;

    #[test]
    fn test_masks_registered_secrets() {
        let memory = MemorySink::default();
        let sink = MaskingSink::new(memory.clone())
            .with_secret(Secret::new("s3cr3t-passw0rd"))
            .with_secret(Secret::new(""));
        sink.error("login failed for scott/s3cr3t-passw0rd@db");

        let lines = memory.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Level::Error);
        assert_eq!(lines[0].1, "login failed for scott/s3c...0rd@db");
    }

    #[test]
    fn test_unmasked_text_passes_through() {
        let memory = MemorySink::default();
        let sink = MaskingSink::new(memory.clone()).with_secret(Secret::new("tiger"));
        sink.info("exported 10 rows");
        assert_eq!(memory.lines()[0].1, "exported 10 rows");
    }
}

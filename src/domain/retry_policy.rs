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

//! Error classification and exponential backoff for source operations.
//!
//! The policy wraps connection acquisition, query execution and fetches.
//! Workbook writes are never retried; they switch the writer to its fallback.

use crate::domain::cancellation::CancellationToken;
use crate::domain::errors::{SourceError, SourceErrorCategory};
use crate::domain::session::{ErrorRecord, RecordClass, SessionLogEntry, Stage};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Fatal,
}

/// Classifies a source failure by its category.
pub fn classify(error: &SourceError) -> RetryClass {
    match error.category {
        SourceErrorCategory::ConnectionLost
        | SourceErrorCategory::ListenerUnavailable
        | SourceErrorCategory::ResourceBusy
        | SourceErrorCategory::Timeout
        | SourceErrorCategory::PoolExhausted => RetryClass::Retryable,
        SourceErrorCategory::Authentication
        | SourceErrorCategory::Authorization
        | SourceErrorCategory::MissingObject
        | SourceErrorCategory::MalformedQuery
        | SourceErrorCategory::DataError
        | SourceErrorCategory::Unknown => RetryClass::Fatal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Bounded exponential backoff with full jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// `min(base * 2^attempt, cap)` plus jitter in `[0, delay)`, clamped to `cap`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(20);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let nanos = delay.as_nanos().min(u64::MAX as u128) as u64;
        let extra = Duration::from_nanos(rand::rng().random_range(0..nanos));
        (delay + extra).min(self.max_delay)
    }

    /// What to do after `attempt` (1-based) failed with `error`.
    pub fn decide(&self, error: &SourceError, attempt: u32) -> RetryDecision {
        match classify(error) {
            RetryClass::Retryable if attempt < self.max_attempts => {
                RetryDecision::RetryAfter(self.next_delay(attempt - 1))
            }
            _ => RetryDecision::GiveUp,
        }
    }

    /// Runs `operation` until it succeeds, fails fatally, runs out of attempts
    /// or the token is cancelled during a backoff sleep.
    ///
    /// The closure receives the 1-based attempt number. Every attempt is
    /// recorded in the returned history.
    pub fn run<T, F>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> std::result::Result<Retried<T>, RetryFailure>
    where
        F: FnMut(u32) -> std::result::Result<T, SourceError>,
    {
        let mut history = Vec::new();
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => {
                    history.push(SessionLogEntry::Success { stage, attempt });
                    return Ok(Retried {
                        value,
                        history,
                        retries: attempt - 1,
                    });
                }
                Err(error) => match self.decide(&error, attempt) {
                    RetryDecision::RetryAfter(delay) => {
                        history.push(SessionLogEntry::Failure(ErrorRecord::new(
                            RecordClass::Retryable,
                            stage,
                            error.to_string(),
                            attempt,
                        )));
                        if !cancel.sleep(delay) {
                            return Err(RetryFailure {
                                error,
                                history,
                                retries: attempt - 1,
                                exhausted: false,
                                cancelled: true,
                            });
                        }
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        let retryable = classify(&error) == RetryClass::Retryable;
                        let class = if retryable {
                            RecordClass::Retryable
                        } else {
                            RecordClass::Fatal
                        };
                        history.push(SessionLogEntry::Failure(ErrorRecord::new(
                            class,
                            stage,
                            error.to_string(),
                            attempt,
                        )));
                        return Err(RetryFailure {
                            error,
                            history,
                            retries: attempt - 1,
                            exhausted: retryable,
                            cancelled: false,
                        });
                    }
                },
            }
        }
    }
}

/// A successful value plus the attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub history: Vec<SessionLogEntry>,
    pub retries: u32,
}

/// The final, unmodified error plus the attempt history.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: SourceError,
    pub history: Vec<SessionLogEntry>,
    pub retries: u32,
    /// The error was retryable but attempts ran out.
    pub exhausted: bool,
    pub cancelled: bool,
}

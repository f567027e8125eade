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

//! # Sheet Export
//!
//! Streams one database table or view into a formatted Excel workbook,
//! batch by batch, with bounded memory. Transient connectivity failures are
//! retried with backoff, bad cells are isolated, and a workbook that cannot
//! be written falls back to a delimited file without losing rows.
//!
//! This crate follows the **Hexagonal Architecture** (Ports and Adapters):
//! `domain` and `application` only talk to the database, the workbook backend
//! and the log through the traits in `ports`.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_support;

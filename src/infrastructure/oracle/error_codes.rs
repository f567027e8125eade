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

//! Maps Oracle `ORA-`/`DPI-` codes to driver-independent error categories.

use crate::domain::errors::{SourceError, SourceErrorCategory};
use SourceErrorCategory::*;

/// Every code the exporter knows about. Each code appears exactly once.
pub const KNOWN_CODES: &[(&str, SourceErrorCategory)] = &[
    // Session lost
    ("ORA-03113", ConnectionLost),
    ("ORA-03114", ConnectionLost),
    ("ORA-03135", ConnectionLost),
    ("ORA-12537", ConnectionLost),
    ("ORA-12547", ConnectionLost),
    ("ORA-12570", ConnectionLost),
    ("ORA-12571", ConnectionLost),
    ("ORA-01012", ConnectionLost),
    ("DPI-1080", ConnectionLost),
    ("DPI-1010", ConnectionLost),
    // Listener / instance not reachable
    ("ORA-12541", ListenerUnavailable),
    ("ORA-12514", ListenerUnavailable),
    ("ORA-12543", ListenerUnavailable),
    ("ORA-01033", ListenerUnavailable),
    ("ORA-01034", ListenerUnavailable),
    ("ORA-01089", ListenerUnavailable),
    ("ORA-12516", ListenerUnavailable),
    ("ORA-12519", ListenerUnavailable),
    ("ORA-12520", ListenerUnavailable),
    ("ORA-12528", ListenerUnavailable),
    ("ORA-25408", ListenerUnavailable),
    // Contention
    ("ORA-00054", ResourceBusy),
    ("ORA-00051", ResourceBusy),
    ("ORA-00060", ResourceBusy),
    ("ORA-04021", ResourceBusy),
    ("ORA-30006", ResourceBusy),
    // Timeouts
    ("ORA-12170", Timeout),
    ("DPI-1067", Timeout),
    ("ORA-03136", Timeout),
    // Credentials
    ("ORA-01017", Authentication),
    ("ORA-01005", Authentication),
    ("ORA-28000", Authentication),
    ("ORA-28001", Authentication),
    ("ORA-01045", Authorization),
    ("ORA-01031", Authorization),
    // Schema
    ("ORA-00942", MissingObject),
    ("ORA-00904", MissingObject),
    ("ORA-12154", MissingObject),
    ("ORA-12505", MissingObject),
    // SQL text
    ("ORA-00936", MalformedQuery),
    ("ORA-00933", MalformedQuery),
    ("ORA-00900", MalformedQuery),
    ("ORA-00923", MalformedQuery),
    // Values
    ("ORA-01722", DataError),
    ("ORA-01438", DataError),
    ("ORA-01843", DataError),
];

/// Finds the first `ORA-NNNNN` or `DPI-NNNN` code in a driver message.
pub fn extract_code(message: &str) -> Option<String> {
    ["ORA-", "DPI-"]
        .iter()
        .filter_map(|prefix| {
            message.match_indices(prefix).find_map(|(pos, _)| {
                let digits: String = message[pos + prefix.len()..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if digits.len() >= 4 {
                    Some((pos, format!("{}{}", prefix, digits)))
                } else {
                    None
                }
            })
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, code)| code)
}

pub fn category_for_code(code: &str) -> SourceErrorCategory {
    KNOWN_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, category)| *category)
        .unwrap_or(Unknown)
}

/// Classifies a driver message, falling back to `Unknown` for unrecognised codes.
pub fn source_error_from_message(message: &str) -> SourceError {
    match extract_code(message) {
        Some(code) => SourceError::new(category_for_code(&code), message).with_code(code),
        None => SourceError::new(Unknown, message),
    }
}

pub fn source_error(err: &oracle::Error) -> SourceError {
    source_error_from_message(&err.to_string())
}

// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Normalizes timing, status and response header data from the provider

use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use crate::provider::LogArgProvider;

/// Reads response-side data from the provider, normalized into primitive
/// types. The [`AccessEvent`](crate::AccessEvent) memoizes everything read
/// through this adapter.
#[derive(Debug, Clone, Copy)]
pub struct ServerAdapter<'a> {
    provider: &'a dyn LogArgProvider,
}

impl<'a> ServerAdapter<'a> {
    pub(crate) fn new(provider: &'a dyn LogArgProvider) -> Self {
        Self { provider }
    }

    /// Request arrival time in milliseconds since the Unix epoch, `0` if the
    /// provider doesn't know it.
    pub fn request_timestamp(&self) -> i64 {
        self.provider
            .access_timestamp()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }

    /// Number of response body bytes sent.
    pub fn content_length(&self) -> i64 {
        self.provider.content_length()
    }

    /// Numeric response status code, `-1` if missing or not a number.
    pub fn status_code(&self) -> i32 {
        self.provider
            .status()
            .and_then(|status| status.parse().ok())
            .unwrap_or(-1)
    }

    /// Response headers as a map, names lowercased, entries without a name or
    /// value skipped, last occurrence of a name winning.
    pub fn build_response_header_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(headers) = self.provider.response_headers() {
            for (name, value) in headers {
                let Some(name) = name.filter(|name| !name.is_empty()) else {
                    continue;
                };
                let Some(value) = value else {
                    continue;
                };
                map.insert(name.to_ascii_lowercase(), value.to_owned());
            }
        }
        map
    }
}

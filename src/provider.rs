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

//! The per-request handle supplied by the host server

use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

/// Iterator over raw header name/value pairs as the server hands them out.
///
/// Entries with a missing or empty name, or a missing value, are skipped
/// during event construction.
pub type HeaderIter<'a> = Box<dyn Iterator<Item = (Option<&'a str>, Option<&'a str>)> + 'a>;

/// Iterator over cookie names and their values in server iteration order.
pub type CookieIter<'a> = Box<dyn Iterator<Item = (Option<&'a str>, Vec<&'a str>)> + 'a>;

/// Remote peer address of the connection a request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    /// An IP socket address. No reverse lookup is performed, the host string
    /// of an inet peer is its numeric IP.
    Inet(SocketAddr),
    /// Anything else (e.g. a Unix domain socket), in display form.
    Other(String),
}

/// Connection data for one request, as far as the server knows it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionInfo {
    /// Remote peer address, if known.
    pub remote: Option<PeerAddr>,
    /// Local (server-side) port the connection was accepted on.
    pub local_port: Option<u16>,
}

/// Capability exposed by the host server for one completed request/response
/// cycle.
///
/// Implementations wrap whatever per-request handle the server engine keeps
/// around. The handle is only valid for the duration of the call into
/// [`AccessLog::log()`](crate::AccessLog::log) — an [`AccessEvent`](crate::AccessEvent)
/// borrows the provider and won't outlive that call.
///
/// Accessors mirror the raw server data: everything the engine might not know
/// is `Option`, header and cookie sequences come as iterators, the response
/// status is the raw status string. Normalization happens in the event, not
/// here.
pub trait LogArgProvider: Debug + Sync {
    /// HTTP method of the request.
    fn method(&self) -> Option<&str>;

    /// Raw request target, including the query string if any.
    fn uri(&self) -> Option<&str>;

    /// Protocol version string, e.g. `HTTP/1.1`.
    fn protocol(&self) -> Option<&str>;

    /// Authenticated user, if the server performed authentication.
    fn user(&self) -> Option<&str>;

    /// Request header sequence, `None` if headers are unavailable.
    fn request_headers(&self) -> Option<HeaderIter<'_>>;

    /// Response header sequence, `None` if the response was never written.
    fn response_headers(&self) -> Option<HeaderIter<'_>>;

    /// Request cookies grouped by name, `None` if unavailable.
    fn cookies(&self) -> Option<CookieIter<'_>>;

    /// Connection data, `None` if the connection is gone already.
    fn connection_info(&self) -> Option<ConnectionInfo>;

    /// Raw response status string, e.g. `200`.
    fn status(&self) -> Option<&str>;

    /// Number of response body bytes sent.
    fn content_length(&self) -> i64;

    /// Time between receiving the request and completing the response.
    fn duration(&self) -> Duration;

    /// Wall-clock time at which the request was received.
    fn access_timestamp(&self) -> Option<SystemTime>;
}

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

//! The immutable, lazily populated record of one completed request

use once_cell::sync::{Lazy, OnceCell};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use crate::adapter::ServerAdapter;
use crate::context::AccessContext;
use crate::provider::{LogArgProvider, PeerAddr};

pub(crate) const NA: &str = "-";

static NA_PARAM: Lazy<Vec<String>> = Lazy::new(|| vec![NA.to_owned()]);

/// Strict URL decoding: `+` means space, any malformed percent escape or
/// non-UTF-8 result keeps the raw string instead of failing.
fn decode_catching(raw: &str) -> String {
    let bytes = raw.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        if *byte == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
        {
            return raw.to_owned();
        }
    }

    let unplussed = raw.replace('+', " ");
    match percent_decode_str(&unplussed).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_owned(),
    }
}

fn header_map(headers: Option<crate::provider::HeaderIter<'_>>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(headers) = headers {
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

/// Record of one completed HTTP request/response cycle.
///
/// Created by [`AccessLog::log()`](crate::AccessLog::log) after the response
/// has been sent, from the per-request [`LogArgProvider`] handle. The
/// timestamp, sequence number and request duration are captured at
/// construction; every other field is computed from the provider on first
/// access and memoized, so configurations logging only a few fields never pay
/// for the rest.
///
/// Events are populated by the single dispatching thread and only handed to
/// appenders afterwards, which is why per-field [`OnceCell`] memoization
/// without additional locking is sufficient here. Appenders treat the event
/// as read-only; an appender that needs to keep the data beyond the dispatch
/// call takes a [`DeferredAccessEvent`] via [`AccessEvent::to_deferred`].
///
/// Missing or unparseable data uniformly comes out as the `"-"` sentinel for
/// strings and `-1` for numbers.
#[derive(Debug)]
pub struct AccessEvent<'a> {
    provider: &'a dyn LogArgProvider,
    adapter: ServerAdapter<'a>,
    timestamp: i64,
    sequence_number: u64,
    elapsed_time: i64,
    thread_name: OnceCell<String>,
    raw_uri: OnceCell<Option<String>>,
    request_path: OnceCell<String>,
    query_string: OnceCell<String>,
    request_url: OnceCell<String>,
    method: OnceCell<String>,
    protocol: OnceCell<String>,
    remote_user: OnceCell<String>,
    remote_host: OnceCell<String>,
    remote_addr: OnceCell<String>,
    local_port: OnceCell<i32>,
    status_code: OnceCell<i32>,
    content_length: OnceCell<i64>,
    request_parameter_map: OnceCell<Vec<(String, Vec<String>)>>,
    request_header_map: OnceCell<HashMap<String, String>>,
    response_header_map: OnceCell<HashMap<String, String>>,
    cookies: OnceCell<Vec<(String, String)>>,
}

impl<'a> AccessEvent<'a> {
    /// Captures timestamp, sequence number and duration immediately; all
    /// other fields stay lazy.
    pub fn new(provider: &'a dyn LogArgProvider, context: &AccessContext) -> Self {
        let timestamp = UNIX_EPOCH
            .elapsed()
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        Self {
            provider,
            adapter: ServerAdapter::new(provider),
            timestamp,
            sequence_number: context.next_sequence_number(),
            elapsed_time: provider.duration().as_millis() as i64,
            thread_name: OnceCell::new(),
            raw_uri: OnceCell::new(),
            request_path: OnceCell::new(),
            query_string: OnceCell::new(),
            request_url: OnceCell::new(),
            method: OnceCell::new(),
            protocol: OnceCell::new(),
            remote_user: OnceCell::new(),
            remote_host: OnceCell::new(),
            remote_addr: OnceCell::new(),
            local_port: OnceCell::new(),
            status_code: OnceCell::new(),
            content_length: OnceCell::new(),
            request_parameter_map: OnceCell::new(),
            request_header_map: OnceCell::new(),
            response_header_map: OnceCell::new(),
            cookies: OnceCell::new(),
        }
    }

    /// Event creation time, milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Number from the context's sequence number generator, `0` if the
    /// context has none configured.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Request duration in milliseconds.
    pub fn elapsed_time(&self) -> i64 {
        self.elapsed_time
    }

    /// Request duration in whole seconds.
    pub fn elapsed_seconds(&self) -> i64 {
        self.elapsed_time / 1000
    }

    /// Name of the thread that dispatched the event, `"-"` before the
    /// dispatcher has set it.
    pub fn thread_name(&self) -> &str {
        self.thread_name.get().map(String::as_str).unwrap_or(NA)
    }

    /// Sets the thread name. The dispatcher calls this exactly once right
    /// after construction; later calls are ignored.
    pub(crate) fn set_thread_name(&self, name: String) {
        let _ = self.thread_name.set(name);
    }

    fn raw_uri(&self) -> Option<&str> {
        self.raw_uri
            .get_or_init(|| self.provider.uri().map(str::to_owned))
            .as_deref()
    }

    /// Request path, everything before the first `?` of the request target.
    /// `"-"` if the provider has no URI.
    pub fn request_path(&self) -> &str {
        self.request_path.get_or_init(|| match self.raw_uri() {
            Some(uri) => uri.split('?').next().unwrap_or(uri).to_owned(),
            None => NA.to_owned(),
        })
    }

    /// Query string including the leading `?`, the empty string if the
    /// request target has none, `"-"` if the provider has no URI.
    ///
    /// This is the verbatim substring of the request target, never re-encoded.
    pub fn query_string(&self) -> &str {
        self.query_string.get_or_init(|| match self.raw_uri() {
            Some(uri) => match uri.find('?') {
                Some(pos) => uri[pos..].to_owned(),
                None => String::new(),
            },
            None => NA.to_owned(),
        })
    }

    /// First line of the request, composed as `"{method} {uri} {protocol}"`.
    pub fn request_url(&self) -> &str {
        self.request_url.get_or_init(|| {
            format!(
                "{} {} {}",
                self.method(),
                self.raw_uri().unwrap_or(NA),
                self.protocol()
            )
        })
    }

    /// HTTP method.
    pub fn method(&self) -> &str {
        self.method
            .get_or_init(|| self.provider.method().unwrap_or(NA).to_owned())
    }

    /// Protocol version string.
    pub fn protocol(&self) -> &str {
        self.protocol
            .get_or_init(|| self.provider.protocol().unwrap_or(NA).to_owned())
    }

    /// Authenticated remote user.
    pub fn remote_user(&self) -> &str {
        self.remote_user
            .get_or_init(|| self.provider.user().unwrap_or(NA).to_owned())
    }

    /// Host string of the remote peer. For an IP peer this is the numeric
    /// address (no reverse lookup), for other peers their display form.
    pub fn remote_host(&self) -> &str {
        self.remote_host.get_or_init(|| {
            match self
                .provider
                .connection_info()
                .and_then(|connection| connection.remote)
            {
                Some(PeerAddr::Inet(addr)) => addr.ip().to_string(),
                Some(PeerAddr::Other(display)) => display,
                None => NA.to_owned(),
            }
        })
    }

    /// Numeric IP of the remote peer, falling back to the display form for
    /// non-IP peers.
    pub fn remote_addr(&self) -> &str {
        self.remote_addr.get_or_init(|| {
            match self
                .provider
                .connection_info()
                .and_then(|connection| connection.remote)
            {
                Some(PeerAddr::Inet(addr)) => addr.ip().to_string(),
                Some(PeerAddr::Other(display)) => display,
                None => NA.to_owned(),
            }
        })
    }

    /// Local server port the connection was accepted on, `-1` if unknown.
    pub fn local_port(&self) -> i32 {
        *self.local_port.get_or_init(|| {
            self.provider
                .connection_info()
                .and_then(|connection| connection.local_port)
                .map(i32::from)
                .unwrap_or(-1)
        })
    }

    /// Numeric response status code, `-1` if unknown.
    pub fn status_code(&self) -> i32 {
        *self.status_code.get_or_init(|| self.adapter.status_code())
    }

    /// Number of response body bytes sent.
    pub fn content_length(&self) -> i64 {
        *self
            .content_length
            .get_or_init(|| self.adapter.content_length())
    }

    /// Decoded query parameters in order of first appearance, each name with
    /// its values in encounter order.
    ///
    /// Only `name=value` segments where both sides are non-empty contribute;
    /// segments without `=`, with a leading `=` or with nothing after `=` are
    /// dropped. Decoding failures keep the raw string.
    pub fn request_parameter_map(&self) -> &[(String, Vec<String>)] {
        self.request_parameter_map.get_or_init(|| {
            let query = self.query_string();
            let mut params: Vec<(String, Vec<String>)> = Vec::new();
            if query.len() > 1 && query.starts_with('?') {
                for segment in query[1..].split('&') {
                    let Some(pos) = segment.find('=') else {
                        continue;
                    };
                    if pos < 1 || pos + 1 >= segment.len() {
                        continue;
                    }
                    let name = decode_catching(&segment[..pos]);
                    let value = decode_catching(&segment[pos + 1..]);
                    if let Some((_, values)) =
                        params.iter_mut().find(|(existing, _)| *existing == name)
                    {
                        values.push(value);
                    } else {
                        params.push((name, vec![value]));
                    }
                }
            }
            params
        })
    }

    /// Values of one query parameter, `["-"]` if absent.
    pub fn request_parameter(&self, name: &str) -> &[String] {
        self.request_parameter_map()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&NA_PARAM)
    }

    /// Request headers, names lowercased at ingestion, last occurrence of a
    /// name winning.
    pub fn request_header_map(&self) -> &HashMap<String, String> {
        self.request_header_map
            .get_or_init(|| header_map(self.provider.request_headers()))
    }

    /// Value of one request header (name matched case-insensitively), `"-"`
    /// if absent.
    pub fn request_header(&self, name: &str) -> &str {
        self.request_header_map()
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(NA)
    }

    /// Names of all request headers, lowercased.
    pub fn request_header_names(&self) -> impl Iterator<Item = &str> {
        self.request_header_map().keys().map(String::as_str)
    }

    /// Response headers, names lowercased at ingestion, last occurrence of a
    /// name winning.
    pub fn response_header_map(&self) -> &HashMap<String, String> {
        self.response_header_map
            .get_or_init(|| self.adapter.build_response_header_map())
    }

    /// Value of one response header (name matched case-insensitively), `"-"`
    /// if absent.
    pub fn response_header(&self, name: &str) -> &str {
        self.response_header_map()
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(NA)
    }

    /// Cookies in provider order, first value winning when a name carries
    /// several, blank names skipped.
    pub fn cookies(&self) -> &[(String, String)] {
        self.cookies.get_or_init(|| {
            let mut cookies = Vec::new();
            if let Some(iter) = self.provider.cookies() {
                for (name, values) in iter {
                    let Some(name) = name.filter(|name| !name.trim().is_empty()) else {
                        continue;
                    };
                    let Some(value) = values.first() else {
                        continue;
                    };
                    cookies.push((name.to_owned(), (*value).to_owned()));
                }
            }
            cookies
        })
    }

    /// Value of one cookie, `"-"` if absent.
    pub fn cookie(&self, name: &str) -> &str {
        self.cookies()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or(NA)
    }

    /// The timing/status adapter this event reads response data through.
    pub fn server_adapter(&self) -> &ServerAdapter<'a> {
        &self.adapter
    }

    /// Forces population of every lazy field.
    ///
    /// After this returns, no getter touches the provider again, so the event
    /// data stays correct even once the underlying request handle is gone.
    /// Must be called before serializing the event or moving its data to
    /// another task.
    pub fn prepare_for_deferred_processing(&self) {
        self.request_path();
        self.query_string();
        self.request_url();
        self.method();
        self.protocol();
        self.remote_user();
        self.remote_host();
        self.remote_addr();
        self.local_port();
        self.status_code();
        self.content_length();
        self.request_parameter_map();
        self.request_header_map();
        self.response_header_map();
        self.cookies();
    }

    /// Materializes the event into an owned [`DeferredAccessEvent`], forcing
    /// all lazy fields first.
    pub fn to_deferred(&self) -> DeferredAccessEvent {
        self.prepare_for_deferred_processing();
        DeferredAccessEvent {
            timestamp: self.timestamp(),
            sequence_number: self.sequence_number(),
            elapsed_time: self.elapsed_time(),
            elapsed_seconds: self.elapsed_seconds(),
            thread_name: self.thread_name().to_owned(),
            method: self.method().to_owned(),
            protocol: self.protocol().to_owned(),
            request_path: self.request_path().to_owned(),
            query_string: self.query_string().to_owned(),
            request_url: self.request_url().to_owned(),
            remote_user: self.remote_user().to_owned(),
            remote_host: self.remote_host().to_owned(),
            remote_addr: self.remote_addr().to_owned(),
            local_port: self.local_port(),
            status_code: self.status_code(),
            content_length: self.content_length(),
            request_parameters: self.request_parameter_map().to_vec(),
            request_headers: self.request_header_map().clone(),
            response_headers: self.response_header_map().clone(),
            cookies: self.cookies().to_vec(),
        }
    }
}

/// Owned snapshot of a fully populated [`AccessEvent`].
///
/// Self-contained and serializable, safe to move across task or thread
/// boundaries after the originating request handle is gone. This is what
/// buffering appenders store and what the JSON appender writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeferredAccessEvent {
    /// Event creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Sequence number, `0` if the context has no generator.
    pub sequence_number: u64,
    /// Request duration in milliseconds.
    pub elapsed_time: i64,
    /// Request duration in whole seconds.
    pub elapsed_seconds: i64,
    /// Name of the dispatching thread.
    pub thread_name: String,
    /// HTTP method.
    pub method: String,
    /// Protocol version string.
    pub protocol: String,
    /// Request path without the query string.
    pub request_path: String,
    /// Query string including the leading `?`, if any.
    pub query_string: String,
    /// First line of the request.
    pub request_url: String,
    /// Authenticated remote user.
    pub remote_user: String,
    /// Host string of the remote peer.
    pub remote_host: String,
    /// Numeric IP of the remote peer.
    pub remote_addr: String,
    /// Local server port, `-1` if unknown.
    pub local_port: i32,
    /// Response status code, `-1` if unknown.
    pub status_code: i32,
    /// Response body bytes sent.
    pub content_length: i64,
    /// Decoded query parameters in order of first appearance.
    pub request_parameters: Vec<(String, Vec<String>)>,
    /// Request headers, names lowercased.
    pub request_headers: HashMap<String, String>,
    /// Response headers, names lowercased.
    pub response_headers: HashMap<String, String>,
    /// Cookies in provider order.
    pub cookies: Vec<(String, String)>,
}

impl DeferredAccessEvent {
    /// Value of one request header (name matched case-insensitively), `"-"`
    /// if absent.
    pub fn request_header(&self, name: &str) -> &str {
        self.request_headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(NA)
    }

    /// Value of one response header (name matched case-insensitively), `"-"`
    /// if absent.
    pub fn response_header(&self, name: &str) -> &str {
        self.response_headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(NA)
    }

    /// Value of one cookie, `"-"` if absent.
    pub fn cookie(&self, name: &str) -> &str {
        self.cookies
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or(NA)
    }

    /// Values of one query parameter, `["-"]` if absent.
    pub fn request_parameter(&self, name: &str) -> &[String] {
        self.request_parameters
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&NA_PARAM)
    }
}

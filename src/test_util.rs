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

//! Scriptable provider implementation backing the tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::provider::{ConnectionInfo, CookieIter, HeaderIter, LogArgProvider, PeerAddr};

/// Guards the process-global `ACCESS_LOG_CONFIG` variable. Every test that
/// sets it, or constructs a factory relying on its absence, holds this lock.
pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Provider fed from fixed data, counting accessor calls.
///
/// `invalidate()` simulates the host server reclaiming the request handle;
/// any provider access after that panics, which is how the tests prove that
/// memoized fields no longer reach for the provider.
#[derive(Debug, Default)]
pub(crate) struct MockProvider {
    method: Option<String>,
    uri: Option<String>,
    protocol: Option<String>,
    user: Option<String>,
    status: Option<String>,
    content_length: i64,
    duration: Duration,
    access_timestamp: Option<SystemTime>,
    connection_info: Option<ConnectionInfo>,
    request_headers: Option<Vec<(Option<String>, Option<String>)>>,
    response_headers: Option<Vec<(Option<String>, Option<String>)>>,
    cookies: Option<Vec<(Option<String>, Vec<String>)>>,
    invalidated: AtomicBool,
    uri_calls: AtomicUsize,
    connection_calls: AtomicUsize,
    request_header_calls: AtomicUsize,
    cookie_calls: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn builder() -> MockProviderBuilder {
        MockProviderBuilder(MockProvider::default())
    }

    /// Makes every subsequent provider access panic.
    pub(crate) fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    pub(crate) fn uri_calls(&self) -> usize {
        self.uri_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_calls(&self) -> usize {
        self.connection_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn request_header_calls(&self) -> usize {
        self.request_header_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cookie_calls(&self) -> usize {
        self.cookie_calls.load(Ordering::SeqCst)
    }

    fn check(&self) {
        assert!(
            !self.invalidated.load(Ordering::SeqCst),
            "provider accessed after invalidation"
        );
    }
}

impl LogArgProvider for MockProvider {
    fn method(&self) -> Option<&str> {
        self.check();
        self.method.as_deref()
    }

    fn uri(&self) -> Option<&str> {
        self.check();
        self.uri_calls.fetch_add(1, Ordering::SeqCst);
        self.uri.as_deref()
    }

    fn protocol(&self) -> Option<&str> {
        self.check();
        self.protocol.as_deref()
    }

    fn user(&self) -> Option<&str> {
        self.check();
        self.user.as_deref()
    }

    fn request_headers(&self) -> Option<HeaderIter<'_>> {
        self.check();
        self.request_header_calls.fetch_add(1, Ordering::SeqCst);
        let headers = self.request_headers.as_ref()?;
        Some(Box::new(
            headers
                .iter()
                .map(|(name, value)| (name.as_deref(), value.as_deref())),
        ))
    }

    fn response_headers(&self) -> Option<HeaderIter<'_>> {
        self.check();
        let headers = self.response_headers.as_ref()?;
        Some(Box::new(
            headers
                .iter()
                .map(|(name, value)| (name.as_deref(), value.as_deref())),
        ))
    }

    fn cookies(&self) -> Option<CookieIter<'_>> {
        self.check();
        self.cookie_calls.fetch_add(1, Ordering::SeqCst);
        let cookies = self.cookies.as_ref()?;
        Some(Box::new(cookies.iter().map(|(name, values)| {
            (
                name.as_deref(),
                values.iter().map(String::as_str).collect::<Vec<_>>(),
            )
        })))
    }

    fn connection_info(&self) -> Option<ConnectionInfo> {
        self.check();
        self.connection_calls.fetch_add(1, Ordering::SeqCst);
        self.connection_info.clone()
    }

    fn status(&self) -> Option<&str> {
        self.check();
        self.status.as_deref()
    }

    fn content_length(&self) -> i64 {
        self.check();
        self.content_length
    }

    fn duration(&self) -> Duration {
        self.check();
        self.duration
    }

    fn access_timestamp(&self) -> Option<SystemTime> {
        self.check();
        self.access_timestamp
    }
}

pub(crate) struct MockProviderBuilder(MockProvider);

impl MockProviderBuilder {
    pub(crate) fn method(mut self, method: &str) -> Self {
        self.0.method = Some(method.to_owned());
        self
    }

    pub(crate) fn uri(mut self, uri: &str) -> Self {
        self.0.uri = Some(uri.to_owned());
        self
    }

    pub(crate) fn protocol(mut self, protocol: &str) -> Self {
        self.0.protocol = Some(protocol.to_owned());
        self
    }

    pub(crate) fn user(mut self, user: &str) -> Self {
        self.0.user = Some(user.to_owned());
        self
    }

    pub(crate) fn remote_inet(mut self, addr: &str) -> Self {
        let info = self.0.connection_info.get_or_insert_with(Default::default);
        info.remote = Some(PeerAddr::Inet(addr.parse().unwrap()));
        self
    }

    pub(crate) fn remote_other(mut self, display: &str) -> Self {
        let info = self.0.connection_info.get_or_insert_with(Default::default);
        info.remote = Some(PeerAddr::Other(display.to_owned()));
        self
    }

    pub(crate) fn local_port(mut self, port: u16) -> Self {
        let info = self.0.connection_info.get_or_insert_with(Default::default);
        info.local_port = Some(port);
        self
    }

    pub(crate) fn status(mut self, status: &str) -> Self {
        self.0.status = Some(status.to_owned());
        self
    }

    pub(crate) fn content_length(mut self, length: i64) -> Self {
        self.0.content_length = length;
        self
    }

    pub(crate) fn duration(mut self, duration: Duration) -> Self {
        self.0.duration = duration;
        self
    }

    pub(crate) fn request_header(self, name: &str, value: &str) -> Self {
        self.request_header_entry(Some(name), Some(value))
    }

    /// Raw entry allowing missing names or values.
    pub(crate) fn request_header_entry(
        mut self,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Self {
        self.0
            .request_headers
            .get_or_insert_with(Vec::new)
            .push((name.map(str::to_owned), value.map(str::to_owned)));
        self
    }

    pub(crate) fn response_header(mut self, name: &str, value: &str) -> Self {
        self.0
            .response_headers
            .get_or_insert_with(Vec::new)
            .push((Some(name.to_owned()), Some(value.to_owned())));
        self
    }

    pub(crate) fn cookie(self, name: &str, value: &str) -> Self {
        self.cookie_entry(Some(name), &[value])
    }

    /// Raw entry allowing missing names and multiple values.
    pub(crate) fn cookie_entry(mut self, name: Option<&str>, values: &[&str]) -> Self {
        self.0.cookies.get_or_insert_with(Vec::new).push((
            name.map(str::to_owned),
            values.iter().map(|value| (*value).to_owned()).collect(),
        ));
        self
    }

    pub(crate) fn build(self) -> MockProvider {
        self.0
    }
}

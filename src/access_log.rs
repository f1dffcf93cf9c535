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

//! One-shot dispatch of a finished request to the logging pipeline

use std::sync::Arc;

use crate::context::AccessContext;
use crate::event::AccessEvent;
use crate::filter::FilterReply;
use crate::provider::LogArgProvider;

/// What happened to an event handed to [`AccessLog::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event passed the filter chain and every appender succeeded.
    Appended,
    /// The filter chain denied the event, no appender saw it.
    Denied,
    /// At least one appender failed, recorded as error statuses on the
    /// context.
    Failed,
}

/// Per-request dispatch handle, created by
/// [`AccessLogFactory::create`](crate::AccessLogFactory::create) once the
/// response is complete.
///
/// Consumed by [`log`](Self::log), each handle dispatches exactly once.
#[derive(Debug)]
pub struct AccessLog<'a> {
    context: Arc<AccessContext>,
    provider: &'a dyn LogArgProvider,
}

impl<'a> AccessLog<'a> {
    pub(crate) fn new(context: Arc<AccessContext>, provider: &'a dyn LogArgProvider) -> Self {
        Self { context, provider }
    }

    /// Builds the event and runs it through the filter chain and the
    /// appenders. Appender failures are isolated, the caller only learns
    /// about them through the returned outcome and the context's statuses.
    pub async fn log(self) -> DispatchOutcome {
        let event = AccessEvent::new(self.provider, &self.context);
        event.set_thread_name(current_thread_name());

        if self.context.filter_chain_decision(&event) == FilterReply::Deny {
            return DispatchOutcome::Denied;
        }

        if self.context.call_appenders(&event).await > 0 {
            DispatchOutcome::Failed
        } else {
            DispatchOutcome::Appended
        }
    }
}

fn current_thread_name() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_owned(),
        None => format!("{:?}", current.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_log::test;

    use crate::appender::{AppendError, Appender, CaptureAppender};
    use crate::filter::Filter;
    use crate::status::StatusLevel;
    use crate::test_util::MockProvider;

    #[derive(Debug)]
    struct FixedFilter(FilterReply);

    impl Filter for FixedFilter {
        fn decide(&self, _event: &AccessEvent<'_>) -> FilterReply {
            self.0
        }
    }

    #[derive(Debug, Default)]
    struct FailingAppender {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Appender for FailingAppender {
        fn name(&self) -> &str {
            "failing"
        }

        async fn append(&self, _event: &AccessEvent<'_>) -> Result<(), AppendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("sink unavailable".into())
        }
    }

    fn request_provider() -> MockProvider {
        MockProvider::builder()
            .method("GET")
            .uri("/test")
            .protocol("HTTP/1.1")
            .status("200")
            .build()
    }

    #[test(tokio::test)]
    async fn appends_when_chain_is_neutral() {
        let context = Arc::new(AccessContext::new());
        let capture = Arc::new(CaptureAppender::new("capture"));
        context.add_appender(capture.clone());

        let provider = request_provider();
        let outcome = AccessLog::new(context, &provider).log().await;
        assert_eq!(outcome, DispatchOutcome::Appended);
        assert_eq!(capture.len(), 1);
        assert!(!capture.events()[0].thread_name.is_empty());
    }

    #[test(tokio::test)]
    async fn deny_suppresses_all_appenders() {
        let context = Arc::new(AccessContext::new());
        let capture = Arc::new(CaptureAppender::new("capture"));
        context.add_appender(capture.clone());
        context.add_filter(Box::new(FixedFilter(FilterReply::Accept)));
        context.add_filter(Box::new(FixedFilter(FilterReply::Deny)));

        let provider = request_provider();
        let outcome = AccessLog::new(context.clone(), &provider).log().await;
        // Accept came first in the chain, so Deny never applied.
        assert_eq!(outcome, DispatchOutcome::Appended);
        assert_eq!(capture.len(), 1);

        let context = Arc::new(AccessContext::new());
        let capture = Arc::new(CaptureAppender::new("capture"));
        context.add_appender(capture.clone());
        context.add_filter(Box::new(FixedFilter(FilterReply::Deny)));

        let provider = request_provider();
        let outcome = AccessLog::new(context, &provider).log().await;
        assert_eq!(outcome, DispatchOutcome::Denied);
        assert!(capture.is_empty());
    }

    #[test(tokio::test)]
    async fn appender_failure_is_isolated() {
        let context = Arc::new(AccessContext::new());
        let failing = Arc::new(FailingAppender::default());
        let capture = Arc::new(CaptureAppender::new("capture"));
        context.add_appender(failing.clone());
        context.add_appender(capture.clone());

        let provider = request_provider();
        let outcome = AccessLog::new(context.clone(), &provider).log().await;
        assert_eq!(outcome, DispatchOutcome::Failed);

        // The failure didn't prevent the other appender from running.
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(capture.len(), 1);
        assert_eq!(
            context.status_manager().highest_level(),
            Some(StatusLevel::Error)
        );
    }
}

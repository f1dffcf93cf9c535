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

//! The shared runtime state of one access logging pipeline

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::appender::Appender;
use crate::event::AccessEvent;
use crate::filter::{chain_decision, Filter, FilterReply};
use crate::status::{Status, StatusManager};

/// Issues event sequence numbers. Implementations must produce strictly
/// increasing, unique values under concurrent access.
pub trait SequenceNumberGenerator: Send + Sync + Debug {
    /// Next sequence number.
    fn next_sequence_number(&self) -> u64;
}

/// Atomic counter starting at 1.
#[derive(Debug, Default)]
pub struct BasicSequenceNumberGenerator(AtomicU64);

impl SequenceNumberGenerator for BasicSequenceNumberGenerator {
    fn next_sequence_number(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Configured runtime state shared by every dispatch call of one factory:
/// appenders, filter chain, status manager and sequence number generator.
///
/// Read-mostly after [`start()`](Self::start); only the status manager and
/// the sequence number generator are mutated per event, and both are safe for
/// concurrent use.
#[derive(Debug, Default)]
pub struct AccessContext {
    name: Mutex<String>,
    appenders: RwLock<Vec<Arc<dyn Appender>>>,
    filters: RwLock<Vec<Box<dyn Filter>>>,
    status_manager: StatusManager,
    sequence_number_generator: RwLock<Option<Arc<dyn SequenceNumberGenerator>>>,
    started: AtomicBool,
}

impl AccessContext {
    /// A fresh, unconfigured context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostic name, usually the resolved configuration path.
    pub fn name(&self) -> String {
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets the diagnostic name.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// Attaches an appender. Appenders run in registration order.
    pub fn add_appender(&self, appender: Arc<dyn Appender>) {
        self.appenders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(appender);
    }

    /// Looks an appender up by name.
    pub fn get_appender(&self, name: &str) -> Option<Arc<dyn Appender>> {
        self.appenders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|appender| appender.name() == name)
            .cloned()
    }

    /// Number of attached appenders.
    pub fn appender_count(&self) -> usize {
        self.appenders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Appends a filter to the chain.
    pub fn add_filter(&self, filter: Box<dyn Filter>) {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(filter);
    }

    /// Runs the filter chain over one event.
    pub fn filter_chain_decision(&self, event: &AccessEvent<'_>) -> FilterReply {
        chain_decision(
            &self.filters.read().unwrap_or_else(PoisonError::into_inner),
            event,
        )
    }

    /// Hands the event to every attached appender in order. Each appender
    /// failure is recorded as an error status; the number of failures is
    /// returned.
    pub async fn call_appenders(&self, event: &AccessEvent<'_>) -> usize {
        // Snapshot outside the lock, appending may await.
        let appenders: Vec<_> = self
            .appenders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for appender in appenders {
            if let Err(err) = appender.append(event).await {
                self.status_manager.add(Status::error_with(
                    format!("Appender [{}] failed to append event", appender.name()),
                    "AccessContext",
                    &err,
                ));
                failures += 1;
            }
        }
        failures
    }

    /// The diagnostic status channel of this context.
    pub fn status_manager(&self) -> &StatusManager {
        &self.status_manager
    }

    /// Installs a sequence number generator. Without one, all events get
    /// sequence number `0`.
    pub fn set_sequence_number_generator(&self, generator: Arc<dyn SequenceNumberGenerator>) {
        *self
            .sequence_number_generator
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(generator);
    }

    /// The installed sequence number generator, if any.
    pub fn sequence_number_generator(&self) -> Option<Arc<dyn SequenceNumberGenerator>> {
        self.sequence_number_generator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn next_sequence_number(&self) -> u64 {
        self.sequence_number_generator()
            .map(|generator| generator.next_sequence_number())
            .unwrap_or(0)
    }

    /// Marks the context as started. Called once by the factory after
    /// configuration has been applied.
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Marks the context as stopped.
    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
    }

    /// Whether [`start()`](Self::start) has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use test_log::test;

    #[test(tokio::test(flavor = "multi_thread"))]
    async fn concurrent_sequence_numbers_are_unique_and_increasing() {
        let generator = Arc::new(BasicSequenceNumberGenerator::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = Arc::clone(&generator);
            handles.push(tokio::spawn(async move {
                let mut numbers = Vec::new();
                for _ in 0..1000 {
                    numbers.push(generator.next_sequence_number());
                }
                numbers
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let numbers = handle.await.unwrap();
            // Strictly increasing from the point of view of each task.
            assert!(numbers.windows(2).all(|pair| pair[0] < pair[1]));
            for number in numbers {
                assert!(seen.insert(number));
            }
        }
        assert_eq!(seen.len(), 8000);
        assert!(!seen.contains(&0));
    }

    #[test]
    fn no_generator_means_zero() {
        let context = AccessContext::new();
        assert_eq!(context.next_sequence_number(), 0);

        context.set_sequence_number_generator(Arc::new(BasicSequenceNumberGenerator::default()));
        assert_eq!(context.next_sequence_number(), 1);
        assert_eq!(context.next_sequence_number(), 2);
    }

    #[test]
    fn start_stop() {
        let context = AccessContext::new();
        assert!(!context.is_started());
        context.start();
        assert!(context.is_started());
        context.stop();
        assert!(!context.is_started());
    }
}

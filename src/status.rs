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

//! Diagnostic status records of the configuration and logging process

use log::{debug, error, warn};
use std::fmt::{self, Debug, Display};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

/// Severity of a [`Status`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusLevel {
    /// Routine progress information.
    Info,
    /// Something unexpected that didn't prevent configuration.
    Warn,
    /// A failure, typically followed by the operation erroring out.
    Error,
}

/// One diagnostic record emitted during configuration or dispatch.
#[derive(Debug, Clone)]
pub struct Status {
    level: StatusLevel,
    message: String,
    origin: &'static str,
    timestamp: SystemTime,
    cause: Option<String>,
}

impl Status {
    fn new(level: StatusLevel, message: impl Into<String>, origin: &'static str) -> Self {
        Self {
            level,
            message: message.into(),
            origin,
            timestamp: SystemTime::now(),
            cause: None,
        }
    }

    /// An informational status.
    pub fn info(message: impl Into<String>, origin: &'static str) -> Self {
        Self::new(StatusLevel::Info, message, origin)
    }

    /// A warning status.
    pub fn warn(message: impl Into<String>, origin: &'static str) -> Self {
        Self::new(StatusLevel::Warn, message, origin)
    }

    /// An error status.
    pub fn error(message: impl Into<String>, origin: &'static str) -> Self {
        Self::new(StatusLevel::Error, message, origin)
    }

    /// An error status carrying its cause.
    pub fn error_with(
        message: impl Into<String>,
        origin: &'static str,
        cause: &dyn Display,
    ) -> Self {
        let mut status = Self::new(StatusLevel::Error, message, origin);
        status.cause = Some(cause.to_string());
        status
    }

    /// Severity of this record.
    pub fn level(&self) -> StatusLevel {
        self.level
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Component that emitted the record.
    pub fn origin(&self) -> &'static str {
        self.origin
    }

    /// Time the record was created.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            StatusLevel::Info => "INFO",
            StatusLevel::Warn => "WARN",
            StatusLevel::Error => "ERROR",
        };
        write!(f, "{level} in {} - {}", self.origin, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {cause})")?;
        }
        Ok(())
    }
}

/// Receives every status record as it is added to the manager.
pub trait StatusListener: Send + Sync + Debug {
    /// Called for each newly added record.
    fn add_status_event(&self, status: &Status);
}

/// Listener printing every status record to standard error as it arrives.
/// Attached by the factory when debug diagnostics are enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnConsoleStatusListener;

impl StatusListener for OnConsoleStatusListener {
    fn add_status_event(&self, status: &Status) {
        eprintln!("{status}");
    }
}

/// Collects status records for one logging context.
///
/// Safe for concurrent mutation: configuration and every dispatch call may
/// add records. Warnings and errors are additionally forwarded to the `log`
/// crate so they show up in the host application's own logs.
#[derive(Debug, Default)]
pub struct StatusManager {
    statuses: Mutex<Vec<Status>>,
    listeners: Mutex<Vec<Box<dyn StatusListener>>>,
}

impl StatusManager {
    /// Records one status and notifies all listeners.
    pub fn add(&self, status: Status) {
        match status.level {
            StatusLevel::Info => debug!("{status}"),
            StatusLevel::Warn => warn!("{status}"),
            StatusLevel::Error => error!("{status}"),
        }
        for listener in self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            listener.add_status_event(&status);
        }
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status);
    }

    /// Copy of all recorded statuses, in insertion order.
    pub fn statuses(&self) -> Vec<Status> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest severity recorded so far, `None` when empty.
    pub fn highest_level(&self) -> Option<StatusLevel> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Status::level)
            .max()
    }

    /// Attaches a listener receiving all subsequently added records.
    pub fn add_listener(&self, listener: Box<dyn StatusListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Prints all recorded statuses to standard error, but only if at least
    /// one warning or error occurred. Quiet in the happy case.
    pub fn print_in_case_of_errors_or_warnings(&self) {
        if self
            .highest_level()
            .is_some_and(|level| level >= StatusLevel::Warn)
        {
            for status in self.statuses() {
                eprintln!("{status}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn levels_and_highest() {
        let manager = StatusManager::default();
        assert_eq!(manager.highest_level(), None);

        manager.add(Status::info("configuring", "test"));
        assert_eq!(manager.highest_level(), Some(StatusLevel::Info));

        manager.add(Status::warn("odd but fine", "test"));
        manager.add(Status::info("still going", "test"));
        assert_eq!(manager.highest_level(), Some(StatusLevel::Warn));

        manager.add(Status::error_with("broke", "test", &"io error"));
        assert_eq!(manager.highest_level(), Some(StatusLevel::Error));
        assert_eq!(manager.statuses().len(), 4);
    }

    #[test]
    fn display_format() {
        let status = Status::error_with("failed to configure", "AccessLogFactory", &"not found");
        assert_eq!(
            status.to_string(),
            "ERROR in AccessLogFactory - failed to configure (cause: not found)"
        );
        let status = Status::info("done configuring", "AccessLogFactory");
        assert_eq!(status.to_string(), "INFO in AccessLogFactory - done configuring");
    }

    #[test]
    fn listeners_receive_records() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        #[derive(Debug, Default)]
        struct CountingListener(AtomicUsize);

        impl StatusListener for Arc<CountingListener> {
            fn add_status_event(&self, _status: &Status) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let manager = StatusManager::default();
        manager.add(Status::info("before listener", "test"));

        let counter = Arc::new(CountingListener::default());
        manager.add_listener(Box::new(Arc::clone(&counter)));
        assert_eq!(manager.listener_count(), 1);

        manager.add(Status::info("after listener", "test"));
        manager.add(Status::warn("another", "test"));
        assert_eq!(counter.0.load(Ordering::Relaxed), 2);
    }
}

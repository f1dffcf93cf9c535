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

//! Output sinks for access events

use async_trait::async_trait;
use std::fmt::Debug;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::configuration::{default_log_format, AppenderConf, AppenderKind, LogField};
use crate::event::{AccessEvent, DeferredAccessEvent};
use crate::factory::ConfigError;
use crate::format::render_line;
use crate::writer::{self, WriterMessage};

/// Error type appenders are free to fill with whatever suits their sink.
pub type AppendError = Box<dyn std::error::Error + Send + Sync>;

/// Sink receiving each event that passed the filter chain.
///
/// Appenders get the event by reference and must treat it as read-only; an
/// appender that wants to keep the data takes an owned
/// [`DeferredAccessEvent`] via [`AccessEvent::to_deferred`]. Appending is
/// expected to be fast; anything slow should offload internally (the bundled
/// file appenders hand their lines to a shared writer task).
#[async_trait]
pub trait Appender: Send + Sync + Debug {
    /// Appender name, used for lookups and diagnostics.
    fn name(&self) -> &str;

    /// Writes one event. Errors are recorded as error statuses by the
    /// context and never disturb the request path.
    async fn append(&self, event: &AccessEvent<'_>) -> Result<(), AppendError>;
}

fn normalize_path(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() || path.as_os_str() == "-" {
        // Don't change special paths
        return Ok(path);
    }

    if let Some(parent) = path.parent() {
        let mut parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".").canonicalize()
        } else {
            parent.canonicalize()
        }
        .map_err(|err| ConfigError::Io {
            path: path.clone(),
            source: err,
        })?;
        if let Some(name) = path.file_name() {
            parent.push(name);
        }
        Ok(parent)
    } else {
        // Absolute path in the root, leave unchanged
        Ok(path)
    }
}

/// Writes formatted log lines to standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleAppender {
    name: String,
    format: Vec<LogField>,
}

impl ConsoleAppender {
    /// A console appender using the Common Log Format.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: default_log_format(),
        }
    }

    /// Replaces the log format.
    pub fn with_format(mut self, format: Vec<LogField>) -> Self {
        self.format = format;
        self
    }
}

#[async_trait]
impl Appender for ConsoleAppender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, event: &AccessEvent<'_>) -> Result<(), AppendError> {
        let mut buf = Vec::with_capacity(256);
        render_line(&mut buf, &self.format, event);
        std::io::stdout().lock().write_all(&buf)?;
        Ok(())
    }
}

/// Writes formatted log lines to a file through the shared writer task.
///
/// A log file is created if necessary, data in already existing files is
/// kept. On Unix the process can be sent a `HUP` or `USR1` signal to make it
/// re-open log files, useful after rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAppender {
    name: String,
    log_file: PathBuf,
    format: Vec<LogField>,
}

impl FileAppender {
    /// A file appender using the Common Log Format. The parent directory of
    /// `log_file` has to exist.
    pub fn new(name: impl Into<String>, log_file: PathBuf) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.into(),
            // Normalize so that the same file specified with different paths
            // shares one writer handle.
            log_file: normalize_path(log_file)?,
            format: default_log_format(),
        })
    }

    /// Replaces the log format.
    pub fn with_format(mut self, format: Vec<LogField>) -> Self {
        self.format = format;
        self
    }
}

#[async_trait]
impl Appender for FileAppender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, event: &AccessEvent<'_>) -> Result<(), AppendError> {
        let mut buf = Vec::with_capacity(256);
        render_line(&mut buf, &self.format, event);
        writer::sender()
            .send(WriterMessage::line(&self.log_file, buf))
            .await?;
        Ok(())
    }
}

/// Writes one JSON object per event, fully materialized via
/// [`AccessEvent::to_deferred`], to a file or standard output (`-`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonAppender {
    name: String,
    log_file: PathBuf,
}

impl JsonAppender {
    /// A JSON lines appender.
    pub fn new(name: impl Into<String>, log_file: PathBuf) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.into(),
            log_file: normalize_path(log_file)?,
        })
    }
}

#[async_trait]
impl Appender for JsonAppender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, event: &AccessEvent<'_>) -> Result<(), AppendError> {
        let mut line = serde_json::to_vec(&event.to_deferred())?;
        line.push(b'\n');
        writer::sender()
            .send(WriterMessage::line(&self.log_file, line))
            .await?;
        Ok(())
    }
}

/// Buffers materialized events for later inspection, mainly useful in tests.
#[derive(Debug, Default)]
pub struct CaptureAppender {
    name: String,
    events: Mutex<Vec<DeferredAccessEvent>>,
}

impl CaptureAppender {
    /// A fresh capture appender.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Copy of all captured events, in append order.
    pub fn events(&self) -> Vec<DeferredAccessEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of captured events.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was captured yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Appender for CaptureAppender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, event: &AccessEvent<'_>) -> Result<(), AppendError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.to_deferred());
        Ok(())
    }
}

/// Builds the appender described by one configuration entry.
pub(crate) fn build_appender(conf: &AppenderConf) -> Result<Arc<dyn Appender>, ConfigError> {
    let format = if conf.log_format.is_empty() {
        default_log_format()
    } else {
        conf.log_format.clone()
    };
    Ok(match conf.kind {
        AppenderKind::Console => Arc::new(ConsoleAppender::new(&conf.name).with_format(format)),
        AppenderKind::File => {
            Arc::new(FileAppender::new(&conf.name, conf.log_file.clone())?.with_format(format))
        }
        AppenderKind::Json => Arc::new(JsonAppender::new(&conf.name, conf.log_file.clone())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::env::current_dir;
    use test_log::test;

    use crate::context::AccessContext;
    use crate::test_util::MockProvider;

    #[test]
    fn path_normalization() {
        let cwd = current_dir().unwrap().canonicalize().unwrap();
        let mut root = cwd.clone();
        while let Some(parent) = root.parent() {
            root = parent.into();
        }

        assert_eq!(normalize_path("".into()).unwrap(), PathBuf::from(""));
        assert_eq!(normalize_path("-".into()).unwrap(), PathBuf::from("-"));
        assert_eq!(
            normalize_path("file.txt".into()).unwrap(),
            cwd.join("file.txt")
        );
        assert_eq!(
            normalize_path("./file.txt".into()).unwrap(),
            cwd.join("file.txt")
        );
        assert_eq!(
            normalize_path("../file.txt".into()).unwrap(),
            cwd.parent().unwrap().join("file.txt")
        );
        assert_eq!(
            normalize_path(cwd.join("file.txt")).unwrap(),
            cwd.join("file.txt")
        );
        assert_eq!(
            normalize_path(root.join("file.txt")).unwrap(),
            root.join("file.txt")
        );
        assert!(normalize_path("no_such_dir/file.txt".into()).is_err());
    }

    #[test(tokio::test)]
    async fn capture_appender_takes_snapshots() {
        let provider = MockProvider::builder()
            .method("GET")
            .uri("/test")
            .protocol("HTTP/1.1")
            .status("200")
            .build();
        let context = AccessContext::new();
        let event = AccessEvent::new(&provider, &context);

        let appender = CaptureAppender::new("capture");
        assert!(appender.is_empty());
        appender.append(&event).await.unwrap();

        let events = appender.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_path, "/test");
        assert_eq!(events[0].status_code, 200);
    }

    #[test(tokio::test)]
    async fn file_appender_writes_through_shared_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");

        let provider = MockProvider::builder()
            .method("GET")
            .uri("/file")
            .protocol("HTTP/1.1")
            .status("204")
            .build();
        let context = AccessContext::new();
        let event = AccessEvent::new(&provider, &context);

        let appender = FileAppender::new("file", path.clone()).unwrap();
        appender.append(&event).await.unwrap();

        // The shared writer runs asynchronously, poll for the line.
        let mut contents = String::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            contents = std::fs::read_to_string(&path).unwrap_or_default();
            if !contents.is_empty() {
                break;
            }
        }
        assert!(contents.contains("\"GET /file HTTP/1.1\" 204"));
    }

    #[test]
    fn build_from_conf() {
        let conf = AppenderConf {
            name: "console".to_owned(),
            kind: AppenderKind::Console,
            log_file: "-".into(),
            log_format: Vec::new(),
        };
        let appender = build_appender(&conf).unwrap();
        assert_eq!(appender.name(), "console");

        let conf = AppenderConf {
            name: "broken".to_owned(),
            kind: AppenderKind::File,
            log_file: "no_such_dir/access.log".into(),
            log_format: Vec::new(),
        };
        assert!(build_appender(&conf).is_err());
    }
}

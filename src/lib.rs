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

//! # Access Log Module
//!
//! This crate turns completed HTTP request/response cycles into access log
//! entries. A server engine exposes each finished request through a
//! [`LogArgProvider`] handle; the module freezes it into an immutable
//! [`AccessEvent`], runs it through a filter chain and hands it to the
//! configured appenders. A configuration file could look like this:
//!
//! ```yaml
//! appenders:
//!   - name: main
//!     kind: file
//!     log_file: access.log
//!     log_format: [
//!         remote_addr, -, remote_user, time_local, request, status, bytes_sent,
//!         http_referer, http_user_agent
//!     ]
//! sequence_numbers: true
//! ```
//!
//! The configuration file is resolved once when an [`AccessLogFactory`] is
//! created: an explicit `--access-log-config` path wins, then the
//! `ACCESS_LOG_CONFIG` environment variable, then `access-log.yaml` in the
//! working directory, and finally a built-in default logging the Common Log
//! Format to the console. Only explicitly named files have to exist.
//!
//! The supported fields for the `log_format` setting are:
//!
//! * `-`: Verbatim `-` character (for unsupported fields)
//! * `remote_addr`: client’s IP address
//! * `remote_host`: host string of the client (numeric, no reverse lookup)
//! * `local_port`: server port the connection was accepted on
//! * `remote_user`: authenticated user
//! * `time_local`: date and time of the request, e.g. `[10/Oct/2000:13:55:36 -0700]`
//! * `time_iso8601`: date and time in the ISO 8601 format
//! * `request`: quoted request line, e.g. `"GET / HTTP/1.1"`
//! * `status`: status code of the response, e.g. `200`
//! * `bytes_sent`: number of bytes sent as response
//! * `processing_time`: time from request being received to response in milliseconds
//! * `query_string`: query string including the leading `?`
//! * `sequence_number`: event sequence number, `0` without a generator
//! * `thread_name`: quoted name of the dispatching thread
//! * `http_<header>`: quoted value of an HTTP request header
//! * `sent_http_<header>`: quoted value of an HTTP response header
//! * `cookie_<name>`: quoted value of a request cookie
//!
//! File appenders add one line per request. A log file will be created if
//! necessary, data in already existing files will be kept. On Unix-based
//! systems, the process can be sent a `HUP` or `USR1` signal to make it
//! re-open log files. This is useful after the logs have been rotated for
//! example.
//!
//! ## Code example
//!
//! The server creates one factory at startup and one [`AccessLog`] handle per
//! finished request:
//!
//! ```rust,no_run
//! use access_log_module::{AccessLogFactory, AccessLogOpt};
//! use clap::Parser;
//!
//! # async fn example(provider: &dyn access_log_module::LogArgProvider) {
//! let factory = AccessLogFactory::with_options(AccessLogOpt::parse()).unwrap();
//!
//! // After a response has been sent:
//! factory.create(provider).log().await;
//! # }
//! ```
//!
//! Configuration problems are reported through the factory's status manager;
//! passing `--access-log-debug` streams them to the console as they occur.

mod access_log;
mod adapter;
pub mod appender;
pub mod configuration;
mod context;
mod event;
mod factory;
mod filter;
mod format;
mod provider;
#[cfg(unix)]
mod signal;
mod status;
#[cfg(test)]
mod test_util;
mod writer;

pub use access_log::{AccessLog, DispatchOutcome};
pub use adapter::ServerAdapter;
pub use appender::{AppendError, Appender};
pub use configuration::{AccessLogConf, AccessLogOpt, LogField};
pub use context::{AccessContext, BasicSequenceNumberGenerator, SequenceNumberGenerator};
pub use event::{AccessEvent, DeferredAccessEvent};
pub use factory::{
    AccessLogFactory, ConfigError, CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE_NAME,
};
pub use filter::{Filter, FilterReply};
pub use format::render_line;
pub use provider::{ConnectionInfo, CookieIter, HeaderIter, LogArgProvider, PeerAddr};
pub use status::{OnConsoleStatusListener, Status, StatusLevel, StatusListener, StatusManager};

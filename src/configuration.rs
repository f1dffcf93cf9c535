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

//! Structures handling command line options and YAML deserialization

use clap::Parser;
use http::HeaderName;
use serde::Deserialize;
use std::path::PathBuf;

/// Command line options of the access log module
#[derive(Debug, Default, Parser)]
pub struct AccessLogOpt {
    /// Access log configuration file path
    ///
    /// When given, the file has to exist; the usual resolution via the
    /// ACCESS_LOG_CONFIG environment variable and the default file name is
    /// skipped.
    #[arg(long)]
    pub access_log_config: Option<PathBuf>,

    /// Print access log configuration diagnostics to the console
    #[arg(long)]
    pub access_log_debug: bool,
}

/// An individual log field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogField {
    /// Skipped field, `-` in config file
    None,
    /// Client IP address, `remote_addr` in config file
    RemoteAddr,
    /// Client host string, `remote_host` in config file
    RemoteHost,
    /// Server-side port, `local_port` in config file
    LocalPort,
    /// Authenticated user, `remote_user` in config file
    RemoteUser,
    /// Local time in the Common Log Format, `time_local` in config file
    TimeLocal,
    /// Local time in the ISO 8601 format, `time_iso8601` in config file
    TimeISO,
    /// Request line like `"GET / HTTP/1.1"`, `request` in config file
    Request,
    /// Numeric response status code, `status` in config file
    Status,
    /// Number of bytes sent as response, `bytes_sent` in config file
    BytesSent,
    /// Time it took to process the request, `processing_time` in config file
    ProcessingTime,
    /// Raw query string including the leading `?`, `query_string` in config
    /// file
    QueryString,
    /// Event sequence number, `sequence_number` in config file
    SequenceNumber,
    /// Name of the dispatching thread, `thread_name` in config file
    ThreadName,
    /// A request header, `http_<header>` in config file
    RequestHeader(HeaderName),
    /// A response header, `sent_http_<header>` in config file
    ResponseHeader(HeaderName),
    /// A request cookie, `cookie_<name>` in config file
    Cookie(String),
}

impl TryFrom<&str> for LogField {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "-" => Ok(Self::None),
            "remote_addr" => Ok(Self::RemoteAddr),
            "remote_host" => Ok(Self::RemoteHost),
            "local_port" => Ok(Self::LocalPort),
            "remote_user" => Ok(Self::RemoteUser),
            "time_local" => Ok(Self::TimeLocal),
            "time_iso8601" => Ok(Self::TimeISO),
            "request" => Ok(Self::Request),
            "status" => Ok(Self::Status),
            "bytes_sent" => Ok(Self::BytesSent),
            "processing_time" => Ok(Self::ProcessingTime),
            "query_string" => Ok(Self::QueryString),
            "sequence_number" => Ok(Self::SequenceNumber),
            "thread_name" => Ok(Self::ThreadName),
            name => {
                if let Some(header) = name.strip_prefix("http_") {
                    let header = header.replace('_', "-");
                    Ok(Self::RequestHeader(
                        HeaderName::try_from(header).map_err(|err| err.to_string())?,
                    ))
                } else if let Some(header) = name.strip_prefix("sent_http_") {
                    let header = header.replace('_', "-");
                    Ok(Self::ResponseHeader(
                        HeaderName::try_from(header).map_err(|err| err.to_string())?,
                    ))
                } else if let Some(cookie) = name.strip_prefix("cookie_") {
                    Ok(Self::Cookie(cookie.to_owned()))
                } else {
                    Err(format!("Unsupported log field {name}"))
                }
            }
        }
    }
}

impl TryFrom<String> for LogField {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

/// The default log format, the Common Log Format:
///
/// ```yaml
/// [remote_addr, -, remote_user, time_local, request, status, bytes_sent]
/// ```
pub fn default_log_format() -> Vec<LogField> {
    vec![
        LogField::RemoteAddr,
        LogField::None,
        LogField::RemoteUser,
        LogField::TimeLocal,
        LogField::Request,
        LogField::Status,
        LogField::BytesSent,
    ]
}

/// Kind of a configured appender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppenderKind {
    /// Formatted lines to standard output
    Console,
    /// Formatted lines to a log file
    File,
    /// One JSON object per event to a file (or standard output for `-`)
    Json,
}

/// Configuration settings of a single appender
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppenderConf {
    /// Appender name, used for lookups and diagnostics
    pub name: String,
    /// What the appender writes and where
    pub kind: AppenderKind,
    /// Log file path for `file` and `json` appenders
    ///
    /// Special value - (also the default) writes to standard output.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// List of fields to be logged by `console` and `file` appenders
    ///
    /// See [`LogField`] for the supported values. Empty means the Common Log
    /// Format default.
    #[serde(default)]
    pub log_format: Vec<LogField>,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("-")
}

/// Configuration settings of the access log module
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessLogConf {
    /// Appenders receiving each logged event, invoked in the order listed
    pub appenders: Vec<AppenderConf>,
    /// Whether to assign sequence numbers to events
    pub sequence_numbers: bool,
}

impl AccessLogConf {
    /// Parses a configuration from YAML text.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }
}

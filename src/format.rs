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

//! Renders access events into log lines

use chrono::{DateTime, Local};
use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::configuration::LogField;
use crate::event::{AccessEvent, NA};

fn write_escaped(buf: &mut Vec<u8>, data: impl AsRef<[u8]>) {
    fn is_allowed(byte: u8) -> bool {
        (b' '..=b'~').contains(&byte) && byte != b'"' && byte != b'\\'
    }

    buf.push(b'"');
    for byte in data.as_ref() {
        if is_allowed(*byte) {
            buf.push(*byte);
        } else {
            let _ = write!(buf, "\\x{byte:02x}");
        }
    }
    buf.push(b'"');
}

fn event_time(event: &AccessEvent<'_>) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(event.timestamp().max(0) as u64)
}

/// Renders one event into `buf` according to `format`, one space-separated
/// field per entry, terminated by a newline. The buffer is cleared first.
pub fn render_line(buf: &mut Vec<u8>, format: &[LogField], event: &AccessEvent<'_>) {
    buf.truncate(0);

    for field in format {
        if !buf.is_empty() {
            let _ = write!(buf, " ");
        }
        let _ = match field {
            LogField::None => write!(buf, "{NA}"),
            LogField::RemoteAddr => write!(buf, "{}", event.remote_addr()),
            LogField::RemoteHost => write!(buf, "{}", event.remote_host()),
            LogField::LocalPort => {
                let port = event.local_port();
                if port < 0 {
                    write!(buf, "{NA}")
                } else {
                    write!(buf, "{port}")
                }
            }
            LogField::RemoteUser => write!(buf, "{}", event.remote_user()),
            LogField::TimeLocal => {
                let time = DateTime::<Local>::from(event_time(event)).format("%d/%b/%Y:%H:%M:%S %z");
                write!(buf, "[{time}]")
            }
            LogField::TimeISO => {
                let time = DateTime::<Local>::from(event_time(event)).to_rfc3339();
                write!(buf, "[{time}]")
            }
            LogField::Request => {
                write_escaped(buf, event.request_url());
                Ok(())
            }
            LogField::Status => {
                let status = event.status_code();
                if status < 0 {
                    write!(buf, "{NA}")
                } else {
                    write!(buf, "{status}")
                }
            }
            LogField::BytesSent => {
                let bytes = event.content_length();
                if bytes < 0 {
                    write!(buf, "{NA}")
                } else {
                    write!(buf, "{bytes}")
                }
            }
            LogField::ProcessingTime => write!(buf, "{}", event.elapsed_time()),
            LogField::QueryString => {
                let query = event.query_string();
                if query.is_empty() {
                    write!(buf, "{NA}")
                } else {
                    write!(buf, "{query}")
                }
            }
            LogField::SequenceNumber => write!(buf, "{}", event.sequence_number()),
            LogField::ThreadName => {
                write_escaped(buf, event.thread_name());
                Ok(())
            }
            LogField::RequestHeader(name) => {
                match event.request_header_map().get(name.as_str()) {
                    Some(value) => write_escaped(buf, value),
                    None => buf.push(b'-'),
                }
                Ok(())
            }
            LogField::ResponseHeader(name) => {
                match event.response_header_map().get(name.as_str()) {
                    Some(value) => write_escaped(buf, value),
                    None => buf.push(b'-'),
                }
                Ok(())
            }
            LogField::Cookie(name) => {
                let value = event.cookie(name);
                if value == NA {
                    buf.push(b'-');
                } else {
                    write_escaped(buf, value);
                }
                Ok(())
            }
        };
    }
    let _ = writeln!(buf);
}

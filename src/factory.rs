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

//! Configuration resolution and per-request handle creation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::access_log::AccessLog;
use crate::appender::build_appender;
use crate::configuration::{AccessLogConf, AccessLogOpt};
use crate::context::{AccessContext, BasicSequenceNumberGenerator};
use crate::provider::LogArgProvider;
use crate::status::{OnConsoleStatusListener, Status};

/// Environment variable naming an explicit configuration file. When set, the
/// file has to exist, a missing file is a hard error.
pub const CONFIG_FILE_ENV: &str = "ACCESS_LOG_CONFIG";

/// File looked up in the working directory when no explicit configuration is
/// given. Missing is fine, the built-in default applies then.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "access-log.yaml";

const DEFAULT_CONFIGURATION: &str = include_str!("default-config.yaml");
const ORIGIN: &str = "AccessLogFactory";

/// Errors produced while resolving and applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file {path} not found")]
    NotFound {
        /// The requested path.
        path: PathBuf,
    },
    /// Reading a configuration or log file failed.
    #[error("failed reading {path}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid YAML for this module.
    #[error("failed parsing {path}")]
    Parse {
        /// The offending path.
        path: PathBuf,
        /// The underlying deserialization error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Builds one configured [`AccessContext`] and hands out per-request
/// [`AccessLog`] dispatch handles for it.
///
/// Configuration is resolved once at construction: an explicit path beats the
/// `ACCESS_LOG_CONFIG` environment variable, which beats `access-log.yaml` in
/// the working directory, which beats the built-in console default. Only
/// explicitly named files are required to exist.
#[derive(Debug, Clone)]
pub struct AccessLogFactory {
    context: Arc<AccessContext>,
}

impl AccessLogFactory {
    /// A factory configured from the environment, without debug output.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_options(AccessLogOpt::default())
    }

    /// A factory configured from the given file, ignoring the environment.
    pub fn from_file(path: impl Into<PathBuf>, debug: bool) -> Result<Self, ConfigError> {
        Self::with_options(AccessLogOpt {
            access_log_config: Some(path.into()),
            access_log_debug: debug,
        })
    }

    /// A factory configured from command line options.
    pub fn with_options(opt: AccessLogOpt) -> Result<Self, ConfigError> {
        let context = Arc::new(AccessContext::new());

        if opt.access_log_debug {
            // Attach early so that statuses stream to the console as they
            // are recorded.
            context
                .status_manager()
                .add_listener(Box::new(OnConsoleStatusListener));
        }

        let result = initialize(&context, opt.access_log_config.as_deref());

        if !opt.access_log_debug {
            context.status_manager().print_in_case_of_errors_or_warnings();
        }
        result?;

        Ok(Self { context })
    }

    /// The context backing every handle this factory creates.
    pub fn context(&self) -> &Arc<AccessContext> {
        &self.context
    }

    /// A dispatch handle for one finished request.
    pub fn create<'a>(&self, provider: &'a dyn LogArgProvider) -> AccessLog<'a> {
        AccessLog::new(Arc::clone(&self.context), provider)
    }
}

fn initialize(context: &AccessContext, explicit: Option<&Path>) -> Result<(), ConfigError> {
    let statuses = context.status_manager();

    let resolved = resolve_config(explicit).map_err(|err| {
        statuses.add(Status::error_with(
            "Failed resolving configuration",
            ORIGIN,
            &err,
        ));
        err
    })?;

    let (conf, name) = match resolved {
        Some((path, contents)) => {
            statuses.add(Status::info(
                format!("Configuring from file [{}]", path.display()),
                ORIGIN,
            ));
            let conf = AccessLogConf::from_yaml(&contents).map_err(|err| {
                statuses.add(Status::error_with(
                    format!("Failed parsing configuration file [{}]", path.display()),
                    ORIGIN,
                    &err,
                ));
                ConfigError::Parse { path: path.clone(), source: err }
            })?;
            (conf, path.display().to_string())
        }
        None => {
            statuses.add(Status::info(
                "No configuration file found, using the built-in default",
                ORIGIN,
            ));
            let conf = AccessLogConf::from_yaml(DEFAULT_CONFIGURATION)
                .unwrap_or_else(|_| unreachable!("built-in configuration is valid"));
            (conf, "<built-in>".to_owned())
        }
    };

    context.set_name(&name);

    for appender_conf in &conf.appenders {
        match build_appender(appender_conf) {
            Ok(appender) => context.add_appender(appender),
            Err(err) => {
                statuses.add(Status::error_with(
                    format!("Failed setting up appender [{}]", appender_conf.name),
                    ORIGIN,
                    &err,
                ));
                return Err(err);
            }
        }
    }

    if conf.sequence_numbers {
        context.set_sequence_number_generator(Arc::new(BasicSequenceNumberGenerator::default()));
    }

    context.start();
    statuses.add(Status::info(
        format!("Done configuring [{name}]"),
        ORIGIN,
    ));
    Ok(())
}

/// Resolves the configuration source. `Ok(None)` means no file applies and
/// the built-in default should be used.
fn resolve_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, String)>, ConfigError> {
    if let Some(path) = explicit {
        return read_required(path).map(Some);
    }

    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        return read_required(Path::new(&path)).map(Some);
    }

    let path = PathBuf::from(DEFAULT_CONFIG_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some((path, contents))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ConfigError::Io { path, source: err }),
    }
}

fn read_required(path: &Path) -> Result<(PathBuf, String), ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok((path.to_path_buf(), contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

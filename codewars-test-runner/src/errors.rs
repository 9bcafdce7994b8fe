// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{LOG_ENV, NO_HEADING_TARGET, StderrStyles};
use codewars_metadata::RunnerExitCode;
use codewars_runner::errors::{ConfigParseError, ConfigParseErrorKind, DriverError};
use owo_colors::OwoColorize;
use std::{error::Error, ffi::OsString, path::PathBuf};
use thiserror::Error;
use tracing::error;

// The #[error()] strings are placeholders: errors are meant to be printed with display_to_stderr,
// which colorizes them and prints their causes.

/// An error that prevented the test run from completing.
#[derive(Debug, Error)]
pub(crate) enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDir {
        #[source]
        error: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirNonUtf8 { path: PathBuf },
    #[error("invalid log filter")]
    LogFilterParse {
        value: String,
        #[source]
        err: tracing_subscriber::filter::ParseError,
    },
    #[error("log filter is not valid UTF-8")]
    LogFilterNonUtf8 { value: OsString },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("test run error")]
    DriverError {
        #[from]
        err: DriverError,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub(crate) fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDir { .. }
            | Self::CurrentDirNonUtf8 { .. }
            | Self::LogFilterParse { .. }
            | Self::LogFilterNonUtf8 { .. }
            | Self::ConfigParseError { .. } => RunnerExitCode::SETUP_ERROR,
            Self::DriverError { err } => match err {
                DriverError::WriteOutput(_) => RunnerExitCode::WRITE_OUTPUT_ERROR,
                _ => RunnerExitCode::SETUP_ERROR,
            },
        }
    }

    /// Displays this error to stderr, along with its chain of causes.
    pub(crate) fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDir { error } => {
                error!("could not determine the current directory");
                Some(error as &dyn Error)
            }
            Self::CurrentDirNonUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::LogFilterParse { value, err } => {
                error!("invalid {LOG_ENV} value `{}`", value.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::LogFilterNonUtf8 { value } => {
                error!(
                    "{LOG_ENV} value `{}` is not valid UTF-8",
                    value.to_string_lossy().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                let config_file = err.config_file().style(styles.bold);
                match err.kind() {
                    ConfigParseErrorKind::DeserializeError(error) => {
                        error!(
                            "failed to parse config file `{config_file}` at `{}`",
                            error.path().style(styles.bold)
                        );
                        Some(error.inner() as &dyn Error)
                    }
                    other => {
                        error!("failed to parse config file `{config_file}`");
                        Some(other as &dyn Error)
                    }
                }
            }
            Self::DriverError { err } => {
                match err {
                    DriverError::LoadingContext(_) => {
                        error!("failed to set up the loading context for tests");
                    }
                    DriverError::Engine(_) => error!("failed to execute tests"),
                    DriverError::WriteOutput(_) => error!("failed to write test output"),
                    other => error!("{other}"),
                }
                err.source()
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by codewars-runner.

use crate::helpers::dylib_path_envvar;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{borrow::Cow, env::JoinPathsError, process::ExitStatus};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse codewars-runner config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurs while parsing a
/// [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for test-threads: {input}")]
pub struct TestThreadsParseError {
    /// The input that failed to parse.
    pub input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while building a
/// [`LoadingContext`](crate::loading_context::LoadingContext).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadingContextError {
    /// A path entry could not be resolved.
    #[error("invalid path entry: `{entry}`")]
    InvalidEntry {
        /// The entry that could not be resolved.
        entry: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The staging directory for archives could not be created.
    #[error("error creating staging directory for archives")]
    CreateStagingDir(#[source] std::io::Error),

    /// An archive could not be staged.
    #[error("error staging archive `{archive}` into `{staging_dir}`")]
    StageArchive {
        /// The archive being staged.
        archive: Utf8PathBuf,

        /// The staging directory.
        staging_dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The dynamic library search path could not be assembled.
    #[error(
        "error joining dynamic library paths for {}: [{}]",
        dylib_path_envvar(),
        itertools::join(.new_paths, ", ")
    )]
    DylibJoinPaths {
        /// New paths attempted to be added to the dynamic library environment variable.
        new_paths: Vec<Utf8PathBuf>,

        /// The underlying error.
        #[source]
        error: JoinPathsError,
    },
}

/// An error that prevented an engine from running the test plan at all.
///
/// Problems with individual test binaries are not engine errors: they are reported as crashed
/// containers so that the rest of the run can continue.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The async runtime could not be created.
    #[error("error creating async runtime")]
    RuntimeBuild(#[source] std::io::Error),

    /// A discovery root could not be read.
    #[error("error reading discovery root `{root}`")]
    ReadRoot {
        /// The root that could not be read.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while listing the tests within a test binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ListTestsError {
    /// Running the list command failed.
    #[error("for `{binary}`, running command `{}` failed", .command.join(" "))]
    CommandExecFail {
        /// The binary being listed.
        binary: Utf8PathBuf,

        /// The command that was run.
        command: Vec<String>,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The list command exited with a failure.
    #[error("for `{binary}`, command `{}` exited with {exit_status}", .command.join(" "))]
    CommandFail {
        /// The binary being listed.
        binary: Utf8PathBuf,

        /// The command that was run.
        command: Vec<String>,

        /// The exit status of the command.
        exit_status: ExitStatus,

        /// Standard output produced by the command.
        stdout: Vec<u8>,

        /// Standard error produced by the command.
        stderr: Vec<u8>,
    },

    /// The list command produced output that was not valid UTF-8.
    #[error("for `{binary}`, command `{}` produced non-UTF-8 output", .command.join(" "))]
    CommandNonUtf8 {
        /// The binary being listed.
        binary: Utf8PathBuf,

        /// The command that was run.
        command: Vec<String>,

        /// Standard output produced by the command.
        stdout: Vec<u8>,

        /// Standard error produced by the command.
        stderr: Vec<u8>,
    },

    /// A line in the list output could not be parsed.
    #[error("for `{binary}`, {message}")]
    ParseLine {
        /// The binary being listed.
        binary: Utf8PathBuf,

        /// A descriptive message.
        message: Cow<'static, str>,

        /// The full output.
        full_output: String,
    },
}

impl ListTestsError {
    pub(crate) fn parse_line(
        binary: impl Into<Utf8PathBuf>,
        message: impl Into<Cow<'static, str>>,
        full_output: impl Into<String>,
    ) -> Self {
        Self::ParseLine {
            binary: binary.into(),
            message: message.into(),
            full_output: full_output.into(),
        }
    }

    /// Returns the diagnostic output associated with this error, if any.
    ///
    /// For a failing command this is its standard error, or its standard output if nothing was
    /// written to standard error.
    pub fn diagnostic_output(&self) -> Option<String> {
        match self {
            Self::CommandExecFail { .. } => None,
            Self::CommandFail { stdout, stderr, .. } | Self::CommandNonUtf8 { stdout, stderr, .. } => {
                let output = if stderr.is_empty() { stdout } else { stderr };
                (!output.is_empty()).then(|| String::from_utf8_lossy(output).into_owned())
            }
            Self::ParseLine { full_output, .. } => Some(full_output.clone()),
        }
    }
}

/// An error that occurred while driving a test run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The loading context could not be created.
    #[error("error creating loading context")]
    LoadingContext(#[from] LoadingContextError),

    /// The engine could not run the test plan.
    #[error("error executing tests")]
    Engine(#[from] EngineError),

    /// Writing protocol output failed.
    #[error("error writing test output")]
    WriteOutput(#[source] std::io::Error),
}

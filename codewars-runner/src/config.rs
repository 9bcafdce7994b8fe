// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for codewars-runner.
//!
//! Configuration is read from, in increasing order of precedence:
//!
//! 1. the defaults in `default-config.toml`, embedded in the binary
//! 2. the file passed in explicitly, or `.config/codewars-runner.toml` in the current directory
//!    if it exists
//!
//! The CLI may then override individual values.

mod test_threads;

pub use test_threads::*;

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{
    Config, ConfigBuilder, ConfigError, File, FileFormat, FileSourceFile, builder::DefaultState,
};
use serde::Deserialize;
use std::{collections::BTreeSet, sync::LazyLock};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for a test run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunnerConfig {
    test_threads: TestThreads,
    report_stdout: bool,
    archive_suffixes: Vec<String>,
}

impl RunnerConfig {
    /// The default location of the config within the current directory.
    pub const CONFIG_PATH: &'static str = ".config/codewars-runner.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or from [`Self::CONFIG_PATH`] within `cwd` if no
    /// file is given.
    ///
    /// An explicitly given file must exist. Unknown keys are logged and otherwise ignored.
    pub fn from_sources(
        cwd: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = cwd.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        Self::read_from_source(&config_file, source)
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        let (config, _unknown) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        config.into_config()
    }

    /// Returns the number of tests to run at the same time.
    pub fn test_threads(&self) -> TestThreads {
        self.test_threads
    }

    /// Overrides the number of tests to run at the same time.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) {
        self.test_threads = test_threads;
    }

    /// Returns true if the output of passing tests should be published as report entries.
    pub fn report_stdout(&self) -> bool {
        self.report_stdout
    }

    /// Returns true if `file_name` ends with one of the archive suffixes.
    pub fn is_archive(&self, file_name: &str) -> bool {
        self.archive_suffixes
            .iter()
            .any(|suffix| file_name.ends_with(suffix.as_str()))
    }

    // ---
    // Helper methods
    // ---

    fn read_from_source(
        config_file: &Utf8PathBuf,
        source: File<FileSourceFile, FileFormat>,
    ) -> Result<Self, ConfigParseError> {
        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;

        if !unknown.is_empty() {
            warn_unknown_config_keys(config_file, &unknown);
        }

        Ok(config.into_config())
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(RunnerConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: RunnerConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

fn warn_unknown_config_keys(config_file: &Utf8Path, unknown: &BTreeSet<String>) {
    let mut unknown_str = String::new();
    if unknown.len() == 1 {
        // Print this on the same line.
        unknown_str.push_str("key: ");
        unknown_str.extend(unknown.iter().map(String::as_str));
    } else {
        unknown_str.push_str("keys:\n");
        for ignored_key in unknown {
            unknown_str.push('\n');
            unknown_str.push_str("  - ");
            unknown_str.push_str(ignored_key);
        }
    }

    warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigDeserialize {
    run: RunConfigDeserialize,
    loading: LoadingConfigDeserialize,
}

impl RunnerConfigDeserialize {
    fn into_config(self) -> RunnerConfig {
        RunnerConfig {
            test_threads: self.run.test_threads,
            report_stdout: self.run.report_stdout,
            archive_suffixes: self.loading.archive_suffixes,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunConfigDeserialize {
    test_threads: TestThreads,
    report_stdout: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LoadingConfigDeserialize {
    archive_suffixes: Vec<String>,
}

// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ExpectedError,
    halt::halt,
    output::{OutputOpts, clap_styles},
};
use camino::Utf8PathBuf;
use clap::Parser;
use codewars_metadata::RunnerExitCode;
use codewars_runner::{
    config::{RunnerConfig, TestThreads},
    driver::{AMBIENT_PATH_ENV, ExecutionDriver},
    engine::LibtestEngine,
};
use std::io::BufWriter;
use tracing::{debug, warn};

/// Runs Rust test binaries and reports results in the Codewars protocol.
///
/// Protocol markers are written to standard output. Logs are written to standard error.
#[derive(Debug, Parser)]
#[command(
    name = "codewars-test-runner",
    version,
    styles = clap_styles::style(),
)]
pub struct CodewarsRunnerApp {
    /// Paths to search, separated by `:` (`;` on Windows)
    ///
    /// Directories are scanned for test binaries. An entry of the form `dir/*` stands for the
    /// dynamic libraries directly within `dir`, which are made available to test processes.
    #[arg(value_name = "PATH_LIST")]
    path_list: String,

    /// Config file [default: .config/codewars-runner.toml in the current directory]
    #[arg(long, value_name = "PATH", env = "CODEWARS_RUNNER_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Number of tests to run at the same time [possible values: integer or "num-cpus"]
    #[arg(
        long,
        value_name = "THREADS",
        env = "CODEWARS_TEST_THREADS",
        allow_negative_numbers = true
    )]
    test_threads: Option<TestThreads>,

    #[command(flatten)]
    output: OutputOpts,
}

impl CodewarsRunnerApp {
    fn exec(self) -> Result<i32, ExpectedError> {
        let cwd = current_dir()?;
        let mut config = RunnerConfig::from_sources(&cwd, self.config.as_deref())?;
        if let Some(test_threads) = self.test_threads {
            config.set_test_threads(test_threads);
        }

        let ambient_path = match std::env::var(AMBIENT_PATH_ENV) {
            Ok(ambient_path) => Some(ambient_path),
            Err(std::env::VarError::NotPresent) => None,
            Err(std::env::VarError::NotUnicode(_)) => {
                warn!("ignoring {AMBIENT_PATH_ENV}: not valid UTF-8");
                None
            }
        };

        let driver = ExecutionDriver::new(&self.path_list, ambient_path.as_deref(), &config);
        let engine = LibtestEngine::new(&config);
        let summary = driver.execute(&engine, BufWriter::new(std::io::stdout()))?;

        let status = summary.status();
        debug!(
            "{} tests, {} failures: {status:?}",
            summary.test_count, summary.failures
        );
        Ok(status.exit_code())
    }
}

fn current_dir() -> Result<Utf8PathBuf, ExpectedError> {
    let cwd = std::env::current_dir().map_err(|error| ExpectedError::CurrentDir { error })?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| ExpectedError::CurrentDirNonUtf8 { path })
}

/// Runs codewars-test-runner with the process arguments, then terminates the process.
///
/// The process is halted rather than exited: nothing left behind by test code gets to run.
pub fn main_impl() -> ! {
    let app = match CodewarsRunnerApp::try_parse() {
        Ok(app) => app,
        Err(err) => {
            let _ = err.print();
            // Help and version requests are not errors.
            let code = if err.use_stderr() {
                RunnerExitCode::USAGE_ERROR
            } else {
                RunnerExitCode::OK
            };
            halt(code);
        }
    };

    let output = match app.output.init() {
        Ok(output) => output,
        Err(error) => {
            error.display_to_stderr(&app.output.context().stderr_styles());
            halt(error.process_exit_code());
        }
    };
    let code = match app.exec() {
        Ok(code) => code,
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            error.process_exit_code()
        }
    };
    halt(code)
}

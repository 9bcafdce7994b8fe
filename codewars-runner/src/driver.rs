// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives a single test run from a path list to a [`RunSummary`].

use crate::{
    config::RunnerConfig,
    engine::{DiscoveryRequest, TestEngine},
    errors::DriverError,
    helpers::split_path_list,
    loading_context::{LoadingContext, with_loading_context},
    reporter::CodewarsReporter,
};
use camino::{Utf8Path, Utf8PathBuf};
use codewars_metadata::RunnerExitCode;
use itertools::Itertools;
use std::io::Write;
use tracing::{debug, error};

/// The environment variable holding directories that are always searched for tests, in addition
/// to the directories on the command line.
pub const AMBIENT_PATH_ENV: &str = "CODEWARS_TEST_PATH";

/// Expands a path list and runs the tests it refers to.
#[derive(Clone, Debug)]
pub struct ExecutionDriver {
    entries: Vec<Utf8PathBuf>,
    roots: Vec<Utf8PathBuf>,
}

impl ExecutionDriver {
    /// Creates a new driver.
    ///
    /// `path_list` and `ambient_path` are lists of paths separated by the platform path separator.
    /// An entry of `path_list` ending with `*` stands for the archives directly within that
    /// directory.
    pub fn new(path_list: &str, ambient_path: Option<&str>, config: &RunnerConfig) -> Self {
        let entries: Vec<_> = split_path_list(path_list)
            .flat_map(|entry| expand_entry(entry, config))
            .collect();

        let ambient_roots = ambient_path
            .into_iter()
            .flat_map(split_path_list)
            .map(Utf8PathBuf::from);
        let roots = ambient_roots
            .chain(entries.iter().cloned())
            .filter(|root| root.is_dir())
            .unique()
            .collect();

        let this = Self { entries, roots };
        debug!("path entries: {:?}, discovery roots: {:?}", this.entries, this.roots);
        this
    }

    /// Returns the expanded path entries, in order.
    pub fn entries(&self) -> &[Utf8PathBuf] {
        &self.entries
    }

    /// Returns the directories scanned for tests, in order.
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }

    /// Returns the discovery request passed to the engine.
    pub fn discovery_request(&self) -> DiscoveryRequest {
        DiscoveryRequest::new(self.roots.clone())
    }

    /// Runs `engine`, writing protocol output to `output`.
    ///
    /// The loading context built from the path entries is installed for the duration of the
    /// engine call and closed afterwards.
    pub fn execute<W: Write + Send>(
        &self,
        engine: &dyn TestEngine,
        output: W,
    ) -> Result<RunSummary, DriverError> {
        let existing: Vec<_> = self.entries.iter().filter(|entry| entry.exists()).collect();
        let context = if existing.is_empty() {
            None
        } else {
            Some(LoadingContext::new(existing)?)
        };

        let reporter = CodewarsReporter::new(output);
        let request = self.discovery_request();
        debug!("executing engine `{}`", engine.id());
        with_loading_context(context, || engine.execute(&request, &reporter))?;

        let summary = RunSummary {
            test_count: reporter.test_count(),
            failures: reporter.failures(),
        };
        reporter.finish().map_err(DriverError::WriteOutput)?;
        debug!(
            "run finished: {} tests, {} failures",
            summary.test_count, summary.failures
        );
        Ok(summary)
    }
}

/// Counts gathered over a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// The number of leaf tests that started.
    pub test_count: usize,

    /// The number of failed or aborted tests plus the number of crashed containers.
    pub failures: usize,
}

impl RunSummary {
    /// Classifies the run.
    pub fn status(&self) -> RunStatus {
        if self.test_count == 0 {
            RunStatus::NoTests
        } else if self.failures > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        }
    }
}

/// The overall result of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunStatus {
    /// Every test that ran passed.
    Passed,

    /// At least one test failed or a container crashed.
    Failed,

    /// No tests ran.
    NoTests,
}

impl RunStatus {
    /// Returns the process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Passed => RunnerExitCode::OK,
            Self::Failed => RunnerExitCode::TEST_RUN_FAILED,
            Self::NoTests => RunnerExitCode::NO_TESTS_FOUND,
        }
    }
}

fn expand_entry(entry: &str, config: &RunnerConfig) -> Vec<Utf8PathBuf> {
    let Some(base) = entry.strip_suffix('*') else {
        return vec![Utf8PathBuf::from(entry)];
    };
    // A bare `*` names no directory.
    let base = Utf8Path::new(base);
    if base.as_str().is_empty() || !base.is_dir() {
        debug!("wildcard entry `{entry}` does not refer to a directory");
        return Vec::new();
    }

    let read_dir = match base.read_dir_utf8() {
        Ok(read_dir) => read_dir,
        Err(err) => {
            error!("error listing wildcard entry `{entry}`: {err}");
            return Vec::new();
        }
    };

    let mut archives = Vec::new();
    for dir_entry in read_dir {
        let dir_entry = match dir_entry {
            Ok(dir_entry) => dir_entry,
            Err(err) => {
                error!("error listing wildcard entry `{entry}`: {err}");
                return Vec::new();
            }
        };
        let file_name = dir_entry.file_name();
        if config.is_archive(file_name) && dir_entry.path().is_file() {
            archives.push(base.join(file_name));
        }
    }
    archives.sort_unstable();
    archives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::EngineError,
        helpers::PATH_LIST_SEPARATOR,
        plan::{NodeId, NodeKind, TestPlan},
        reporter::{ExecutionListener, ExecutionOutcome, FailureCause},
    };
    use camino_tempfile::{Utf8TempDir, tempdir};
    use pretty_assertions::assert_eq;
    use std::{ffi::OsString, io, sync::Mutex};

    /// An engine that emits a fixed plan: one suite with the given tests.
    struct ScriptedEngine {
        tests: Vec<(&'static str, ExecutionOutcome)>,
        seen_dylib_path: Mutex<Option<Option<OsString>>>,
    }

    impl ScriptedEngine {
        fn new(tests: Vec<(&'static str, ExecutionOutcome)>) -> Self {
            Self {
                tests,
                seen_dylib_path: Mutex::new(None),
            }
        }
    }

    impl TestEngine for ScriptedEngine {
        fn id(&self) -> &str {
            "scripted"
        }

        fn execute(
            &self,
            _request: &DiscoveryRequest,
            listener: &dyn ExecutionListener,
        ) -> Result<(), EngineError> {
            *self.seen_dylib_path.lock().unwrap() = Some(LoadingContext::current_dylib_path());

            let mut plan = TestPlan::new(self.id());
            if self.tests.is_empty() {
                listener.plan_execution_started(&plan);
                listener.plan_execution_finished(&plan);
                return Ok(());
            }

            let suite = plan.add_node(NodeId::ROOT, NodeKind::Container, "suite", "Suite", "Suite");
            let tests: Vec<_> = self
                .tests
                .iter()
                .map(|(name, outcome)| {
                    (plan.add_node(suite, NodeKind::Leaf, "test", name, *name), outcome)
                })
                .collect();

            listener.plan_execution_started(&plan);
            listener.execution_started(plan.root());
            listener.execution_started(plan.node(suite));
            for (id, outcome) in tests {
                listener.execution_started(plan.node(id));
                listener.execution_finished(plan.node(id), outcome);
            }
            listener.execution_finished(plan.node(suite), &ExecutionOutcome::Successful);
            listener.execution_finished(plan.root(), &ExecutionOutcome::Successful);
            listener.plan_execution_finished(&plan);
            Ok(())
        }
    }

    struct FailingEngine;

    impl TestEngine for FailingEngine {
        fn id(&self) -> &str {
            "failing"
        }

        fn execute(
            &self,
            _request: &DiscoveryRequest,
            _listener: &dyn ExecutionListener,
        ) -> Result<(), EngineError> {
            assert!(LoadingContext::is_installed());
            Err(EngineError::RuntimeBuild(io::Error::other("no threads")))
        }
    }

    fn run(engine: &dyn TestEngine, path_list: &str) -> (RunSummary, String) {
        let driver = ExecutionDriver::new(path_list, None, &RunnerConfig::default_config());
        let mut output = Vec::new();
        let summary = driver.execute(engine, &mut output).unwrap();
        (summary, String::from_utf8(output).unwrap())
    }

    fn join_paths(paths: &[&Utf8Path]) -> String {
        paths.iter().join(&PATH_LIST_SEPARATOR.to_string())
    }

    fn archive_dir() -> Utf8TempDir {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::create_dir(dir.path().join("lib/nested.so")).unwrap();
        for name in ["libb.so", "liba.dylib", "notes.txt", "liba.dll"] {
            std::fs::write(dir.path().join("lib").join(name), "").unwrap();
        }
        dir
    }

    #[test]
    fn single_passing_test() {
        let engine = ScriptedEngine::new(vec![("testAdd", ExecutionOutcome::Successful)]);
        let (summary, output) = run(&engine, "");

        assert_eq!(
            summary,
            RunSummary {
                test_count: 1,
                failures: 0
            }
        );
        assert_eq!(summary.status(), RunStatus::Passed);
        assert_eq!(summary.status().exit_code(), 0);
        let markers: Vec<_> = output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split_once('>').map_or(line, |(marker, _)| marker))
            .collect();
        assert_eq!(
            markers,
            vec![
                "<DESCRIBE::",
                "<IT::",
                "<PASSED::",
                "<COMPLETEDIN::",
                "<COMPLETEDIN::"
            ]
        );
        assert!(output.starts_with("\n<DESCRIBE::>Suite\n\n<IT::>testAdd\n\n<PASSED::>Test Passed\n"));
    }

    #[test]
    fn no_tests() {
        let engine = ScriptedEngine::new(Vec::new());
        let (summary, output) = run(&engine, "");

        assert_eq!(summary.failures, 0);
        assert_eq!(summary.status(), RunStatus::NoTests);
        assert_eq!(summary.status().exit_code(), 2);
        assert_eq!(output, "");
    }

    #[test]
    fn single_failing_test() {
        let engine = ScriptedEngine::new(vec![
            ("testAdd", ExecutionOutcome::Successful),
            (
                "testSub",
                ExecutionOutcome::failed(FailureCause::new(
                    Some("expected 2 got 3".to_owned()),
                    None,
                )),
            ),
        ]);
        let (summary, output) = run(&engine, "");

        assert_eq!(summary.status(), RunStatus::Failed);
        assert_eq!(summary.status().exit_code(), 1);
        assert!(
            output.contains("\n<FAILED::>expected 2 got 3\n"),
            "output: {output}"
        );
    }

    #[test]
    fn wildcard_expansion() {
        let dir = archive_dir();
        let lib = dir.path().join("lib");
        let config = RunnerConfig::default_config();

        assert_eq!(
            expand_entry(&format!("{lib}/*"), &config),
            vec![lib.join("liba.dll"), lib.join("liba.dylib"), lib.join("libb.so")],
        );
        assert_eq!(
            expand_entry(&format!("{}/*", dir.path().join("missing")), &config),
            Vec::<Utf8PathBuf>::new(),
        );
        assert_eq!(
            expand_entry(&format!("{}/*", lib.join("libb.so")), &config),
            Vec::<Utf8PathBuf>::new(),
            "a file is not a directory"
        );
        assert_eq!(expand_entry(lib.as_str(), &config), vec![lib.clone()]);
    }

    #[test]
    fn bare_wildcard_expands_to_nothing() {
        let config = RunnerConfig::default_config();
        assert_eq!(expand_entry("*", &config), Vec::<Utf8PathBuf>::new());

        let driver = ExecutionDriver::new("*", None, &config);
        assert!(driver.entries().is_empty());
        assert!(driver.roots().is_empty());
    }

    #[test]
    fn roots_are_directories_in_order() {
        let dir = archive_dir();
        let lib = dir.path().join("lib");
        let ambient = tempdir().unwrap();
        let missing = dir.path().join("missing");

        let path_list = join_paths(&[
            &lib,
            lib.join("libb.so").as_path(),
            &missing,
            ambient.path(),
            &lib,
        ]);
        let ambient_path = join_paths(&[ambient.path(), &missing]);
        let driver = ExecutionDriver::new(
            &path_list,
            Some(&ambient_path),
            &RunnerConfig::default_config(),
        );

        assert_eq!(
            driver.roots(),
            [ambient.path().to_owned(), lib.clone()],
            "ambient directories come first, then directory entries, without duplicates"
        );
        assert_eq!(driver.entries().len(), 5);
        assert_eq!(driver.discovery_request().roots(), driver.roots());
    }

    #[test]
    fn loading_context_is_scoped_to_engine() {
        let dir = archive_dir();
        let engine = ScriptedEngine::new(vec![("testAdd", ExecutionOutcome::Successful)]);
        let (summary, _) = run(&engine, &format!("{}/*", dir.path().join("lib")));

        assert_eq!(summary.status(), RunStatus::Passed);
        let seen = engine.seen_dylib_path.lock().unwrap().clone();
        assert!(
            matches!(seen, Some(Some(_))),
            "engine saw a loading context: {seen:?}"
        );
        assert!(!LoadingContext::is_installed(), "context removed after the run");
    }

    #[test]
    fn no_loading_context_without_existing_entries() {
        let dir = tempdir().unwrap();
        let engine = ScriptedEngine::new(vec![("testAdd", ExecutionOutcome::Successful)]);
        run(&engine, dir.path().join("missing").as_str());

        let seen = engine.seen_dylib_path.lock().unwrap().clone();
        assert_eq!(seen, Some(None));
    }

    #[test]
    fn engine_errors_are_propagated() {
        let dir = archive_dir();
        let driver = ExecutionDriver::new(
            dir.path().join("lib").as_str(),
            None,
            &RunnerConfig::default_config(),
        );
        let error = driver.execute(&FailingEngine, Vec::new()).unwrap_err();

        assert!(matches!(error, DriverError::Engine(_)), "{error:?}");
        assert!(!LoadingContext::is_installed());
    }

    #[test]
    fn write_errors_fail_the_run() {
        struct ClosedPipe;

        impl Write for ClosedPipe {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let engine = ScriptedEngine::new(vec![("testAdd", ExecutionOutcome::Successful)]);
        let driver = ExecutionDriver::new("", None, &RunnerConfig::default_config());
        let error = driver.execute(&engine, ClosedPipe).unwrap_err();
        assert!(matches!(error, DriverError::WriteOutput(_)), "{error:?}");
    }
}

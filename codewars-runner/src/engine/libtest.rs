// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An engine for test binaries built with the standard libtest harness.
//!
//! Discovery runs every binary in the roots with `--list`, and each test then runs in its own
//! process with `--exact <name>`.

use super::{DiscoveryRequest, TestEngine};
use crate::{
    config::RunnerConfig,
    errors::{EngineError, ListTestsError},
    helpers::{DisplayErrorChain, dylib_path_envvar, strip_cargo_hash},
    loading_context::LoadingContext,
    plan::{NodeId, NodeKind, TestNode, TestPlan},
    reporter::{ExecutionListener, ExecutionOutcome, FailureCause, ReportEntry},
};
use camino::{Utf8Path, Utf8PathBuf};
use futures::{FutureExt, StreamExt, future::BoxFuture};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, HashMap},
    ffi::{OsStr, OsString},
    fs::Metadata,
    process::{ExitStatus, Stdio},
};
use tokio::{process::Command, sync::Semaphore};
use tracing::debug;

/// Runs libtest test binaries found directly within the discovery roots.
#[derive(Clone, Debug)]
pub struct LibtestEngine {
    test_threads: usize,
    report_stdout: bool,
    config: RunnerConfig,
}

impl LibtestEngine {
    /// The identifier of this engine.
    pub const ID: &'static str = "libtest";

    /// Creates a new engine from the run configuration.
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            test_threads: config.test_threads().compute().max(1),
            report_stdout: config.report_stdout(),
            config: config.clone(),
        }
    }

    fn discover_binaries(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<Vec<Utf8PathBuf>, EngineError> {
        let mut binaries = Vec::new();
        for root in request.roots() {
            if !root.is_dir() {
                debug!("skipping discovery root `{root}`: not a directory");
                continue;
            }

            let read_root_error = |error: std::io::Error| EngineError::ReadRoot {
                root: root.clone(),
                error,
            };
            let mut found = Vec::new();
            for entry in root.read_dir_utf8().map_err(read_root_error)? {
                let path = entry.map_err(read_root_error)?.into_path();
                // Follow symlinks: staged binaries may be links.
                let Ok(metadata) = path.metadata() else {
                    debug!("skipping `{path}`: unable to read metadata");
                    continue;
                };
                if self.is_test_binary(&path, &metadata) {
                    found.push(path);
                }
            }
            found.sort_unstable();
            debug!("discovered {} test binaries in `{root}`", found.len());
            binaries.extend(found);
        }
        Ok(binaries)
    }

    fn is_test_binary(&self, path: &Utf8Path, metadata: &Metadata) -> bool {
        let Some(file_name) = path.file_name() else {
            return false;
        };
        metadata.is_file()
            && !file_name.starts_with('.')
            && !self.config.is_archive(file_name)
            && is_executable(path, metadata)
    }
}

impl TestEngine for LibtestEngine {
    fn id(&self) -> &str {
        Self::ID
    }

    fn execute(
        &self,
        request: &DiscoveryRequest,
        listener: &dyn ExecutionListener,
    ) -> Result<(), EngineError> {
        // The loading context is installed on this thread only, so read it before handing work
        // off to the runtime.
        let dylib_path = LoadingContext::current_dylib_path();
        let binaries = self.discover_binaries(request)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("codewars-runner-worker")
            .build()
            .map_err(EngineError::RuntimeBuild)?;

        let listings = runtime.block_on(list_binaries(
            binaries,
            dylib_path.as_deref(),
            self.test_threads,
        ));
        let plan = LibtestPlan::new(listings);
        debug!(
            "executing plan with {} tests across {} binaries",
            plan.plan.leaf_count(),
            plan.plan.children(NodeId::ROOT).len(),
        );

        listener.plan_execution_started(&plan.plan);
        let executor = Executor {
            plan: &plan,
            listener,
            semaphore: Semaphore::new(self.test_threads),
            test_threads: self.test_threads,
            report_stdout: self.report_stdout,
            dylib_path,
        };
        runtime.block_on(executor.execute_node(NodeId::ROOT));
        listener.plan_execution_finished(&plan.plan);

        // Test code may leave processes behind: don't wait for them.
        runtime.shutdown_background();
        Ok(())
    }
}

/// The tests in a binary, mapped to whether they're ignored.
type Listing = BTreeMap<String, bool>;

async fn list_binaries(
    binaries: Vec<Utf8PathBuf>,
    dylib_path: Option<&OsStr>,
    list_threads: usize,
) -> Vec<(Utf8PathBuf, Result<Listing, ListTestsError>)> {
    futures::stream::iter(binaries)
        .map(|binary| async move {
            let listing = list_binary(&binary, dylib_path).await;
            (binary, listing)
        })
        .buffered(list_threads)
        .collect()
        .await
}

async fn list_binary(
    binary: &Utf8Path,
    dylib_path: Option<&OsStr>,
) -> Result<Listing, ListTestsError> {
    let non_ignored = exec_list(binary, false, dylib_path).await?;
    let ignored = exec_list(binary, true, dylib_path).await?;

    let mut listing = Listing::new();
    for name in parse_list_output(binary, &non_ignored)? {
        listing.insert(name.to_owned(), false);
    }
    for name in parse_list_output(binary, &ignored)? {
        listing.insert(name.to_owned(), true);
    }
    debug!("listed {} tests in `{binary}`", listing.len());
    Ok(listing)
}

async fn exec_list(
    binary: &Utf8Path,
    ignored: bool,
    dylib_path: Option<&OsStr>,
) -> Result<String, ListTestsError> {
    let mut argv = vec!["--list", "--format", "terse"];
    if ignored {
        argv.push("--ignored");
    }
    let command = || {
        std::iter::once(binary.to_string())
            .chain(argv.iter().map(|&s| s.to_owned()))
            .collect::<Vec<_>>()
    };

    let mut cmd = make_command(binary, &argv, dylib_path);
    let output = cmd
        .output()
        .await
        .map_err(|error| ListTestsError::CommandExecFail {
            binary: binary.to_owned(),
            command: command(),
            error,
        })?;

    if output.status.success() {
        String::from_utf8(output.stdout).map_err(|err| ListTestsError::CommandNonUtf8 {
            binary: binary.to_owned(),
            command: command(),
            stdout: err.into_bytes(),
            stderr: output.stderr,
        })
    } else {
        Err(ListTestsError::CommandFail {
            binary: binary.to_owned(),
            command: command(),
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Parses the output of `--list --format terse`.
///
/// The output is in the form:
///
/// ```text
/// <test name>: test
/// <benchmark name>: benchmark
/// ```
///
/// Benchmarks are not returned.
fn parse_list_output<'a>(
    binary: &Utf8Path,
    list_output: &'a str,
) -> Result<Vec<&'a str>, ListTestsError> {
    let mut tests = Vec::new();
    for line in list_output.lines().filter(|line| !line.is_empty()) {
        if let Some(name) = line.strip_suffix(": test") {
            tests.push(name);
        } else if line.strip_suffix(": benchmark").is_none() {
            return Err(ListTestsError::parse_line(
                binary,
                format!("line '{line}' did not end with the string ': test' or ': benchmark'"),
                list_output,
            ));
        }
    }
    tests.sort_unstable();
    Ok(tests)
}

fn make_command(binary: &Utf8Path, argv: &[&str], dylib_path: Option<&OsStr>) -> Command {
    let mut cmd = Command::new(binary.as_std_path());
    cmd.args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dylib_path) = dylib_path {
        cmd.env(dylib_path_envvar(), dylib_path);
    }
    cmd
}

/// A [`TestPlan`] along with what's needed to execute its nodes.
#[derive(Debug)]
struct LibtestPlan {
    plan: TestPlan,
    tests: HashMap<NodeId, TestInfo>,
    list_errors: HashMap<NodeId, FailureCause>,
}

#[derive(Debug)]
struct TestInfo {
    binary: Utf8PathBuf,
    name: String,
    ignored: bool,
}

impl LibtestPlan {
    fn new(listings: impl IntoIterator<Item = (Utf8PathBuf, Result<Listing, ListTestsError>)>) -> Self {
        let mut this = Self {
            plan: TestPlan::new(LibtestEngine::ID),
            tests: HashMap::new(),
            list_errors: HashMap::new(),
        };
        for (binary, listing) in listings {
            this.add_binary(&binary, listing);
        }
        this
    }

    fn add_binary(&mut self, binary: &Utf8Path, listing: Result<Listing, ListTestsError>) {
        let file_name = binary.file_name().unwrap_or(binary.as_str());
        let stem = file_name
            .strip_suffix(std::env::consts::EXE_SUFFIX)
            .unwrap_or(file_name);
        let container = self.plan.add_node(
            NodeId::ROOT,
            NodeKind::Container,
            "binary",
            file_name,
            strip_cargo_hash(stem),
        );

        match listing {
            Ok(listing) => {
                let mut tree = ModuleTree::default();
                for (name, &ignored) in &listing {
                    tree.insert(name, ignored);
                }
                self.add_children(binary, container, &tree);
            }
            Err(error) => {
                debug!("listing `{binary}` failed: {}", DisplayErrorChain(&error));
                let cause = FailureCause::new(
                    Some(DisplayErrorChain(&error).to_string()),
                    error.diagnostic_output(),
                );
                self.list_errors.insert(container, cause);
            }
        }
    }

    fn add_children(&mut self, binary: &Utf8Path, parent: NodeId, tree: &ModuleTree<'_>) {
        let modules = tree
            .modules
            .iter()
            .map(|(&segment, subtree)| (segment, Some(subtree), None::<(&str, bool)>));
        let tests = tree
            .tests
            .iter()
            .map(|(&segment, &test)| (segment, None::<&ModuleTree<'_>>, Some(test)));

        for (segment, subtree, test) in modules.merge_by(tests, |a, b| a.0 <= b.0) {
            if let Some(subtree) = subtree {
                let id =
                    self.plan
                        .add_node(parent, NodeKind::Container, "module", segment, segment);
                self.add_children(binary, id, subtree);
            } else if let Some((name, ignored)) = test {
                let id = self
                    .plan
                    .add_node(parent, NodeKind::Leaf, "test", segment, segment);
                self.tests.insert(
                    id,
                    TestInfo {
                        binary: binary.to_owned(),
                        name: name.to_owned(),
                        ignored,
                    },
                );
            }
        }
    }
}

/// Test names split on `::`.
#[derive(Debug, Default)]
struct ModuleTree<'a> {
    modules: BTreeMap<&'a str, ModuleTree<'a>>,
    // Last segment -> (full name, ignored).
    tests: BTreeMap<&'a str, (&'a str, bool)>,
}

impl<'a> ModuleTree<'a> {
    fn insert(&mut self, name: &'a str, ignored: bool) {
        let mut segments: Vec<_> = name.split("::").collect();
        let last = segments.pop().unwrap_or(name);
        let mut tree = self;
        for segment in segments {
            tree = tree.modules.entry(segment).or_default();
        }
        tree.tests.insert(last, (name, ignored));
    }
}

struct Executor<'a> {
    plan: &'a LibtestPlan,
    listener: &'a dyn ExecutionListener,
    // Bounds the number of live test processes across the whole plan.
    semaphore: Semaphore,
    test_threads: usize,
    report_stdout: bool,
    dylib_path: Option<OsString>,
}

impl<'a> Executor<'a> {
    fn execute_node(&'a self, id: NodeId) -> BoxFuture<'a, ()> {
        async move {
            let node = self.plan.plan.node(id);

            if let Some(test) = self.plan.tests.get(&id) {
                if test.ignored {
                    self.listener.execution_skipped(node, "ignored");
                    return;
                }
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                self.listener.execution_started(node);
                let outcome = self.run_test(node, test).await;
                self.listener.execution_finished(node, &outcome);
                return;
            }

            self.listener.execution_started(node);
            if let Some(cause) = self.plan.list_errors.get(&id) {
                self.listener
                    .execution_finished(node, &ExecutionOutcome::failed(cause.clone()));
                return;
            }

            futures::stream::iter(self.plan.plan.children(id).iter().copied())
                .map(|child| self.execute_node(child))
                .buffer_unordered(self.test_threads)
                .collect::<()>()
                .await;
            self.listener
                .execution_finished(node, &ExecutionOutcome::Successful);
        }
        .boxed()
    }

    async fn run_test(&self, node: &TestNode, test: &TestInfo) -> ExecutionOutcome {
        debug!("running `{}` from `{}`", test.name, test.binary);
        let mut cmd = make_command(
            &test.binary,
            &["--exact", test.name.as_str(), "--nocapture"],
            self.dylib_path.as_deref(),
        );
        let output = match cmd.output().await {
            Ok(output) => output,
            Err(error) => {
                return ExecutionOutcome::failed(FailureCause::new(
                    Some(format!("error spawning `{}`: {error}", test.binary)),
                    None,
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let test_stdout = strip_libtest_chrome(&stdout, &test.name);

        if output.status.success() {
            if self.report_stdout && !test_stdout.is_empty() {
                self.listener.reporting_entry_published(
                    node,
                    &ReportEntry::new().with("stdout", test_stdout),
                );
            }
            return ExecutionOutcome::Successful;
        }

        let message = extract_panic_message(&stderr)
            .or_else(|| extract_panic_message(&stdout))
            .unwrap_or_else(|| describe_exit_status(output.status));
        let stack_trace = [test_stdout.as_str(), stderr.trim_end()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .join("\n");
        ExecutionOutcome::failed(FailureCause::new(Some(message), Some(stack_trace)))
    }
}

/// Removes the lines libtest prints around a single test, keeping what the test printed.
fn strip_libtest_chrome(stdout: &str, name: &str) -> String {
    let prefix = format!("test {name} ... ");
    let failures_entry = format!("    {name}");
    let is_result = |s: &str| matches!(s, "ok" | "FAILED" | "ignored");

    let mut lines = Vec::new();
    // Output printed while the test runs ends up after the `test <name> ... ` prefix, with the
    // result on a line of its own.
    let mut result_pending = false;
    for line in stdout.lines() {
        if is_running_line(line)
            || line.starts_with("test result: ")
            || line == "failures:"
            || line == failures_entry
        {
            continue;
        }
        if let Some(rest) = line.strip_prefix(&prefix) {
            if !is_result(rest) {
                lines.push(rest);
                result_pending = true;
            }
            continue;
        }
        if result_pending && is_result(line) {
            result_pending = false;
            continue;
        }
        lines.push(line);
    }

    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

fn is_running_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("running ") else {
        return false;
    };
    let count = rest
        .strip_suffix(" tests")
        .or_else(|| rest.strip_suffix(" test"));
    count.is_some_and(|count| !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()))
}

/// Extracts the message of the first panic in a test's output.
///
/// Understands both the current format:
///
/// ```text
/// thread 'adds' panicked at src/lib.rs:10:5:
/// expected 2 got 3
/// note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace
/// ```
///
/// and the format used before Rust 1.73:
///
/// ```text
/// thread 'adds' panicked at 'expected 2 got 3', src/lib.rs:10:5
/// ```
fn extract_panic_message(output: &str) -> Option<String> {
    let mut lines = output.lines();
    let location = lines.by_ref().find_map(|line| {
        if !line.starts_with("thread ") {
            return None;
        }
        line.split_once(" panicked at ").map(|(_, location)| location)
    })?;

    if let Some(message) = location
        .strip_prefix('\'')
        .and_then(|rest| rest.rsplit_once("', "))
        .map(|(message, _)| message)
    {
        return (!message.is_empty()).then(|| message.to_owned());
    }

    if location.ends_with(':') {
        let message = lines
            .take_while(|line| !line.starts_with("note: ") && *line != "stack backtrace:")
            .join("\n");
        let message = message.trim_end();
        return (!message.is_empty()).then(|| message.to_owned());
    }

    None
}

fn describe_exit_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("test process exited with code {code}");
    }
    match exit_signal(status) {
        Some(signal) => format!("test process terminated by signal {signal}"),
        None => format!("test process failed: {status}"),
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn exit_signal(status: ExitStatus) -> Option<i32> {
            use std::os::unix::process::ExitStatusExt;

            status.signal()
        }

        fn is_executable(_path: &Utf8Path, metadata: &Metadata) -> bool {
            use std::os::unix::fs::PermissionsExt;

            metadata.permissions().mode() & 0o111 != 0
        }
    } else {
        fn exit_signal(_status: ExitStatus) -> Option<i32> {
            None
        }

        fn is_executable(path: &Utf8Path, _metadata: &Metadata) -> bool {
            path.extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case("exe"))
        }
    }
}

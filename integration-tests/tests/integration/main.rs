// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests run `codewars-test-runner-dup`, a copy of the runner's main binary, against
//! directories of fake test binaries. Every fake binary is a copy of `fake-libtest`, whose
//! behavior is set by a fixture file next to it.

use codewars_metadata::RunnerExitCode;
use indoc::indoc;
use pretty_assertions::assert_eq;

mod fixtures;

use fixtures::*;

#[test]
fn test_passing_run() {
    let submission = Submission::new();
    submission.add_test_binary(
        "tests",
        "kata",
        indoc! {"
            math::adds
            math::prints_stdout
        "},
    );

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(output.exit_code(), Some(RunnerExitCode::OK), "{output}");
    assert_eq!(
        output.normalized_stdout(),
        markers(&[
            "<DESCRIBE::>kata",
            "<DESCRIBE::>math",
            "<IT::>adds",
            "<PASSED::>Test Passed",
            "<COMPLETEDIN::>[ms]",
            "<IT::>prints_stdout",
            "<LOG::-Reports>stdout = hello from math::prints_stdout",
            "<PASSED::>Test Passed",
            "<COMPLETEDIN::>[ms]",
            "<COMPLETEDIN::>[ms]",
            "<COMPLETEDIN::>[ms]",
        ]),
        "{output}"
    );
}

#[test]
fn test_failing_run() {
    let submission = Submission::new();
    submission.add_test_binary(
        "tests",
        "kata",
        indoc! {"
            adds
            subtracts_fail
        "},
    );

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::TEST_RUN_FAILED),
        "{output}"
    );
    assert_eq!(
        output.normalized_stdout(),
        markers(&[
            "<DESCRIBE::>kata",
            "<IT::>adds",
            "<PASSED::>Test Passed",
            "<COMPLETEDIN::>[ms]",
            "<IT::>subtracts_fail",
            "<FAILED::>expected 2 got 3",
            "<LOG:ESC:-Stack Trace>thread 'subtracts_fail' panicked at src/lib.rs:10:5:<:LF:>\
             expected 2 got 3<:LF:>\
             note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace",
            "<COMPLETEDIN::>[ms]",
            "<COMPLETEDIN::>[ms]",
        ]),
        "{output}"
    );
}

#[test]
fn test_ignored_tests_are_skipped() {
    let submission = Submission::new();
    submission.add_test_binary(
        "tests",
        "kata",
        indoc! {"
            adds
            #ignore slow
        "},
    );

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(output.exit_code(), Some(RunnerExitCode::OK), "{output}");
    assert_eq!(
        output.normalized_stdout(),
        markers(&[
            "<DESCRIBE::>kata",
            "<IT::>adds",
            "<PASSED::>Test Passed",
            "<COMPLETEDIN::>[ms]",
            "<IT::>[SKIPPED] slow",
            "<LOG::Skipped Reason>ignored",
            "<COMPLETEDIN::>",
            "<COMPLETEDIN::>[ms]",
        ]),
        "{output}"
    );
}

#[test]
fn test_only_ignored_tests() {
    let submission = Submission::new();
    submission.add_test_binary("tests", "kata", "#ignore slow\n");

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::NO_TESTS_FOUND),
        "{output}"
    );
}

#[test]
fn test_no_tests() {
    let submission = Submission::new();
    submission.add_file("tests/README.md", "no tests here\n");

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::NO_TESTS_FOUND),
        "{output}"
    );
    assert_eq!(output.stdout_as_str(), "", "{output}");
}

#[test]
fn test_missing_path_entries() {
    let submission = Submission::new();

    let path_list = ["does-not-exist", "also-missing/*"].join(path_list_separator());
    let output = submission.runner().args([path_list]).output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::NO_TESTS_FOUND),
        "{output}"
    );
}

#[test]
fn test_list_failure_crashes_binary() {
    let submission = Submission::new();
    submission.add_test_binary("tests", "broken", "adds\n!crash-on-list\n");
    submission.add_test_binary("tests", "kata", "adds\n");

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::TEST_RUN_FAILED),
        "{output}"
    );
    let stdout = output.normalized_stdout();
    assert!(
        stdout.starts_with("\n<DESCRIBE::>broken\n\n<ERROR::>"),
        "broken binary reported as crashed: {output}"
    );
    assert!(
        stdout.contains("unable to load test data"),
        "stack trace includes stderr: {output}"
    );
    assert!(
        stdout.ends_with(&markers(&[
            "<DESCRIBE::>kata",
            "<IT::>adds",
            "<PASSED::>Test Passed",
            "<COMPLETEDIN::>[ms]",
            "<COMPLETEDIN::>[ms]",
        ])),
        "other binaries still run: {output}"
    );
}

#[test]
fn test_wildcard_archives_are_staged() {
    let submission = Submission::new();
    submission.add_test_binary("tests", "kata", "reads_env\n");
    submission.add_file("libs/libkata.so", "not really a library");
    submission.add_file("libs/notes.txt", "not an archive");

    let path_list = ["tests", "libs/*"].join(path_list_separator());
    let output = submission.runner().args([path_list]).output();

    assert_eq!(output.exit_code(), Some(RunnerExitCode::OK), "{output}");
    let stdout = output.normalized_stdout();
    assert!(
        stdout.contains("<LOG::-Reports>stdout = "),
        "test output is reported: {output}"
    );
    assert!(
        stdout.contains("codewars-runner-"),
        "staging directory is on the library search path: {output}"
    );
}

#[test]
fn test_ambient_path() {
    let submission = Submission::new();
    let binary = submission.add_test_binary("ambient", "kata", "adds\n");
    let ambient = binary.parent().expect("binary has a parent");

    let output = submission
        .runner()
        .args(["does-not-exist"])
        .env("CODEWARS_TEST_PATH", ambient.as_str())
        .output();

    assert_eq!(output.exit_code(), Some(RunnerExitCode::OK), "{output}");
    assert!(output.normalized_stdout().contains("<IT::>adds"), "{output}");
}

#[test]
fn test_config_file() {
    let submission = Submission::new();
    submission.add_test_binary("tests", "kata", "prints_stdout\n");
    submission.add_file(
        ".config/codewars-runner.toml",
        indoc! {"
            [run]
            report-stdout = false
        "},
    );

    let output = submission.runner().args(["tests"]).output();

    assert_eq!(output.exit_code(), Some(RunnerExitCode::OK), "{output}");
    assert_eq!(
        output.normalized_stdout(),
        markers(&[
            "<DESCRIBE::>kata",
            "<IT::>prints_stdout",
            "<PASSED::>Test Passed",
            "<COMPLETEDIN::>[ms]",
            "<COMPLETEDIN::>[ms]",
        ]),
        "{output}"
    );
}

#[test]
fn test_invalid_config_file() {
    let submission = Submission::new();
    submission.add_file("runner.toml", "[run]\ntest-threads = 0\n");

    let output = submission
        .runner()
        .args(["--config", "runner.toml", "tests"])
        .output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::SETUP_ERROR),
        "{output}"
    );
    assert_eq!(output.stdout_as_str(), "", "{output}");
    assert!(
        output.stderr_as_str().contains("runner.toml"),
        "error names the config file: {output}"
    );
}

#[test]
fn test_invalid_log_filter() {
    let submission = Submission::new();
    submission.add_test_binary("tests", "kata", "adds\n");

    let output = submission
        .runner()
        .args(["tests"])
        .env("CODEWARS_RUNNER_LOG", "=[bad")
        .output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::SETUP_ERROR),
        "{output}"
    );
    assert_eq!(output.stdout_as_str(), "", "no tests run: {output}");
    assert!(
        output.stderr_as_str().contains("CODEWARS_RUNNER_LOG"),
        "error names the variable: {output}"
    );
}

#[test]
fn test_parallel_run() {
    let submission = Submission::new();
    submission.add_test_binary(
        "tests",
        "kata",
        indoc! {"
            arith::adds_stdout
            arith::subtracts_stdout
            geometry::area_stdout
            geometry::perimeter_fail
            strings::concat_stdout
            strings::split_stdout
        "},
    );
    submission.add_test_binary("tests", "extra", "misc::extra_stdout\n");

    let output = submission
        .runner()
        .args(["--test-threads", "4", "tests"])
        .output();

    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::TEST_RUN_FAILED),
        "{output}"
    );

    let stdout = output.normalized_stdout();
    let lines: Vec<&str> = stdout.lines().filter(|line| !line.is_empty()).collect();
    let position = |pred: &dyn Fn(&str) -> bool, what: &str| {
        lines
            .iter()
            .position(|line| pred(line))
            .unwrap_or_else(|| panic!("{what} not found: {output}"))
    };
    let count = |prefix: &str| lines.iter().filter(|line| line.starts_with(prefix)).count();

    assert_eq!(count("<DESCRIBE::>"), 6, "{output}");
    assert_eq!(count("<IT::>"), 7, "{output}");
    assert_eq!(count("<PASSED::>"), 6, "{output}");
    assert_eq!(count("<FAILED::>"), 1, "{output}");
    assert_eq!(count("<COMPLETEDIN::>"), 13, "{output}");

    // The output of each event is written at once, so a leaf's result markers are adjacent.
    for full_name in [
        "arith::adds_stdout",
        "arith::subtracts_stdout",
        "geometry::area_stdout",
        "strings::concat_stdout",
        "strings::split_stdout",
        "misc::extra_stdout",
    ] {
        let (_, name) = full_name.split_once("::").unwrap();
        let it = position(&|line| line == format!("<IT::>{name}"), full_name);
        let report_line = format!("<LOG::-Reports>stdout = hello from {full_name}");
        let report = position(&|line| line == report_line, &report_line);
        assert!(it < report, "{full_name} started before finishing: {output}");
        assert_eq!(lines[report + 1], "<PASSED::>Test Passed", "{output}");
        assert_eq!(lines[report + 2], "<COMPLETEDIN::>[ms]", "{output}");
    }

    let it = position(&|line| line == "<IT::>perimeter_fail", "perimeter_fail");
    let stack_trace = position(
        &|line| line.starts_with("<LOG:ESC:-Stack Trace>thread 'geometry::perimeter_fail'"),
        "stack trace",
    );
    assert!(it < stack_trace - 1, "{output}");
    assert_eq!(lines[stack_trace - 1], "<FAILED::>expected 2 got 3", "{output}");
    assert_eq!(lines[stack_trace + 1], "<COMPLETEDIN::>[ms]", "{output}");
}

#[test]
fn test_usage_errors() {
    let submission = Submission::new();

    let output = submission.runner().output();
    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::USAGE_ERROR),
        "{output}"
    );
    assert!(output.stderr_as_str().contains("PATH_LIST"), "{output}");

    let output = submission.runner().args(["a", "b"]).output();
    assert_eq!(
        output.exit_code(),
        Some(RunnerExitCode::USAGE_ERROR),
        "{output}"
    );

    let output = submission.runner().args(["--help"]).output();
    assert_eq!(output.exit_code(), Some(RunnerExitCode::OK), "{output}");
    assert!(output.stdout_as_str().contains("Usage"), "{output}");
}

fn path_list_separator() -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(windows)] {
            ";"
        } else {
            ":"
        }
    }
}

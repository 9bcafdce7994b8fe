// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::{
    borrow::Cow,
    collections::HashMap,
    ffi::OsString,
    fmt,
    process::{Command, ExitStatus},
};

/// Environment variables read by the runner, removed so the host environment can't leak in.
const RUNNER_ENV_VARS: &[&str] = &[
    "CODEWARS_TEST_PATH",
    "CODEWARS_RUNNER_CONFIG",
    "CODEWARS_TEST_THREADS",
    "CODEWARS_RUNNER_VERBOSE",
    "CODEWARS_RUNNER_LOG",
];

#[derive(Clone, Debug)]
pub struct RunnerCli {
    bin: Utf8PathBuf,
    cwd: Utf8PathBuf,
    args: Vec<String>,
    envs: HashMap<OsString, OsString>,
}

impl RunnerCli {
    pub fn new(cwd: &Utf8Path) -> Self {
        Self {
            bin: env!("CARGO_BIN_EXE_codewars-test-runner-dup").into(),
            cwd: cwd.to_owned(),
            args: Vec::new(),
            envs: HashMap::new(),
        }
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(&mut self, k: impl Into<OsString>, v: impl Into<OsString>) -> &mut Self {
        self.envs.insert(k.into(), v.into());
        self
    }

    pub fn output(&self) -> RunnerOutput {
        let mut command = Command::new(&self.bin);
        command.current_dir(&self.cwd).args(&self.args);
        for var in RUNNER_ENV_VARS {
            command.env_remove(var);
        }
        command.env("CODEWARS_RUNNER_COLOR", "never");
        command.envs(&self.envs);
        let output = command.output().expect("failed to execute");

        RunnerOutput {
            command,
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

pub struct RunnerOutput {
    pub command: Command,
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunnerOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.code()
    }

    pub fn stdout_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Returns standard output with the millisecond counts of finished nodes replaced by `[ms]`.
    pub fn normalized_stdout(&self) -> String {
        self.stdout_as_str()
            .lines()
            .map(|line| match line.strip_prefix("<COMPLETEDIN::>") {
                Some(ms) if !ms.is_empty() && ms.bytes().all(|b| b.is_ascii_digit()) => {
                    "<COMPLETEDIN::>[ms]"
                }
                _ => line,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for RunnerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command: {:?}\nexit code: {:?}\n\
             --- stdout ---\n{}\n\n--- stderr ---\n{}\n",
            self.command,
            self.exit_status.code(),
            self.stdout_as_str(),
            self.stderr_as_str(),
        )
    }
}

/// A temporary directory laid out like a graded submission.
pub struct Submission {
    dir: Utf8TempDir,
}

impl Submission {
    pub fn new() -> Self {
        let dir = camino_tempfile::Builder::new()
            .prefix("codewars-submission-")
            .tempdir()
            .expect("created temp dir");
        Self { dir }
    }

    pub fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Adds a fake test binary under `subdir`, listing the tests in `fixture`.
    ///
    /// The binary is named like the ones cargo produces, with a hash suffix.
    pub fn add_test_binary(&self, subdir: &str, name: &str, fixture: &str) -> Utf8PathBuf {
        let dir = self.dir.path().join(subdir);
        fs_err::create_dir_all(&dir).expect("created binary dir");

        let stem = format!("{name}-0123456789abcdef");
        let binary = dir.join(format!("{stem}{}", std::env::consts::EXE_SUFFIX));
        // Copying keeps the executable bit.
        fs_err::copy(env!("CARGO_BIN_EXE_fake-libtest"), &binary).expect("copied fake-libtest");
        fs_err::write(dir.join(format!("{stem}.fixture")), fixture).expect("wrote fixture");
        binary
    }

    pub fn add_file(&self, rel_path: &str, contents: &str) -> Utf8PathBuf {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent).expect("created parent dir");
        }
        fs_err::write(&path, contents).expect("wrote file");
        path
    }

    pub fn runner(&self) -> RunnerCli {
        RunnerCli::new(self.dir.path())
    }
}

/// Renders markers the way the runner writes them, without the final line feed.
pub fn markers(lines: &[&str]) -> String {
    let mut out: String = lines.iter().map(|line| format!("\n{line}\n")).collect();
    out.pop();
    out
}

// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behaves like a test binary built with libtest, driven by a fixture file.
//!
//! The fixture lives next to the binary, with the extension `fixture`. Each line is either a test
//! name, `#ignore <name>` for an ignored test, or a directive:
//!
//! * `!crash-on-list`: listing tests fails.
//!
//! What a test does depends on its name: names ending with `fail` panic, names ending with
//! `stdout` print a line, and names ending with `env` print the dynamic library search path.

use std::{io::Write, process::ExitCode};

struct Fixture {
    tests: Vec<(String, bool)>,
    crash_on_list: bool,
}

impl Fixture {
    fn load() -> Fixture {
        let exe = std::env::current_exe().expect("current exe is available");
        let path = exe.with_extension("fixture");
        let contents = std::fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("error reading fixture {}: {err}", path.display()));

        let mut fixture = Fixture {
            tests: Vec::new(),
            crash_on_list: false,
        };
        for line in contents.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if line == "!crash-on-list" {
                fixture.crash_on_list = true;
            } else if let Some(name) = line.strip_prefix("#ignore ") {
                fixture.tests.push((name.to_owned(), true));
            } else {
                fixture.tests.push((line.to_owned(), false));
            }
        }
        fixture
    }
}

fn dylib_path_envvar() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_FALLBACK_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let fixture = Fixture::load();

    if args.iter().any(|arg| arg == "--list") {
        if fixture.crash_on_list {
            eprintln!("error: unable to load test data");
            return ExitCode::from(101);
        }
        let ignored = args.iter().any(|arg| arg == "--ignored");
        for (name, _) in fixture.tests.iter().filter(|(_, i)| *i == ignored) {
            println!("{name}: test");
        }
        return ExitCode::SUCCESS;
    }

    let Some(name) = args
        .iter()
        .position(|arg| arg == "--exact")
        .and_then(|i| args.get(i + 1))
    else {
        eprintln!("error: expected --list or --exact <name>");
        return ExitCode::from(101);
    };
    if !fixture.tests.iter().any(|(test, _)| test == name) {
        eprintln!("error: no test named {name}");
        return ExitCode::from(101);
    }

    println!();
    println!("running 1 test");
    print!("test {name} ... ");
    let _ = std::io::stdout().flush();

    if name.ends_with("fail") {
        println!("FAILED");
        eprintln!("thread '{name}' panicked at src/lib.rs:10:5:");
        eprintln!("expected 2 got 3");
        eprintln!("note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace");
        println!();
        println!("failures:");
        println!();
        println!("failures:");
        println!("    {name}");
        println!();
        println!(
            "test result: FAILED. 0 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out; \
             finished in 0.00s"
        );
        println!();
        return ExitCode::from(101);
    }

    if name.ends_with("stdout") {
        println!("hello from {name}");
    } else if name.ends_with("env") {
        let value = std::env::var(dylib_path_envvar()).unwrap_or_default();
        println!("{value}");
    }
    println!("ok");
    println!();
    println!(
        "test result: ok. 1 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; \
         finished in 0.00s"
    );
    println!();
    ExitCode::SUCCESS
}

// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    error::Error,
    fmt,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// The separator between entries of a path list, as in the `PATH` environment variable.
pub(crate) const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Splits a path list on the platform separator, dropping empty entries.
pub(crate) fn split_path_list(path_list: &str) -> impl Iterator<Item = &str> {
    path_list
        .split(PATH_LIST_SEPARATOR)
        .filter(|entry| !entry.is_empty())
}

/// Returns the name of the environment variable used for looking up dynamic libraries.
pub(crate) fn dylib_path_envvar() -> &'static str {
    if cfg!(windows) {
        "PATH"
    } else if cfg!(target_os = "macos") {
        // dyld searches DYLD_FALLBACK_LIBRARY_PATH only if it cannot find the library in its
        // install path. Setting DYLD_LIBRARY_PATH instead can have unintended consequences, and
        // has a significant performance penalty starting in 10.13.
        "DYLD_FALLBACK_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Returns the directories currently searched for dynamic libraries.
pub(crate) fn dylib_path() -> Vec<PathBuf> {
    match std::env::var_os(dylib_path_envvar()) {
        Some(var) => std::env::split_paths(&var).collect(),
        None => Vec::new(),
    }
}

/// Strips the `-<16 hex digits>` suffix cargo adds to the names of test binaries.
pub(crate) fn strip_cargo_hash(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((prefix, hash))
            if !prefix.is_empty()
                && hash.len() == 16
                && hash.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            prefix
        }
        _ => name,
    }
}

/// Locks a mutex, recovering the data if another thread panicked while holding the lock.
///
/// All state guarded this way is updated with single insertions, so it is never left
/// half-written.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Displays an error along with its chain of sources on one line.
pub(crate) struct DisplayErrorChain<E>(pub(crate) E);

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

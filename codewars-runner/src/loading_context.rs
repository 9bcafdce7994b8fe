// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The loading context: where test code and the libraries it depends on are found.
//!
//! A [`LoadingContext`] is built from the path entries of a run. Directory entries are searched
//! as they are. Archive entries (dynamic libraries) are staged into a private temporary directory
//! so that they can be found by file name. Test processes spawned while a context is installed
//! get a dynamic library search path covering both.
//!
//! A context is installed for the current thread with [`with_loading_context`], which restores
//! the previous context and closes the installed one when it returns.

use crate::{
    errors::LoadingContextError,
    helpers::{dylib_path, dylib_path_envvar},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::{
    cell::RefCell,
    collections::HashSet,
    ffi::{OsStr, OsString},
    io,
    path::PathBuf,
    sync::Arc,
};
use tracing::{debug, warn};

thread_local! {
    static CURRENT: RefCell<Option<Arc<LoadingContext>>> = const { RefCell::new(None) };
}

/// Resolved path entries along with the search path derived from them.
#[derive(Debug)]
pub struct LoadingContext {
    directories: Vec<Utf8PathBuf>,
    staged_archives: Vec<Utf8PathBuf>,
    staging_dir: Utf8TempDir,
    dylib_path: OsString,
}

impl LoadingContext {
    /// Builds a new loading context from path entries, all of which must exist.
    ///
    /// Directories are used as they are and any other entry is treated as an archive.
    pub fn new<I>(entries: I) -> Result<Self, LoadingContextError>
    where
        I: IntoIterator,
        I::Item: AsRef<Utf8Path>,
    {
        let staging_dir = camino_tempfile::Builder::new()
            .prefix("codewars-runner-")
            .tempdir()
            .map_err(LoadingContextError::CreateStagingDir)?;

        let mut directories = Vec::new();
        let mut staged_archives = Vec::new();
        let mut staged_names = HashSet::new();

        for entry in entries {
            let entry = entry.as_ref();
            let resolved =
                entry
                    .canonicalize_utf8()
                    .map_err(|error| LoadingContextError::InvalidEntry {
                        entry: entry.to_owned(),
                        error,
                    })?;

            if resolved.is_dir() {
                directories.push(resolved);
                continue;
            }

            let Some(file_name) = resolved.file_name() else {
                return Err(LoadingContextError::InvalidEntry {
                    entry: entry.to_owned(),
                    error: io::Error::new(io::ErrorKind::InvalidInput, "entry has no file name"),
                });
            };
            if !staged_names.insert(file_name.to_owned()) {
                debug!("archive `{resolved}` shadowed by an earlier archive named `{file_name}`");
                continue;
            }

            let staged = staging_dir.path().join(file_name);
            stage_archive(&resolved, &staged).map_err(|error| {
                LoadingContextError::StageArchive {
                    archive: resolved.clone(),
                    staging_dir: staging_dir.path().to_owned(),
                    error,
                }
            })?;
            debug!("staged archive `{resolved}` as `{staged}`");
            staged_archives.push(staged);
        }

        let dylib_path = create_dylib_path(staging_dir.path(), &directories)?;

        Ok(Self {
            directories,
            staged_archives,
            staging_dir,
            dylib_path,
        })
    }

    /// Returns the resolved directory entries, in order.
    pub fn directories(&self) -> &[Utf8PathBuf] {
        &self.directories
    }

    /// Returns the staged copies of archive entries, in order.
    pub fn staged_archives(&self) -> &[Utf8PathBuf] {
        &self.staged_archives
    }

    /// Returns the directory archives are staged into.
    pub fn staging_dir(&self) -> &Utf8Path {
        self.staging_dir.path()
    }

    /// Returns the dynamic library search path for test processes.
    pub fn dylib_path(&self) -> &OsStr {
        &self.dylib_path
    }

    /// Returns the dynamic library search path of the context installed on the current thread,
    /// if any.
    pub fn current_dylib_path() -> Option<OsString> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .map(|context| context.dylib_path.clone())
        })
    }

    /// Returns true if a context is installed on the current thread.
    pub fn is_installed() -> bool {
        CURRENT.with(|current| current.borrow().is_some())
    }

    /// Closes the context, removing the staging directory.
    pub fn close(self) -> io::Result<()> {
        self.staging_dir.close()
    }
}

/// Runs `f` with `context` installed as the current thread's loading context.
///
/// When `f` returns or unwinds, the previously installed context is restored and `context` is
/// closed. Errors while closing are logged. If `context` is `None`, `f` runs with the current
/// context unchanged.
pub fn with_loading_context<T>(context: Option<LoadingContext>, f: impl FnOnce() -> T) -> T {
    match context {
        Some(context) => {
            let _guard = InstalledContext::install(context);
            f()
        }
        None => f(),
    }
}

struct InstalledContext {
    previous: Option<Arc<LoadingContext>>,
}

impl InstalledContext {
    fn install(context: LoadingContext) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(Arc::new(context))));
        Self { previous }
    }
}

impl Drop for InstalledContext {
    fn drop(&mut self) {
        let installed = CURRENT.with(|current| current.replace(self.previous.take()));
        let Some(installed) = installed else {
            return;
        };
        match Arc::into_inner(installed) {
            Some(context) => {
                let staging_dir = context.staging_dir().to_owned();
                if let Err(error) = context.close() {
                    warn!("error removing staging directory `{staging_dir}`: {error}");
                }
            }
            None => {
                debug!("loading context still referenced, closing it when the last user drops it");
            }
        }
    }
}

fn create_dylib_path(
    staging_dir: &Utf8Path,
    directories: &[Utf8PathBuf],
) -> Result<OsString, LoadingContextError> {
    let dylib_path = dylib_path();
    let dylib_path_is_empty = dylib_path.is_empty();

    let mut new_paths = Vec::with_capacity(directories.len() + 1);
    new_paths.push(staging_dir.to_owned());
    new_paths.extend(directories.iter().cloned());

    let mut updated_dylib_path: Vec<PathBuf> =
        Vec::with_capacity(dylib_path.len() + new_paths.len());
    updated_dylib_path.extend(
        new_paths
            .iter()
            .map(|path| path.clone().into_std_path_buf()),
    );
    updated_dylib_path.extend(dylib_path);

    // On macOS, these are the defaults when DYLD_FALLBACK_LIBRARY_PATH isn't set or set to an
    // empty string.
    if cfg!(target_os = "macos") && dylib_path_is_empty {
        if let Some(home) = home::home_dir() {
            updated_dylib_path.push(home.join("lib"));
        }
        updated_dylib_path.push("/usr/local/lib".into());
        updated_dylib_path.push("/usr/lib".into());
    }

    debug!(
        "{} for test processes: {:?}",
        dylib_path_envvar(),
        updated_dylib_path
    );
    std::env::join_paths(updated_dylib_path)
        .map_err(|error| LoadingContextError::DylibJoinPaths { new_paths, error })
}

#[cfg(unix)]
fn stage_archive(archive: &Utf8Path, staged: &Utf8Path) -> io::Result<()> {
    fs_err::os::unix::fs::symlink(archive, staged)
}

#[cfg(not(unix))]
fn stage_archive(archive: &Utf8Path, staged: &Utf8Path) -> io::Result<()> {
    fs_err::copy(archive, staged).map(|_| ())
}

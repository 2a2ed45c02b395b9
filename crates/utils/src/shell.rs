//! Executable lookup on `PATH`.

use std::path::{Path, PathBuf};

/// Resolve an executable name (or an explicit path) to a runnable file.
///
/// Names containing a path separator are returned as-is when the file exists.
pub fn resolve_executable_path_blocking(executable: &str) -> Option<PathBuf> {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    match which::which(executable) {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::trace!(executable, %err, "executable not found on PATH");
            None
        }
    }
}

/// True when `executable` can be found on `PATH`.
pub fn command_exists(executable: &str) -> bool {
    resolve_executable_path_blocking(executable).is_some()
}

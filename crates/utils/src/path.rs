//! Path normalization and pathspec files.
//!
//! Git matches pathspecs byte-for-byte. Filesystems that store names in
//! decomposed form (NFD) would otherwise miss paths the caller passed in
//! composed form, so every path written to a pathspec file is NFC.

use std::{
    borrow::Cow,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Return `path` in Unicode canonical composition, borrowing when it already is.
pub fn normalize_nfc(path: &str) -> Cow<'_, str> {
    if is_nfc(path) {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(path.nfc().collect())
    }
}

/// A newline-separated pathspec file living in its own temporary directory.
///
/// The directory (and the file) is removed when the value is dropped.
#[derive(Debug)]
pub struct PathspecFile {
    _dir: TempDir,
    path: PathBuf,
}

impl PathspecFile {
    /// Write `paths` (NFC-normalized, one per line) to a fresh file called `name`.
    pub fn write<I, S>(name: &str, paths: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dir = TempDir::new()?;
        let path = dir.path().join(name);
        let mut writer = BufWriter::new(File::create(&path)?);
        for p in paths {
            writeln!(writer, "{}", normalize_nfc(p.as_ref()))?;
        }
        writer.flush()?;

        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Line-oriented task files
//
// Task files are UTF-8 text, one unit per line. Blank lines are skipped and
// surrounding whitespace is trimmed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Extension appended to task file names that lack it
pub const TXT_EXTENSION: &str = ".txt";

/// Errors from reading a task file
#[derive(Debug, Error)]
pub enum ReadLinesError {
    /// File does not exist
    #[error("file '{}' not found", .0.display())]
    NotFound(PathBuf),

    /// Any other read failure (permissions, invalid UTF-8, ...)
    #[error("failed to read file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReadLinesError {
    /// Path the error refers to
    pub fn path(&self) -> &Path {
        match self {
            ReadLinesError::NotFound(path) => path,
            ReadLinesError::Io { path, .. } => path,
        }
    }
}

/// Resolve the on-disk name: append `.txt` unless already present
/// (case-insensitive)
pub fn with_txt_extension(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let has_extension = path
        .to_string_lossy()
        .to_lowercase()
        .ends_with(TXT_EXTENSION);

    if has_extension {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(TXT_EXTENSION);
        PathBuf::from(name)
    }
}

/// Read a task file into trimmed, non-empty lines
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>, ReadLinesError> {
    let path = with_txt_extension(path);

    let content = fs::read_to_string(&path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ReadLinesError::NotFound(path.clone()),
        _ => ReadLinesError::Io {
            path: path.clone(),
            source,
        },
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Split each line on `separator` into its fields
pub fn split_lines(lines: &[String], separator: &str) -> Vec<Vec<String>> {
    lines
        .iter()
        .map(|line| line.split(separator).map(str::to_string).collect())
        .collect()
}

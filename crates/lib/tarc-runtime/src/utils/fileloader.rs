use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),
    #[error("File {path} not found: {message}", path = path.display())]
    FileNotFound { message: String, path: PathBuf },
    #[error("Failed to convert into UTF: {0}")]
    UtfConversionError(#[from] std::string::FromUtf8Error),
}

/// Resolve `relpath` against the current working directory.
pub fn get_canonical_path(relpath: &str) -> Result<PathBuf, Error> {
    let abspath = std::env::current_dir()?.join(relpath);
    abspath.canonicalize().map_err(|e| Error::FileNotFound {
        message: e.to_string(),
        path: abspath,
    })
}

pub fn load(path: &Path) -> Result<String, Error> {
    let content = std::fs::read(path).map_err(|e| Error::FileNotFound {
        message: e.to_string(),
        path: path.to_path_buf(),
    })?;
    Ok(String::from_utf8(content)?)
}

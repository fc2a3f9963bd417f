//! Whole-file loading
//!
//! Shader byte-code and texture images are read in one piece; nothing in the
//! renderer streams from disk.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// File loading errors
#[derive(Error, Debug)]
pub enum FileError {
    /// The path could not be opened or read
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        /// Path that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

/// Read the whole file at `path` into memory
pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>, FileError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| FileError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_returns_exact_bytes() {
        let path = std::env::temp_dir().join(format!("rust_renderer_files_{}.bin", std::process::id()));
        let payload: Vec<u8> = (0..=255).collect();
        std::fs::write(&path, &payload).unwrap();

        let bytes = read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read("definitely/not/here.spv").unwrap_err();
        let FileError::Unreadable { path, source } = err;
        assert_eq!(path, PathBuf::from("definitely/not/here.spv"));
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    }
}

use std::{fs::File, path::Path};

use fs4::fs_std::FileExt;
use log::trace;
use thiserror::Error;

/// Advisory lock on a file, released when dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error("Could not lock {path}: {source}")]
pub struct Error {
    path: String,
    #[source]
    source: std::io::Error,
}

impl FileLock {
    /// Blocks until no other process holds any lock on `path`.
    pub fn exclusive(path: &Path) -> Result<Self, Error> {
        let file = open(path)?;
        trace!("Waiting for an exclusive lock on {}", path.display());
        FileExt::lock_exclusive(&file).map_err(|source| error(path, source))?;
        Ok(Self { _file: file })
    }

    /// Blocks until no other process holds an exclusive lock on `path`.
    pub fn shared(path: &Path) -> Result<Self, Error> {
        let file = open(path)?;
        trace!("Waiting for a shared lock on {}", path.display());
        FileExt::lock_shared(&file).map_err(|source| error(path, source))?;
        Ok(Self { _file: file })
    }
}

fn open(path: &Path) -> Result<File, Error> {
    File::options()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|source| error(path, source))
}

fn error(path: &Path, source: std::io::Error) -> Error {
    Error {
        path: path.display().to_string(),
        source,
    }
}

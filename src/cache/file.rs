use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    flock::FileLock,
    model::attrs::Attrs,
    store::{Store, StorePath},
};

use super::{Cache, CacheError};

const ENTRIES_DIR: &str = "entries";
const LOCK_FILE: &str = ".lock";
const ENTRY_EXTENSION: &str = "toml";

/// One recorded fetch, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub locked: bool,
    pub store_path: StorePath,
    pub key: Attrs,
    pub info: Attrs,
}

/// Cache kept as one TOML file per key under a directory.
///
/// Readers take a shared lock and writers an exclusive one on `<root>/.lock`,
/// so several processes may use the same cache directory.
pub struct FileCache {
    location: PathBuf,
    entries: PathBuf,
}

impl FileCache {
    pub fn new(location: PathBuf) -> Result<FileCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            fs::create_dir_all(&location)?;
        }

        let entries = location.join(ENTRIES_DIR);
        fs::create_dir_all(&entries)?;

        Ok(FileCache { location, entries })
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.location.exists() {
            info!(
                "Clearing pijulfetch cache {}.",
                &self.location.display()
            );
            let _lock = self.lock_exclusive()?;
            fs::remove_dir_all(&self.entries)?;
            fs::create_dir_all(&self.entries)?;
        }
        Ok(())
    }

    /// All entries currently recorded, in no particular order.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let _lock = self.lock_shared()?;
        let mut entries = Vec::new();
        for file in fs::read_dir(&self.entries)? {
            let path = file?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                entries.push(read_entry(&path)?);
            }
        }
        Ok(entries)
    }

    fn entry_path(&self, key: &Attrs) -> Result<PathBuf, CacheError> {
        let canonical = serde_json::to_string(key)?;
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        Ok(self.entries.join(format!("{digest}.{ENTRY_EXTENSION}")))
    }

    fn lock_shared(&self) -> Result<FileLock, CacheError> {
        Ok(FileLock::shared(&self.location.join(LOCK_FILE))?)
    }

    fn lock_exclusive(&self) -> Result<FileLock, CacheError> {
        Ok(FileLock::exclusive(&self.location.join(LOCK_FILE))?)
    }
}

impl Cache for FileCache {
    fn lookup(
        &self,
        store: &dyn Store,
        key: &Attrs,
    ) -> Result<Option<(Attrs, StorePath)>, CacheError> {
        let path = self.entry_path(key)?;
        let entry = {
            let _lock = self.lock_shared()?;
            match fs::metadata(&path) {
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    trace!("No cache entry for {:?}", key);
                    return Ok(None);
                }
                Err(error) => return Err(error.into()),
                Ok(_) => read_entry(&path)?,
            }
        };

        if &entry.key != key {
            debug!("Cache entry {} belongs to another key", path.display());
            return Ok(None);
        }

        if !store.is_valid_path(&entry.store_path) {
            debug!(
                "Cache entry for {:?} points to missing artifact {}",
                key, entry.store_path
            );
            return Ok(None);
        }

        trace!("Cache hit for {:?}: {}", key, entry.store_path);
        Ok(Some((entry.info, entry.store_path)))
    }

    fn add(
        &self,
        key: &Attrs,
        info: &Attrs,
        path: &StorePath,
        locked: bool,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            locked,
            store_path: path.clone(),
            key: key.clone(),
            info: info.clone(),
        };
        let contents = toml::to_string_pretty(&entry)?;
        let target = self.entry_path(key)?;

        let _lock = self.lock_exclusive()?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.entries)?;
        staged.write_all(contents.as_bytes())?;
        staged.persist(&target).map_err(|e| e.error)?;

        debug!("Recorded {} under {:?} (locked: {})", path, key, locked);
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let contents = fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|error| CacheError::Corrupt {
        path: path.display().to_string(),
        error,
    })
}

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use log::{debug, info, trace};
use sha2::{Digest, Sha256};

use super::{validate_name, Store, StoreError, StorePath};

const TMP_PREFIX: &str = ".tmp-";

/// A directory of immutable source trees named by the SHA-256 digest of their
/// contents.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Result<LocalStore, StoreError> {
        if root.exists() {
            if !root.is_dir() {
                return Err(StoreError::BadLocation {
                    location: root.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            fs::create_dir_all(&root)?;
        }
        Ok(LocalStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes every artifact, leaving an empty store behind.
    pub fn clear(&self) -> Result<(), StoreError> {
        if self.root.exists() {
            info!("Clearing pijulfetch store {}.", self.root.display());
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

impl Store for LocalStore {
    fn add_to_store(&self, name: &str, path: &Path) -> Result<StorePath, StoreError> {
        validate_name(name)?;

        let mut hasher = Sha256::new();
        hash_tree(&mut hasher, path)?;
        let store_path = StorePath::new(hex::encode(hasher.finalize()), name)?;

        let target = self.to_real_path(&store_path);
        if target.is_dir() {
            debug!("{} is already in the store", store_path);
            return Ok(store_path);
        }

        let staging = tempfile::Builder::new()
            .prefix(TMP_PREFIX)
            .tempdir_in(&self.root)?;
        let staged = staging.path().join(name);
        copy_tree(path, &staged)?;

        match fs::rename(&staged, &target) {
            Ok(()) => {}
            // Lost a race against another writer of the same content.
            Err(_) if target.is_dir() => {}
            Err(error) => return Err(error.into()),
        }
        debug!("Added {} to the store", store_path);
        Ok(store_path)
    }

    fn is_valid_path(&self, path: &StorePath) -> bool {
        self.to_real_path(path).is_dir()
    }

    fn to_real_path(&self, path: &StorePath) -> PathBuf {
        self.root.join(path.to_string())
    }
}

/// Feeds a canonical serialization of the tree at `path` into `hasher`.
///
/// Entries are visited in byte order of their names; regular files contribute
/// their executable bit and contents, symlinks their target.
fn hash_tree(hasher: &mut Sha256, path: &Path) -> Result<(), StoreError> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        hasher.update(b"(dir");
        for entry in sorted_entries(path)? {
            let name = entry.file_name();
            hasher.update(b"(entry");
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_encoded_bytes());
            hash_tree(hasher, &entry.path())?;
            hasher.update(b")");
        }
        hasher.update(b")");
    } else if file_type.is_file() {
        hasher.update(if is_executable(&metadata) {
            b"(exe"
        } else {
            b"(reg"
        });
        hasher.update(metadata.len().to_le_bytes());
        io::copy(&mut File::open(path)?, hasher)?;
        hasher.update(b")");
    } else if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        let target = target.as_os_str().as_encoded_bytes();
        hasher.update(b"(sym");
        hasher.update((target.len() as u64).to_le_bytes());
        hasher.update(target);
        hasher.update(b")");
    } else {
        return Err(StoreError::UnsupportedFileType(path.display().to_string()));
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), StoreError> {
    let file_type = fs::symlink_metadata(from)?.file_type();
    if file_type.is_dir() {
        fs::create_dir(to)?;
        for entry in sorted_entries(from)? {
            copy_tree(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else if file_type.is_file() {
        trace!("Copying {}", from.display());
        fs::copy(from, to)?;
    } else if file_type.is_symlink() {
        copy_symlink(from, to)?;
    } else {
        return Err(StoreError::UnsupportedFileType(from.display().to_string()));
    }
    Ok(())
}

fn sorted_entries(path: &Path) -> Result<Vec<fs::DirEntry>, StoreError> {
    let mut entries = fs::read_dir(path)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<(), StoreError> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> Result<(), StoreError> {
    Err(StoreError::UnsupportedFileType(from.display().to_string()))
}

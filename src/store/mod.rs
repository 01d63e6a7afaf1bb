mod local;

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Invalid store path name `{0}`")]
    InvalidName(String),
    #[error("Invalid store path `{0}`")]
    InvalidPath(String),
    #[error("Unsupported file type at {0}")]
    UnsupportedFileType(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// A content-addressed directory inside a [`Store`], rendered as
/// `<digest>-<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath {
    digest: String,
    name: String,
}

impl StorePath {
    pub fn new(digest: impl Into<String>, name: impl Into<String>) -> Result<Self, StoreError> {
        let digest = digest.into();
        let name = name.into();
        validate_name(&name)?;
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidPath(format!("{digest}-{name}")));
        }
        Ok(StorePath { digest, name })
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.digest, self.name)
    }
}

impl FromStr for StorePath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digest, name) = s
            .split_once('-')
            .ok_or_else(|| StoreError::InvalidPath(s.to_owned()))?;
        StorePath::new(digest, name)
    }
}

impl TryFrom<String> for StorePath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.to_string()
    }
}

/// Content-addressed artifact store.
pub trait Store {
    /// Ingests the directory at `path` and returns its content identifier.
    fn add_to_store(&self, name: &str, path: &Path) -> Result<StorePath, StoreError>;

    fn is_valid_path(&self, path: &StorePath) -> bool;

    fn to_real_path(&self, path: &StorePath) -> PathBuf;
}

pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+-._?=".contains(c));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_owned()))
    }
}

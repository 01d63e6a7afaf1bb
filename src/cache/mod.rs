mod file;

use thiserror::Error;

use crate::{
    model::attrs::Attrs,
    store::{Store, StorePath},
};

pub use file::{CacheEntry, FileCache};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("Corrupt cache entry {path}: {error}")]
    Corrupt {
        path: String,
        error: toml::de::Error,
    },
    #[error("Could not serialize cache entry: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not encode cache key: {0}")]
    Key(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Key-value cache from attribute-set keys to fetched artifacts.
pub trait Cache {
    /// Returns the metadata and artifact recorded under `key`, provided the
    /// artifact is still present in `store`.
    fn lookup(
        &self,
        store: &dyn Store,
        key: &Attrs,
    ) -> Result<Option<(Attrs, StorePath)>, CacheError>;

    /// Records an artifact under `key`. `locked` marks entries that describe
    /// an immutable pin; other entries may be superseded by later fetches.
    fn add(
        &self,
        key: &Attrs,
        info: &Attrs,
        path: &StorePath,
        locked: bool,
    ) -> Result<(), CacheError>;
}

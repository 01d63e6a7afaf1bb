use std::path::PathBuf;

use anyhow::Context;
use home::home_dir;
use log::debug;

use crate::{
    cache::FileCache, config::PijulfetchConfig, fetch::PijulFetcher, store::LocalStore,
    tool::PijulCli, Pijulfetch,
};

const DEFAULT_HOME_DIRECTORY: &str = ".pijulfetch";

#[derive(Default)]
pub struct PijulfetchBuilder {
    cache_directory_path: Option<PathBuf>,
    store_directory_path: Option<PathBuf>,
    pijul_program: Option<PathBuf>,
}

impl PijulfetchBuilder {
    /// Location of the fetch cache.
    ///
    /// Defaults to `$PIJULFETCH_CACHE_DIR`, then `$HOME/.pijulfetch/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Location of the artifact store.
    ///
    /// Defaults to `$PIJULFETCH_STORE_DIR`, then `$HOME/.pijulfetch/store`.
    pub fn store_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_directory_path = Some(path.into());
        self
    }

    /// The pijul executable.
    ///
    /// Defaults to `$PIJULFETCH_PIJUL_PROGRAM`, then `pijul` from `PATH`.
    pub fn pijul_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.pijul_program = Some(path.into());
        self
    }

    pub fn try_build(self) -> anyhow::Result<Pijulfetch> {
        let Self {
            cache_directory_path,
            store_directory_path,
            pijul_program,
        } = self;
        let config = PijulfetchConfig::load()?;

        let cache_directory = match cache_directory_path.or(config.cache_dir) {
            Some(path) => path,
            None => default_directory("cache")?,
        };
        let store_directory = match store_directory_path.or(config.store_dir) {
            Some(path) => path,
            None => default_directory("store")?,
        };
        let tool = match pijul_program.or(config.pijul_program) {
            Some(program) => PijulCli::new(program),
            None => PijulCli::default(),
        };

        debug!(
            "Using cache {}, store {} and {}",
            cache_directory.display(),
            store_directory.display(),
            tool.program().display()
        );

        let cache = FileCache::new(cache_directory)?;
        let store = LocalStore::new(store_directory)?;

        Ok(Pijulfetch {
            fetcher: PijulFetcher::new(tool, cache, store),
        })
    }
}

fn default_directory(name: &str) -> anyhow::Result<PathBuf> {
    let mut directory =
        home_dir().context("Could not find home dir. Please define $HOME env variable.")?;
    directory.push(DEFAULT_HOME_DIRECTORY);
    directory.push(name);
    Ok(directory)
}

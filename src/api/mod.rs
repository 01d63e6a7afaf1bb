use std::path::PathBuf;

use anyhow::bail;

use crate::{
    cache::FileCache,
    fetch::PijulFetcher,
    model::{attrs::Attrs, input::Input},
    scheme::PijulInputScheme,
    store::{LocalStore, Store, StorePath},
    tool::PijulCli,
};

mod builder;

pub use builder::PijulfetchBuilder;

type Fetcher = PijulFetcher<PijulCli, FileCache, LocalStore>;

pub struct Pijulfetch {
    fetcher: Fetcher,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// The input enriched with `channel`, `state` and `lastModified`.
    pub input: Input,
    pub store_path: StorePath,
    /// Location of the artifact on disk.
    pub path: PathBuf,
}

impl Pijulfetch {
    pub fn builder() -> PijulfetchBuilder {
        PijulfetchBuilder::default()
    }

    /// Fetches a `pijul+<scheme>://` URL.
    pub fn fetch(&self, url: &str, name: Option<&str>) -> anyhow::Result<Fetched> {
        let Some(input) = Input::from_url(url)? else {
            bail!("Not a pijul URL: {}", url);
        };
        self.fetch_input(with_name(input, name))
    }

    /// Fetches an input given as an attribute set.
    pub fn fetch_attrs(&self, attrs: &Attrs, name: Option<&str>) -> anyhow::Result<Fetched> {
        let Some(input) = Input::from_attrs(attrs)? else {
            bail!("Not a pijul input: {:?}", attrs);
        };
        self.fetch_input(with_name(input, name))
    }

    /// Resolves a URL to its locked form, fetching it if necessary.
    pub fn lock(&self, url: &str) -> anyhow::Result<String> {
        let fetched = self.fetch(url, None)?;
        Ok(fetched.input.to_url()?.to_string())
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        self.fetcher.cache().clear()?;
        Ok(())
    }

    /// Removes every fetched artifact. Cache entries pointing at them become
    /// misses.
    pub fn clear_store(&self) -> anyhow::Result<()> {
        self.fetcher.store().clear()?;
        Ok(())
    }

    /// Hands the fetcher over to a host registry.
    pub fn into_input_scheme(self) -> PijulInputScheme<PijulCli, FileCache, LocalStore> {
        PijulInputScheme::new(self.fetcher)
    }

    fn fetch_input(&self, input: Input) -> anyhow::Result<Fetched> {
        let (store_path, input) = self.fetcher.fetch(&input)?;
        let path = self.fetcher.store().to_real_path(&store_path);
        Ok(Fetched {
            input,
            store_path,
            path,
        })
    }
}

fn with_name(input: Input, name: Option<&str>) -> Input {
    match name {
        Some(name) => input.with_name(name),
        None => input,
    }
}

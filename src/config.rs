use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings taken from `PIJULFETCH_*` environment variables.
pub struct PijulfetchConfig {
    pub cache_dir: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub pijul_program: Option<PathBuf>,
}

impl PijulfetchConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            store_dir: raw_config.store.dir,
            pijul_program: raw_config.pijul.program,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: DirConfig,
    #[serde(default)]
    store: DirConfig,
    #[serde(default)]
    pijul: PijulConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct DirConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct PijulConfig {
    program: Option<PathBuf>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("PIJULFETCH")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

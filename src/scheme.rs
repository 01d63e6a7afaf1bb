use log::debug;
use thiserror::Error;

use crate::{
    cache::Cache,
    fetch::{FetchError, PijulFetcher},
    model::{
        attrs::Attrs,
        input::{Input, INPUT_TYPE},
        ParseError,
    },
    store::{Store, StorePath},
    tool::PijulTool,
};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No registered fetcher accepts {0}")]
    UnsupportedInput(String),
    #[error("Invalid input: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A fetcher that a host can select by URL scheme or by the `type` attribute.
pub trait InputScheme {
    fn type_name(&self) -> &'static str;

    /// `Ok(None)` means the URL belongs to another scheme.
    fn input_from_url(&self, url: &str) -> Result<Option<Input>, ParseError>;

    /// `Ok(None)` means the attributes belong to another scheme.
    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>, ParseError>;

    fn fetch(&self, input: &Input) -> Result<(StorePath, Input), FetchError>;
}

pub struct PijulInputScheme<T, C, S> {
    fetcher: PijulFetcher<T, C, S>,
}

impl<T, C, S> PijulInputScheme<T, C, S> {
    pub fn new(fetcher: PijulFetcher<T, C, S>) -> Self {
        PijulInputScheme { fetcher }
    }
}

impl<T, C, S> InputScheme for PijulInputScheme<T, C, S>
where
    T: PijulTool,
    C: Cache,
    S: Store,
{
    fn type_name(&self) -> &'static str {
        INPUT_TYPE
    }

    fn input_from_url(&self, url: &str) -> Result<Option<Input>, ParseError> {
        Input::from_url(url)
    }

    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>, ParseError> {
        Input::from_attrs(attrs)
    }

    fn fetch(&self, input: &Input) -> Result<(StorePath, Input), FetchError> {
        self.fetcher.fetch(input)
    }
}

/// Schemes known to the embedding application, asked in registration order.
#[derive(Default)]
pub struct Registry {
    schemes: Vec<Box<dyn InputScheme>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheme: Box<dyn InputScheme>) {
        debug!("Registering input scheme {}", scheme.type_name());
        self.schemes.push(scheme);
    }

    pub fn input_from_url(&self, url: &str) -> Result<(&dyn InputScheme, Input), RegistryError> {
        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_url(url)? {
                return Ok((scheme.as_ref(), input));
            }
        }
        Err(RegistryError::UnsupportedInput(url.to_owned()))
    }

    pub fn input_from_attrs(
        &self,
        attrs: &Attrs,
    ) -> Result<(&dyn InputScheme, Input), RegistryError> {
        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_attrs(attrs)? {
                return Ok((scheme.as_ref(), input));
            }
        }
        Err(RegistryError::UnsupportedInput(format!("{attrs:?}")))
    }

    pub fn fetch_url(&self, url: &str) -> Result<(StorePath, Input), RegistryError> {
        let (scheme, input) = self.input_from_url(url)?;
        Ok(scheme.fetch(&input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        cache::FileCache,
        model::attrs::attrs,
        store::LocalStore,
        tool::{PijulCli, ToolError},
    };

    fn registry(dir: &std::path::Path) -> Registry {
        let fetcher = PijulFetcher::new(
            PijulCli::new("/nonexistent/pijul"),
            FileCache::new(dir.join("cache")).unwrap(),
            LocalStore::new(dir.join("store")).unwrap(),
        );
        let mut registry = Registry::new();
        registry.register(Box::new(PijulInputScheme::new(fetcher)));
        registry
    }

    #[test]
    fn dispatches_pijul_urls() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let (scheme, input) = registry
            .input_from_url("pijul+https://example/repo?channel=main")
            .unwrap();
        assert_eq!(scheme.type_name(), "pijul");
        assert_eq!(input.channel(), Some("main"));
    }

    #[test]
    fn dispatches_pijul_attrs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let (scheme, _) = registry
            .input_from_attrs(&attrs([("type", "pijul"), ("url", "https://example/repo")]))
            .unwrap();
        assert_eq!(scheme.type_name(), "pijul");
    }

    #[test]
    fn rejects_unknown_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.input_from_url("git+https://example/repo"),
            Err(RegistryError::UnsupportedInput(_))
        ));
        assert!(matches!(
            Registry::new().input_from_url("pijul+https://example/repo"),
            Err(RegistryError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn surfaces_invalid_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.input_from_attrs(&attrs([
                ("type", "pijul"),
                ("url", "https://example/repo"),
                ("ref", "main")
            ])),
            Err(RegistryError::Parse(ParseError::UnsupportedAttribute(_)))
        ));
    }

    #[test]
    fn fetch_reports_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.fetch_url("pijul+https://example/repo"),
            Err(RegistryError::Fetch(FetchError::Tool(ToolError::Spawn { .. })))
        ));
    }
}

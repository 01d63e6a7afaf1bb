use std::{
    fmt::Display,
    path::PathBuf,
    str::FromStr,
};

use log::trace;
use url::{form_urlencoded, Url};

use super::{
    attrs::{maybe_get_str, Attr, Attrs},
    ParseError,
};

/// Value of the `type` attribute handled by this fetcher.
pub const INPUT_TYPE: &str = "pijul";

const SCHEME_PREFIX: &str = "pijul+";
const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "ssh"];
const DEFAULT_NAME: &str = "source";

/// The closed attribute vocabulary of a Pijul input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrName {
    Type,
    Url,
    Channel,
    State,
    NarHash,
    LastModified,
}

impl AttrName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttrName::Type => "type",
            AttrName::Url => "url",
            AttrName::Channel => "channel",
            AttrName::State => "state",
            AttrName::NarHash => "narHash",
            AttrName::LastModified => "lastModified",
        }
    }
}

impl FromStr for AttrName {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "type" => Ok(AttrName::Type),
            "url" => Ok(AttrName::Url),
            "channel" => Ok(AttrName::Channel),
            "state" => Ok(AttrName::State),
            "narHash" => Ok(AttrName::NarHash),
            "lastModified" => Ok(AttrName::LastModified),
            other => Err(ParseError::UnsupportedAttribute(other.to_owned())),
        }
    }
}

impl Display for AttrName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a Pijul repository, optionally pinned to a channel and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    name: String,
    url: Url,
    channel: Option<String>,
    state: Option<String>,
    nar_hash: Option<String>,
    last_modified: Option<u64>,
}

impl Input {
    /// Parses a `pijul+<scheme>://...` URL.
    ///
    /// Returns `Ok(None)` for URLs that belong to another fetcher. The
    /// `channel` and `state` query parameters become attributes, every other
    /// query parameter stays in the repository URL.
    pub fn from_url(s: &str) -> Result<Option<Input>, ParseError> {
        let Some(rest) = s.strip_prefix(SCHEME_PREFIX) else {
            return Ok(None);
        };
        let mut url = parse_url(rest)?;
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            trace!("Ignoring URL {} with unsupported scheme", s);
            return Ok(None);
        }

        let mut channel = None;
        let mut state = None;
        let mut query = Vec::new();
        for param in query_params(&url) {
            match param.key.as_str() {
                "channel" => channel = Some(param.value),
                "state" => state = Some(param.value),
                _ => query.push(param.raw),
            }
        }
        set_raw_query(&mut url, &query);

        Ok(Some(Input {
            name: DEFAULT_NAME.to_owned(),
            url,
            channel,
            state,
            nar_hash: None,
            last_modified: None,
        }))
    }

    /// Validates an attribute set against the Pijul vocabulary.
    ///
    /// Returns `Ok(None)` when `type` is not `pijul`.
    pub fn from_attrs(attrs: &Attrs) -> Result<Option<Input>, ParseError> {
        if maybe_get_str(attrs, AttrName::Type.as_str()) != Some(INPUT_TYPE) {
            return Ok(None);
        }

        let mut url = None;
        let mut channel = None;
        let mut state = None;
        let mut nar_hash = None;
        let mut last_modified = None;

        for (key, value) in attrs {
            match key.parse::<AttrName>()? {
                AttrName::Type => {}
                AttrName::Url => url = Some(expect_str(AttrName::Url, value)?),
                AttrName::Channel => channel = Some(expect_str(AttrName::Channel, value)?),
                AttrName::State => state = Some(expect_str(AttrName::State, value)?),
                AttrName::NarHash => nar_hash = Some(expect_str(AttrName::NarHash, value)?),
                AttrName::LastModified => {
                    last_modified = Some(value.as_int().ok_or_else(|| {
                        ParseError::WrongAttributeType {
                            name: AttrName::LastModified.to_string(),
                            expected: "an integer",
                        }
                    })?)
                }
            }
        }

        let url = url.ok_or_else(|| ParseError::MissingAttribute(AttrName::Url.to_string()))?;

        Ok(Some(Input {
            name: DEFAULT_NAME.to_owned(),
            url: parse_url(&url)?,
            channel,
            state,
            nar_hash,
            last_modified,
        }))
    }

    pub fn to_attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        attrs.insert(AttrName::Type.to_string(), Attr::from(INPUT_TYPE));
        attrs.insert(AttrName::Url.to_string(), Attr::from(self.url.to_string()));
        let optional = [
            (AttrName::Channel, &self.channel),
            (AttrName::State, &self.state),
            (AttrName::NarHash, &self.nar_hash),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                attrs.insert(name.to_string(), Attr::from(value.as_str()));
            }
        }
        if let Some(last_modified) = self.last_modified {
            attrs.insert(
                AttrName::LastModified.to_string(),
                Attr::from(last_modified),
            );
        }
        attrs
    }

    /// Renders the input back into its `pijul+` URL form.
    pub fn to_url(&self) -> Result<Url, ParseError> {
        let mut url = self.url.clone();
        let pins = [(AttrName::Channel, &self.channel), (AttrName::State, &self.state)];
        let mut query: Vec<String> = query_params(&url)
            .into_iter()
            .filter(|param| {
                !pins
                    .iter()
                    .any(|(name, value)| value.is_some() && param.key == name.as_str())
            })
            .map(|param| param.raw)
            .collect();

        for (name, value) in pins {
            if let Some(value) = value {
                query.push(
                    form_urlencoded::Serializer::new(String::new())
                        .append_pair(name.as_str(), value)
                        .finish(),
                );
            }
        }
        set_raw_query(&mut url, &query);

        if url.scheme() == INPUT_TYPE {
            Ok(url)
        } else {
            parse_url(&format!("{SCHEME_PREFIX}{url}"))
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The repository URL without query string or fragment.
    pub fn base_url(&self) -> String {
        let mut base = self.url.clone();
        base.set_query(None);
        base.set_fragment(None);
        base.to_string()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn nar_hash(&self) -> Option<&str> {
        self.nar_hash.as_deref()
    }

    pub fn last_modified(&self) -> Option<u64> {
        self.last_modified
    }

    /// An input is locked when both a channel and a state are pinned.
    pub fn is_locked(&self) -> bool {
        matches!(
            (self.channel(), self.state()),
            (Some(channel), Some(state)) if !channel.is_empty() && !state.is_empty()
        )
    }

    pub fn has_all_info(&self) -> bool {
        self.last_modified.is_some()
    }

    /// Local checkout backing a `file://` input that is not pinned.
    pub fn source_path(&self) -> Option<PathBuf> {
        if self.url.scheme() == "file" && self.channel.is_none() && self.state.is_none() {
            self.url.to_file_path().ok()
        } else {
            None
        }
    }
}

impl Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_url() {
            Ok(url) => write!(f, "{url}"),
            Err(_) => write!(f, "{}", self.url),
        }
    }
}

fn parse_url(url: &str) -> Result<Url, ParseError> {
    Url::parse(url).map_err(|error| ParseError::MalformedUrl {
        url: url.to_owned(),
        error,
    })
}

/// A query parameter together with the text it was written as.
struct QueryParam {
    key: String,
    value: String,
    raw: String,
}

fn query_params(url: &Url) -> Vec<QueryParam> {
    url.query()
        .unwrap_or_default()
        .split('&')
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let (key, value) = form_urlencoded::parse(raw.as_bytes())
                .next()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .unwrap_or_default();
            QueryParam {
                key,
                value,
                raw: raw.to_owned(),
            }
        })
        .collect()
}

/// Replaces the query with `params`, joined as written.
fn set_raw_query(url: &mut Url, params: &[String]) {
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&params.join("&")));
    }
}

fn expect_str(name: AttrName, value: &Attr) -> Result<String, ParseError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ParseError::WrongAttributeType {
            name: name.to_string(),
            expected: "a string",
        })
}

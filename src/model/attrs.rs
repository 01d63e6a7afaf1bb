use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute set exchanged with hosts and stored in the cache.
pub type Attrs = BTreeMap<String, Attr>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
    String(String),
    Int(u64),
}

impl Attr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::String(s) => Some(s),
            Attr::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            Attr::Int(i) => Some(*i),
            Attr::String(_) => None,
        }
    }
}

impl Display for Attr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attr::String(s) => write!(f, "\"{s}\""),
            Attr::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<String> for Attr {
    fn from(s: String) -> Self {
        Attr::String(s)
    }
}

impl From<&str> for Attr {
    fn from(s: &str) -> Self {
        Attr::String(s.to_owned())
    }
}

impl From<u64> for Attr {
    fn from(i: u64) -> Self {
        Attr::Int(i)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    #[error("Value mismatch for attribute `{key}` while merging: have {existing}, got {incoming}")]
    AttributeConflict {
        key: String,
        existing: Attr,
        incoming: Attr,
    },
}

/// Builds an attribute set from `(name, value)` pairs.
pub fn attrs<K, V, I>(pairs: I) -> Attrs
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Attr>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

pub fn maybe_get_str<'a>(attrs: &'a Attrs, name: &str) -> Option<&'a str> {
    attrs.get(name).and_then(Attr::as_str)
}

pub fn maybe_get_int(attrs: &Attrs, name: &str) -> Option<u64> {
    attrs.get(name).and_then(Attr::as_int)
}

/// Merges `source` into `dest`, treating keys present on both sides as a
/// consistency check.
///
/// Keys missing from `dest` are inserted, equal values are left alone and a
/// differing value fails with [`MergeError::AttributeConflict`]. On failure
/// `dest` may already contain the keys merged before the conflicting one.
pub fn merge_attrs(dest: &mut Attrs, source: Attrs) -> Result<(), MergeError> {
    for (key, incoming) in source {
        match dest.get(&key) {
            Some(existing) if *existing != incoming => {
                return Err(MergeError::AttributeConflict {
                    key,
                    existing: existing.clone(),
                    incoming,
                });
            }
            Some(_) => {}
            None => {
                dest.insert(key, incoming);
            }
        }
    }
    Ok(())
}

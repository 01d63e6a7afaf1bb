use thiserror::Error;

pub mod attrs;
pub mod input;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unsupported Pijul input attribute `{0}`")]
    UnsupportedAttribute(String),
    #[error("Missing input attribute `{0}`")]
    MissingAttribute(String),
    #[error("Input attribute `{name}` must be {expected}")]
    WrongAttributeType { name: String, expected: &'static str },
    #[error("Malformed URL `{url}`: {error}")]
    MalformedUrl { url: String, error: url::ParseError },
    #[error("Unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
}

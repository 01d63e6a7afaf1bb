use crate::model::{
    attrs::{attrs, Attrs},
    input::INPUT_TYPE,
};

/// Key that ignores any pin and identifies a repository by location.
pub fn impure_key(name: &str, url: &str) -> Attrs {
    attrs([("type", INPUT_TYPE), ("name", name), ("url", url)])
}

/// Key that identifies an exact channel and state.
pub fn locked_key(name: &str, channel: &str, state: &str) -> Attrs {
    let mut key = base_key(name);
    key.extend(attrs([("channel", channel), ("state", state)]));
    key
}

pub(crate) fn base_key(name: &str) -> Attrs {
    attrs([("type", INPUT_TYPE), ("name", name)])
}

pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod model;
pub mod scheme;
pub mod status;
pub mod store;
pub mod tool;

mod api;
mod flock;

pub use api::{Fetched, Pijulfetch, PijulfetchBuilder};

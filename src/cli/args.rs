use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resolves Pijul repository references into content-addressed source trees.
#[derive(Debug, Parser)]
#[command(name = "pijulfetch")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub cmd: Command,
    /// Location of the fetch cache [default: $HOME/.pijulfetch/cache]
    #[arg(long, global = true)]
    pub cache_directory: Option<PathBuf>,
    /// Location of the artifact store [default: $HOME/.pijulfetch/store]
    #[arg(long, global = true)]
    pub store_directory: Option<PathBuf>,
    /// The pijul executable [default: pijul]
    #[arg(long, global = true)]
    pub pijul: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetches a repository and prints where it was stored
    Fetch {
        /// A pijul+https, pijul+http or pijul+ssh URL, optionally with
        /// `channel` and `state` query parameters
        url: String,
        /// Name of the source, used for caching and as the artifact name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Prints the URL pinned to the channel and state a fetch resolves to
    Lock { url: String },
    /// Forgets every cached fetch
    ClearCache,
    /// Deletes every fetched source tree
    ClearStore,
}

use std::process::ExitCode;

use clap::Parser;
use pijulfetch::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{do_clear_cache, do_clear_store, do_fetch, do_lock},
    },
    Pijulfetch,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    let mut builder = Pijulfetch::builder();
    if let Some(path) = cli_args.cache_directory {
        builder = builder.cache_directory(path);
    }
    if let Some(path) = cli_args.store_directory {
        builder = builder.store_directory(path);
    }
    if let Some(program) = cli_args.pijul {
        builder = builder.pijul_program(program);
    }
    let pijulfetch = builder.try_build()?;

    match cli_args.cmd {
        Command::Fetch { url, name } => do_fetch(&pijulfetch, &url, name.as_deref()),
        Command::Lock { url } => do_lock(&pijulfetch, &url),
        Command::ClearCache => do_clear_cache(&pijulfetch),
        Command::ClearStore => do_clear_store(&pijulfetch),
    }
}

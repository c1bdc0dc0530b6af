//! Jumpgate command-line entry point.

mod cli;

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use jumpgate::config::{ConfigStore, Flag, MemoryStore, Settings, TomlStore};

use cli::args::Args;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let (store, store_error) = open_store(&args);
    let settings = Settings::new(store);

    let default_level = if settings.flag(Flag::Logging).unwrap_or(true) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(e) = store_error {
        warn!(error = %e, "settings file unavailable, changes will not be saved");
    }

    let command = match args.command {
        Some(command) => command,
        None => cli::commands::default_command(&settings)?,
    };
    cli::commands::run(command, &settings, args.inventory.as_deref())
}

/// The TOML store at the requested or default path, falling back to memory.
fn open_store(args: &Args) -> (Arc<dyn ConfigStore>, Option<jumpgate::Error>) {
    let Some(path) = args.config.clone().or_else(TomlStore::default_path) else {
        return (Arc::new(MemoryStore::new()), None);
    };
    match TomlStore::open(&path) {
        Ok(store) => (Arc::new(store), None),
        Err(e) => (Arc::new(MemoryStore::new()), Some(e)),
    }
}

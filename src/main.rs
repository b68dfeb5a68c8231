mod adapters;
mod cli;
mod config;
mod core;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn main() {
    let args = Cli::parse();

    init_logging(args.verbose);
    cli::context::init(args.dir.as_deref());

    let result = match &args.command {
        Commands::Init => cli::commands::init::execute(args.verbose),
        Commands::Keys { action } => cli::commands::keys::execute(action),
        Commands::Encrypt {
            file,
            key,
            data,
            store,
            location,
            out,
        } => cli::commands::encrypt::execute(
            file.as_deref(),
            key,
            data.as_deref(),
            *store,
            location.as_deref(),
            out.as_deref(),
        ),
        Commands::Decrypt { file, key, out } => {
            cli::commands::decrypt::execute(file.as_deref(), key.as_deref(), out.as_deref())
        }
        Commands::Retrieve {
            name,
            key,
            location,
            out,
        } => cli::commands::retrieve::execute(
            name,
            key.as_deref(),
            location.as_deref(),
            out.as_deref(),
        ),
        Commands::Files { location } => cli::commands::files::execute(location.as_deref()),
        Commands::Log {
            action,
            since,
            last,
        } => cli::commands::log::execute(action.as_deref(), since.as_deref(), *last),
    };

    if let Err(e) = result {
        cli::output::error(&format!("Error: {e}"));
        std::process::exit(1);
    }
}

/// Structured logs go to stderr; `ENVAULT_LOG` overrides the level.
fn init_logging(verbose: bool) {
    let default = if verbose { "envault=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("ENVAULT_LOG").unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

mod cli;
mod db;
mod error;
mod export;
mod extractor;
mod fmt;
mod grid;
mod importer;
mod index;
mod models;
mod normalize;
mod resolver;
mod settings;

use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use cli::resolve::MatchArgs;
use cli::{Cli, Commands};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let db = cli.db.as_deref();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir, db),
        Commands::Ingest { folder } => cli::ingest::run(&folder, db),
        Commands::Parse { path } => cli::parse::run(&path),
        Commands::Match {
            path,
            set,
            overrides,
            output,
            json,
        } => cli::resolve::run(
            MatchArgs {
                path,
                set,
                overrides,
                output,
                json,
            },
            db,
        ),
        Commands::Status => cli::status::run(db),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

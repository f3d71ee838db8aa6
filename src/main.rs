mod cli;

use std::process;

use tracing_subscriber::EnvFilter;

use courier::config::Config;
use courier::storage::Storage;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("COURIER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            process::exit(1);
        }
    };

    let Some(root) = config
        .storage_root
        .clone()
        .or_else(Storage::default_root)
    else {
        eprintln!("Could not determine home directory.");
        process::exit(1);
    };

    let storage = match Storage::new(root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialize storage: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(&config, &storage) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

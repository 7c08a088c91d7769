//! review-refs binary: list the symbols a working-tree diff touches and the
//! places that reference them, or serve that session over HTTP.

use clap::Parser;
use review_refs::cli::{run, Cli};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("review_refs=info"))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use clap::Parser;
use env_logger::Env;

use nest_egg::api::{Cli, run_cli};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run_cli(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

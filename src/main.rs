use clap::Parser;

use ad_generator::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    // Pick up GOOGLE_API_KEY and friends from a local .env file, if any.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // `serve` sets up its own logging (stderr + server.log).
    if cli.verbose && !matches!(cli.command, Some(Commands::Serve { .. })) {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    }

    if let Err(e) = cli::dispatch(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

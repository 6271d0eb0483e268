//! ISO Fetcher CLI application
//!
//! Command-line interface for downloading OS installation images into a
//! verified local archive.

use std::process;

use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use iso_fetcher::cli::{
    handle_check, handle_delete, handle_discover, handle_download, handle_list, handle_verify,
    Cli, Commands,
};
use iso_fetcher::config::AppConfig;
use iso_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config);

    info!("ISO Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let global = &cli.global;
    match cli.command {
        Commands::Download(args) => handle_download(global, &config, args).await,
        Commands::Verify(args) => handle_verify(global, &config, args).await,
        Commands::List(args) => handle_list(global, &config, args).await,
        Commands::Delete(args) => handle_delete(global, &config, args).await,
        Commands::Check(args) => handle_check(global, &config, args).await,
        Commands::Discover(args) => handle_discover(global, &config, args).await,
    }
}

/// Initialize logging from CLI verbosity flags, else the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let flags = &cli.global;
    let log_level = if flags.quiet || flags.verbose || flags.very_verbose {
        cli.log_level().to_string()
    } else {
        config.logging.level.clone()
    };

    let mut filter = EnvFilter::from_default_env();
    match format!("iso_fetcher={}", log_level).parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log directive: {}", e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}

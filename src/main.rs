use clap::Parser;
use pdfpress::config::Config;
use std::path::PathBuf;

/// Pdfpress - PDF compression service backed by Ghostscript
#[derive(Parser, Debug)]
#[command(name = "pdfpress")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Validate configuration and exit
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging subsystem
    pdfpress::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration: the file when present, defaults plus
    // environment overrides otherwise
    let config = Config::load(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        max_upload_bytes = config.limits.max_upload_bytes,
        rate_limit_quota = config.limits.rate_limit.quota,
        rate_limit_window_secs = config.limits.rate_limit.window_secs,
        auth_enabled = config.auth.api_keys.is_some(),
        "Configuration loaded successfully"
    );

    if args.test {
        return Ok(());
    }

    // Run server forever (blocks until shutdown)
    pdfpress::server::serve(config).await
}

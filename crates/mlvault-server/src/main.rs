//! mlvault-server entry point.

use clap::Parser;
use mlvault_server::ServerConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    let default_level = match config.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let listener = match TcpListener::bind(config.listen).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: cannot listen on {}: {}", config.listen, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        addr = %config.listen,
        root = %config.root.display(),
        deploy_root = %config.deploy_root.display(),
        "mlvault-server listening"
    );

    if let Err(e) = mlvault_server::serve(listener, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

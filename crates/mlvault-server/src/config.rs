//! Server configuration: flags with `MLVAULT_SERVER_*` environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Default upload ceiling for push, deploy and object PUT bodies.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "mlvault-server")]
#[command(about = "HTTP blob service for mlvault assets", version)]
pub struct ServerConfig {
    /// Directory holding pushed objects (`{env}/{name}/{version}/...`)
    #[arg(long, env = "MLVAULT_SERVER_ROOT")]
    pub root: PathBuf,

    /// Directory deployments are unpacked into
    #[arg(long, env = "MLVAULT_SERVER_DEPLOY_ROOT")]
    pub deploy_root: PathBuf,

    /// Address to listen on
    #[arg(long, env = "MLVAULT_SERVER_LISTEN", default_value = "127.0.0.1:8787")]
    pub listen: SocketAddr,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "MLVAULT_SERVER_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ServerConfig {
    /// Config for embedding (tests, other binaries).
    pub fn new(root: impl Into<PathBuf>, deploy_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            deploy_root: deploy_root.into(),
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            verbose: 0,
        }
    }

    /// Create the storage directories if missing.
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.deploy_root)
    }
}

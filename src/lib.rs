mod commands;
pub mod core;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use crate::core::config::IndexConfig;
pub use crate::core::error::{IndexError, IndexResult};
pub use crate::core::session::{IndexService, LoginPoll, SessionState};

/// Command-line entry point.
pub fn run() -> IndexResult<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,geode_index=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = commands::Cli::parse();

    let runtime = tokio::runtime::Runtime::new().map_err(|e| IndexError::Io {
        path: std::path::PathBuf::new(),
        source: e,
    })?;
    runtime.block_on(commands::execute(cli))
}

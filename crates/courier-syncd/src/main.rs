//! courier-syncd - Bidirectional sync daemon between the ERP and the
//! courier delivery service.

mod app;

use std::path::PathBuf;

use clap::Parser;
use sync_config::{init_logging, Config, Paths};

/// Courier sync daemon command-line interface.
#[derive(Parser)]
#[command(name = "courier-syncd")]
#[command(about = "Syncs ERP orders with the courier delivery service")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "COURIER_SYNC_LOG_LEVEL")]
    log_level: String,

    /// Base directory for runtime files (config, database). Defaults to
    /// ~/.courier-sync
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Config file path, overriding the one under the base directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the one under the base directory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Webhook listen address, overriding the configured one
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = match cli.config {
        Some(path) => Config::load_from_file(&path)?,
        None => Config::load(&paths)?,
    };
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    config.validate()?;

    let db_path = cli.db.unwrap_or_else(|| paths.database_file());

    app::run(config, paths, db_path).await
}

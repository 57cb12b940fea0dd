use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tasksync::config::Config;
use tasksync::{logger, server};

#[derive(Parser)]
#[command(name = "tasksync-server", version, about = "Reconciliation server for tasksync clients")]
struct Args {
    /// Use this configuration file instead of the default search path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(url) = args.database_url {
        config.server.database_url = url;
    }
    config.validate()?;

    logger::init(&config.logging)?;
    server::run(config).await
}

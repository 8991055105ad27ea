mod configs;
mod control;
mod duration;
mod errors;
mod eventlog;
mod executor;
mod ui;

use crate::configs::NightfallConfig;
use crate::control::{Controller, SysinfoProvider};
use crate::eventlog::EventLog;
use crate::executor::SystemExecutor;
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "NIGHTFALL_CONFIG",
        value_name = "FILE",
        default_value = "nightfall.yml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let config: NightfallConfig = configs::load_or_default(&args.config)?;

    if std::env::var("NIGHTFALL_LOG").is_err() {
        std::env::set_var("NIGHTFALL_LOG", &config.log_filter);
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("NIGHTFALL_LOG"))
        .with_writer(std::io::stderr)
        .init();

    debug!("{:#?}", config);

    let executor = Arc::new(SystemExecutor::new(config.commands.clone()));
    let log = EventLog::new(config.event_log.clone());
    let controller = Controller::new(executor, Box::new(SysinfoProvider::new()), log, &config);

    // The menu loop blocks on stdin; keep it off the async workers so the
    // background pollers stay responsive.
    tokio::task::spawn_blocking(move || ui::run(controller)).await??;
    Ok(())
}

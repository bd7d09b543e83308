mod analysis;
mod api;
mod capture;
mod db;
mod driver;
mod models;
mod monitor;
mod push;
mod settings;
mod timegrid;
mod webdriver;

#[cfg(test)]
mod testutil;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use db::Database;
use driver::PageDriver;
use monitor::MonitorController;
use push::PushClient;
use settings::Settings;
use webdriver::WebDriverClient;

#[derive(Parser)]
#[command(name = "skywatch", about = "Cloud-coverage monitor for a fixed satellite map region")]
struct Cli {
    /// Path to the JSON settings file. Missing file means defaults.
    #[arg(long, default_value = "skywatch.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the indefinite capture, classify, persist, push loop.
    Monitor,
    /// Serve stored observations over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8003")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    match cli.command {
        Command::Monitor => run_monitor(settings).await,
        Command::Serve { addr } => {
            let db = Database::new(settings.db_path.clone())?;
            api::serve(db, addr).await
        }
    }
}

async fn run_monitor(settings: Settings) -> Result<()> {
    info!("Starting cloud-coverage monitor for {}", settings.city);

    let db = Database::new(settings.db_path.clone())?;

    // A session that cannot be created at all is the one fatal startup error.
    let client = Arc::new(
        WebDriverClient::connect(&settings.webdriver_url)
            .await
            .context("could not create browser session")?,
    );

    let push = Arc::new(PushClient::new(&settings.push_endpoint));
    let settings = Arc::new(settings);

    let mut controller = MonitorController::new();
    let run_result = async {
        let driver: Arc<dyn PageDriver> = client.clone();
        controller.start(driver, db, push, Arc::clone(&settings))?;

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("Shutdown signal received");

        controller.stop().await
    }
    .await;

    // The browser session is released on every exit path, error included.
    if let Err(err) = client.quit().await {
        error!("Failed to close browser session: {err:#}");
    }

    run_result
}

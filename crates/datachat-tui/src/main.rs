use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use datachat_core::{Config, CredentialStore};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "datachat")]
#[command(about = "Transform tabular datasets through a chat-style command session", version)]
struct Cli {
    /// Transformation service base URL
    #[arg(short, long, env = "DATACHAT_SERVER_URL")]
    server: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Directory for the log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Forget the stored login and exit
    #[arg(long)]
    logout: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::new()
    });
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = timeout;
    }

    let level = cli
        .log_level
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let log_dir = match cli.log_dir {
        Some(dir) => dir,
        None => logging::default_log_dir()?,
    };
    let log_path = logging::init(&log_dir, &level)?;
    info!(server = %config.server_url, log = %log_path.display(), "starting datachat");

    let credentials = CredentialStore::default_location()?;
    if cli.logout {
        credentials.clear()?;
        println!("Logged out, removed {}", credentials.path().display());
        return Ok(());
    }

    let app = App::new(config, credentials)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, app).await;
    tui::restore()?;

    result
}

async fn run(terminal: &mut Tui, mut app: App) -> Result<()> {
    let mut events = EventHandler::new();

    if app.screen == app::Screen::Dataset {
        app.refresh_dataset_status();
    }

    loop {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event)?,
            None => break,
        }

        app.poll_job().await;
        app.poll_in_flight().await;
        app.poll_navigation(Instant::now());

        if app.should_quit {
            break;
        }
    }

    info!("exiting");
    Ok(())
}

mod app;
mod cache;
mod catalog;
mod commands;
mod config;
mod error;
mod event;
mod mutation;
mod pagination;
mod request;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::pagination::PaginationMode;

#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(about = "A terminal UI for browsing and editing a paginated product catalog")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shelf/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the catalog API
  #[arg(short, long)]
  base_url: Option<String>,

  /// Products per page
  #[arg(short = 'n', long)]
  page_size: Option<u64>,

  /// How the list loads the collection
  #[arg(short, long, value_enum)]
  mode: Option<PaginationMode>,

  /// Directory for the log file (default: $XDG_DATA_HOME/shelf)
  #[arg(long)]
  log_dir: Option<PathBuf>,
}

/// Log to a daily file; the terminal belongs to the UI.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=shelf=debug).
fn init_tracing(log_dir: Option<PathBuf>) -> Result<WorkerGuard> {
  let dir = log_dir
    .or_else(|| dirs::data_dir().map(|d| d.join("shelf")))
    .ok_or_else(|| eyre!("could not determine a log directory, pass --log-dir"))?;
  std::fs::create_dir_all(&dir)?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    &dir,
    "shelf.log",
  ));
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();
  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_dir)?;

  // Load configuration, then apply command line overrides
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(base_url) = args.base_url {
    config.remote.base_url = base_url;
  }
  if let Some(page_size) = args.page_size {
    config.pagination.page_size = page_size;
  }
  if let Some(mode) = args.mode {
    config.pagination.mode = mode;
  }
  config.validate()?;
  info!(version = env!("CARGO_PKG_VERSION"), "shelf starting");

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}

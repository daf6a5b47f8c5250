//! cadence-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, generates a timeline if the store is empty, and serves the JSON API
//! under `/api`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use cadence_server::{ServerConfig, app, bootstrap};
use cadence_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Cadence timeline server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = ServerConfig::load(&cli.config)?;

  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?;
  let store = Arc::new(store);

  let generator = Arc::new(
    config
      .generator
      .build()
      .context("failed to build text generator")?,
  );
  tracing::info!(backend = generator.name(), "text generator ready");

  if config.bootstrap {
    bootstrap(store.as_ref(), generator.clone(), &config.run).await?;
  }

  let app = app(store, generator, config.run.rules.rationale_window);
  let address = config.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

//! Cadence server: configuration, bootstrap generation, and the HTTP app.
//!
//! The binary in `main.rs` wires these together; they live here so they can
//! be exercised without binding a socket.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use cadence_core::{TextGenerator, schedule::RunSettings, store::TimelineStore};
use cadence_generator::GeneratorConfig;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Server configuration, read from a TOML file layered under `CADENCE_*`
/// environment variables (nested keys use `__`, e.g.
/// `CADENCE_GENERATOR__BACKEND=http`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  /// Generate and store a run at startup when the store is empty.
  pub bootstrap:  bool,
  pub run:        RunSettings,
  pub generator:  GeneratorConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".into(),
      port:       8501,
      store_path: PathBuf::from("cadence.db"),
      bootstrap:  true,
      run:        RunSettings::default(),
      generator:  GeneratorConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` if it exists, then apply environment overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("CADENCE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Startup ─────────────────────────────────────────────────────────────────

/// Fill an empty store with a freshly generated run. Returns whether a run
/// was generated.
pub async fn bootstrap<S, G>(
  store: &S,
  generator: Arc<G>,
  settings: &RunSettings,
) -> anyhow::Result<bool>
where
  S: TimelineStore,
  G: TextGenerator,
{
  if store
    .load_timeline()
    .await
    .context("failed to read stored timeline")?
    .is_some()
  {
    return Ok(false);
  }

  tracing::info!(
    start = %settings.start_date,
    days = settings.days,
    "store is empty, generating a timeline"
  );
  let run = settings
    .generate(generator)
    .await
    .context("invalid run settings")?;
  store.save_run(&run).await.context("failed to save generated run")?;
  Ok(true)
}

/// The full application: the JSON API under `/api` with request tracing.
pub fn app<S, G>(store: Arc<S>, generator: Arc<G>, window: usize) -> Router
where
  S: TimelineStore + 'static,
  G: TextGenerator + 'static,
{
  Router::new()
    .nest("/api", cadence_api::api_router(store, generator, window))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use cadence_core::{generate::TemplateGenerator, store::MemoryStore};
  use cadence_generator::Backend;
  use tower::ServiceExt as _;

  use super::*;

  fn short_run() -> RunSettings {
    RunSettings { days: 20, ..RunSettings::default() }
  }

  #[test]
  fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
      &path,
      r#"
      port = 9000
      bootstrap = false

      [run]
      days = 30

      [run.seeds]
      structure = 42

      [generator]
      backend = "disabled"
      "#,
    )
    .unwrap();

    let config = ServerConfig::load(&path).unwrap();
    assert_eq!(config.port, 9000);
    assert_eq!(config.host, "127.0.0.1");
    assert!(!config.bootstrap);
    assert_eq!(config.run.days, 30);
    assert_eq!(config.run.seeds.structure, Some(42));
    assert_eq!(config.run.rules.travel_week_period, 4);
    assert_eq!(config.generator.backend, Backend::Disabled);
  }

  #[test]
  fn missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.address(), "127.0.0.1:8501");
    assert_eq!(config.run.days, 240);
  }

  #[tokio::test]
  async fn bootstrap_fills_an_empty_store_once() {
    let store = MemoryStore::new();
    let generator = Arc::new(TemplateGenerator);

    assert!(bootstrap(&store, generator.clone(), &short_run()).await.unwrap());
    let first = store.load_timeline().await.unwrap().unwrap();
    assert!(!first.messages.is_empty());

    assert!(!bootstrap(&store, generator, &short_run()).await.unwrap());
    assert_eq!(store.load_timeline().await.unwrap().unwrap(), first);
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(TemplateGenerator);
    bootstrap(store.as_ref(), generator.clone(), &short_run()).await.unwrap();

    let router = app(store, generator, 8);
    let resp = router
      .clone()
      .oneshot(Request::get("/api/timeline/summary").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
      .oneshot(Request::get("/timeline").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}

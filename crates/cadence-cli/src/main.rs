//! `cadence`: generate, inspect, and export coaching timelines.
//!
//! # Usage
//!
//! ```
//! cadence generate --days 120 --seed 42 --out ./viewer-data
//! cadence show
//! cadence validate --db ./cadence.db
//! cadence rationale decision_1a2b3c4d
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cadence_core::schedule::RunSettings;
use cadence_generator::{Backend, GeneratorConfig};
use cadence_store_sqlite::SqliteStore;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cadence", about = "Synthetic coaching conversation timelines")]
struct Args {
  /// Path to a TOML config file (db, [run], [generator]).
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  /// SQLite store to read and write (default: cadence.db).
  #[arg(long, env = "CADENCE_DB", value_name = "PATH", global = true)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Generate a new run and replace the stored one.
  Generate {
    /// First simulated day (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    start: Option<NaiveDate>,

    /// Number of simulated days.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    days: Option<i64>,

    /// Seed for event structure and timing.
    #[arg(long, value_name = "S")]
    seed: Option<u64>,

    /// Seed for message wording.
    #[arg(long, value_name = "S")]
    content_seed: Option<u64>,

    /// Text backend: template, http or disabled.
    #[arg(long)]
    backend: Option<Backend>,

    /// Also write the viewer's JSON files into this directory.
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
  },

  /// Print the stored run's period, statistics and fingerprint.
  Show,

  /// Check the stored run; exits non-zero when anything is wrong.
  Validate,

  /// Re-derive unknown sender roles from the cast.
  RepairRoles,

  /// Print one decision's rationale as JSON.
  Rationale {
    #[arg(value_name = "DECISION_ID")]
    decision_id: String,
  },

  /// Write the stored run into the viewer's JSON layout.
  Export {
    #[arg(long, value_name = "DIR")]
    out: PathBuf,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
  db:        Option<PathBuf>,
  run:       RunSettings,
  generator: GeneratorConfig,
}

impl ConfigFile {
  fn read(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg = match &args.config {
    Some(path) => ConfigFile::read(path)?,
    None => ConfigFile::default(),
  };

  // CLI flags override the config file, which overrides defaults.
  let db = args
    .db
    .or(file_cfg.db)
    .unwrap_or_else(|| PathBuf::from("cadence.db"));
  let store = SqliteStore::open(&db)
    .await
    .with_context(|| format!("opening store {}", db.display()))?;

  match args.command {
    Command::Generate { start, days, seed, content_seed, backend, out } => {
      let mut settings = file_cfg.run;
      if let Some(start) = start {
        settings.start_date = start;
      }
      if let Some(days) = days {
        settings.days = days;
      }
      if seed.is_some() {
        settings.seeds.structure = seed;
      }
      if content_seed.is_some() {
        settings.seeds.content = content_seed;
      }
      let mut generator = file_cfg.generator;
      if let Some(backend) = backend {
        generator.backend = backend;
      }

      let run = commands::generate(&store, &settings, &generator, out.as_deref()).await?;
      println!(
        "generated {} messages and {} rationales into {}",
        run.timeline.messages.len(),
        run.rationales.len(),
        db.display()
      );
      if let Some(out) = out {
        println!("viewer files written to {}", out.display());
      }
    }
    Command::Show => {
      let summary = commands::show(&store, &db).await?;
      print!("{summary}");
    }
    Command::Validate => {
      let violations = commands::validate(&store, &db, &file_cfg.run.cast).await?;
      if violations.is_empty() {
        println!("ok");
      } else {
        for v in &violations {
          println!("{v}");
        }
        anyhow::bail!("{} problem(s) found in {}", violations.len(), db.display());
      }
    }
    Command::RepairRoles => {
      let repaired = commands::repair_roles(&store, &db, &file_cfg.run.cast).await?;
      println!("repaired {repaired} message role(s)");
    }
    Command::Rationale { decision_id } => {
      let rationale = commands::rationale(&store, &decision_id).await?;
      println!("{}", serde_json::to_string_pretty(&rationale)?);
    }
    Command::Export { out } => {
      let run = commands::export(&store, &db, &out).await?;
      println!(
        "exported {} messages and {} rationales to {}",
        run.timeline.messages.len(),
        run.rationales.len(),
        out.display()
      );
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generate_flags_parse() {
    let args = Args::try_parse_from([
      "cadence",
      "--db",
      "x.db",
      "generate",
      "--start",
      "2025-03-01",
      "--days",
      "30",
      "--seed",
      "7",
      "--backend",
      "disabled",
    ])
    .unwrap();
    assert_eq!(args.db.as_deref(), Some(Path::new("x.db")));
    let Command::Generate { start, days, seed, content_seed, backend, out } = args.command
    else {
      panic!("expected generate");
    };
    assert_eq!(start, NaiveDate::from_ymd_opt(2025, 3, 1));
    assert_eq!(days, Some(30));
    assert_eq!(seed, Some(7));
    assert_eq!(content_seed, None);
    assert_eq!(backend, Some(Backend::Disabled));
    assert!(out.is_none());
  }

  #[test]
  fn unknown_backend_is_rejected() {
    assert!(Args::try_parse_from(["cadence", "generate", "--backend", "gpt"]).is_err());
  }

  #[test]
  fn export_requires_out() {
    assert!(Args::try_parse_from(["cadence", "export"]).is_err());
  }

  #[test]
  fn config_file_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.toml");
    std::fs::write(
      &path,
      r#"
      db = "runs/demo.db"

      [run]
      start_date = "2025-02-01"
      days = 60

      [run.rules]
      adherence_prob = 0.8

      [generator]
      backend = "disabled"
      "#,
    )
    .unwrap();

    let cfg = ConfigFile::read(&path).unwrap();
    assert_eq!(cfg.db.as_deref(), Some(Path::new("runs/demo.db")));
    assert_eq!(cfg.run.days, 60);
    assert_eq!(cfg.run.rules.adherence_prob, 0.8);
    assert_eq!(cfg.run.rules.travel_week_period, 4);
    assert_eq!(cfg.generator.backend, Backend::Disabled);
  }
}

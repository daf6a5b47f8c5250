//! Subcommand bodies. Each takes an open store and returns what `main`
//! prints, so they can be tested without a terminal.

use std::{fmt, path::Path, sync::Arc};

use anyhow::{Context, Result};
use cadence_core::{
  decision::{DecisionId, Rationale, RationaleBook},
  member::Cast,
  schedule::RunSettings,
  store::TimelineStore,
  timeline::{GeneratedRun, Period, Timeline, TimelineStats},
  validate::{Violation, repair_roles as repair, validate_with_cast},
};
use cadence_generator::GeneratorConfig;
use cadence_store_file::FileStore;
use cadence_store_sqlite::SqliteStore;

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn load_timeline(store: &SqliteStore, db: &Path) -> Result<Timeline> {
  store
    .load_timeline()
    .await
    .context("reading stored timeline")?
    .ok_or_else(|| cadence_core::Error::no_timeline(db.display()).into())
}

async fn load_run(store: &SqliteStore, db: &Path) -> Result<GeneratedRun> {
  let timeline = load_timeline(store, db).await?;
  let rationales: RationaleBook = store
    .list_rationales()
    .await
    .context("reading stored rationales")?
    .into_iter()
    .collect();
  Ok(GeneratedRun { timeline, rationales })
}

// ─── generate ─────────────────────────────────────────────────────────────────

/// Generate a run, replace the stored one, and optionally write the viewer
/// files to `out`.
pub async fn generate(
  store: &SqliteStore,
  settings: &RunSettings,
  generator: &GeneratorConfig,
  out: Option<&Path>,
) -> Result<GeneratedRun> {
  let generator = Arc::new(generator.build().context("building text generator")?);
  tracing::info!(
    backend = generator.name(),
    start = %settings.start_date,
    days = settings.days,
    "generating timeline"
  );

  let run = settings.generate(generator).await.context("invalid run settings")?;
  store.save_run(&run).await.context("saving run")?;

  if let Some(out) = out {
    FileStore::new(out)
      .save_run(&run)
      .await
      .with_context(|| format!("writing viewer files to {}", out.display()))?;
  }
  Ok(run)
}

// ─── show ─────────────────────────────────────────────────────────────────────

/// What `cadence show` prints.
#[derive(Debug)]
pub struct Summary {
  pub period:      Period,
  pub stats:       TimelineStats,
  pub decisions:   usize,
  pub fingerprint: String,
}

impl fmt::Display for Summary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "period:       {} (+{} days)", self.period.start_date, self.period.days)?;
    writeln!(f, "messages:     {}", self.stats.total_messages)?;
    writeln!(f, "from member:  {}", self.stats.member_messages)?;
    writeln!(
      f,
      "member rate:  {:.1}/week",
      self.stats.estimated_member_messages_per_week
    )?;
    match self.stats.adherence_pct_observed {
      Some(pct) => writeln!(f, "adherence:    {pct:.1}%")?,
      None => writeln!(f, "adherence:    n/a")?,
    }
    writeln!(f, "decisions:    {}", self.decisions)?;
    writeln!(f, "fingerprint:  {}", self.fingerprint)
  }
}

pub async fn show(store: &SqliteStore, db: &Path) -> Result<Summary> {
  let timeline = load_timeline(store, db).await?;
  let decisions = store.list_rationales().await.context("reading rationales")?.len();
  Ok(Summary {
    period: timeline.period,
    stats: timeline.meta.clone(),
    decisions,
    fingerprint: timeline.fingerprint()?,
  })
}

// ─── validate / repair-roles ──────────────────────────────────────────────────

pub async fn validate(store: &SqliteStore, db: &Path, cast: &Cast) -> Result<Vec<Violation>> {
  let run = load_run(store, db).await?;
  Ok(validate_with_cast(&run.timeline, &run.rationales, cast))
}

/// Repair unknown roles in place. The stored timeline is only rewritten when
/// something changed.
pub async fn repair_roles(store: &SqliteStore, db: &Path, cast: &Cast) -> Result<usize> {
  let mut timeline = load_timeline(store, db).await?;
  let repaired = repair(&mut timeline, cast);
  if repaired > 0 {
    store.save_timeline(&timeline).await.context("saving repaired timeline")?;
  }
  Ok(repaired)
}

// ─── rationale / export ───────────────────────────────────────────────────────

pub async fn rationale(store: &SqliteStore, decision_id: &str) -> Result<Rationale> {
  let id = DecisionId::new(decision_id);
  store
    .get_rationale(&id)
    .await
    .context("reading rationale")?
    .with_context(|| format!("no rationale recorded for {id}"))
}

/// Copy the stored run into the viewer's JSON layout under `out`.
pub async fn export(store: &SqliteStore, db: &Path, out: &Path) -> Result<GeneratedRun> {
  let run = load_run(store, db).await?;
  FileStore::new(out)
    .save_run(&run)
    .await
    .with_context(|| format!("exporting to {}", out.display()))?;
  Ok(run)
}

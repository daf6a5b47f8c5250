//! [`FileStore`], a directory of JSON documents implementing
//! [`TimelineStore`].

use std::{
  fs,
  io::{self, Write as _},
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::Serialize;
use tokio::sync::RwLock;

use cadence_core::{
  decision::{DecisionId, Rationale},
  store::TimelineStore,
  timeline::{GeneratedRun, Timeline},
};

use crate::{Error, Result};

pub const MESSAGES_FILE: &str = "messages.json";
pub const DECISIONS_DIR: &str = "decisions";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A timeline store rooted at one directory.
///
/// The store owns `messages.json` and `decisions/` under the root and
/// nothing else; other files in the directory are left untouched. Writers
/// within the process are serialised by a lock. A full run replacement
/// stages the new `decisions/` inside the root and swaps it in by rename,
/// then replaces `messages.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
  root: PathBuf,
  lock: Arc<RwLock<()>>,
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into(), lock: Arc::default() }
  }

  pub fn root(&self) -> &Path { &self.root }

  pub fn messages_path(&self) -> PathBuf { self.root.join(MESSAGES_FILE) }

  /// Where the rationale for `id` lives, or `None` if the id cannot be used
  /// as a file name.
  pub fn rationale_path(&self, id: &DecisionId) -> Option<PathBuf> {
    rationale_path(&self.root, id)
  }

  async fn blocking<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
  {
    let root = self.root.clone();
    tokio::task::spawn_blocking(move || f(root)).await?
  }
}

/// The file name for `id` inside `decisions/`, if the id is usable as one.
fn rationale_file(id: &DecisionId) -> Option<String> {
  let safe = !id.as_str().is_empty()
    && id
      .as_str()
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
  safe.then(|| format!("{id}.json"))
}

fn rationale_path(root: &Path, id: &DecisionId) -> Option<PathBuf> {
  rationale_file(id).map(|name| root.join(DECISIONS_DIR).join(name))
}

// ─── Blocking helpers ────────────────────────────────────────────────────────

fn to_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>> {
  let mut bytes = serde_json::to_vec_pretty(value)?;
  bytes.push(b'\n');
  Ok(bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
  fs::write(path, bytes).map_err(Error::io(path))
}

/// Write every rationale of `run` into `dir`, which must exist.
fn write_decisions(dir: &Path, run: &GeneratedRun) -> Result<()> {
  for r in run.rationales.iter() {
    let name = rationale_file(&r.decision_id)
      .ok_or_else(|| Error::UnusableId(r.decision_id.clone()))?;
    write_file(&dir.join(name), &to_pretty(r)?)?;
  }
  Ok(())
}

fn parent_of(root: &Path) -> Result<PathBuf> {
  match root.parent() {
    Some(p) if p.as_os_str().is_empty() => Ok(PathBuf::from(".")),
    Some(p) => Ok(p.to_path_buf()),
    None => Err(Error::NoParent(root.to_path_buf())),
  }
}

/// Move `fresh` to `target`, parking whatever was at `target` inside
/// `retired`. If the second rename fails the parked directory is moved back,
/// so `target` is never left missing. Returns where the old directory was
/// parked.
fn swap_dir(fresh: &Path, target: &Path, retired: &Path) -> Result<Option<PathBuf>> {
  let parked = retired.join("previous");
  let had_old = match fs::rename(target, &parked) {
    Ok(()) => true,
    Err(e) if e.kind() == io::ErrorKind::NotFound => false,
    Err(e) => return Err(Error::io(target)(e)),
  };
  if let Err(e) = fs::rename(fresh, target) {
    if had_old {
      if let Err(undo) = fs::rename(&parked, target) {
        tracing::error!(
          dir = %target.display(),
          error = %undo,
          "could not restore previous directory"
        );
      }
    }
    return Err(Error::io(target)(e));
  }
  Ok(had_old.then_some(parked))
}

/// Replace the run under `root`. Only `messages.json` and `decisions/` are
/// touched; anything else in `root` is left alone.
fn replace_run(root: &Path, run: &GeneratedRun) -> Result<()> {
  fs::create_dir_all(root).map_err(Error::io(root))?;
  let messages = to_pretty(&run.timeline)?;

  // Dropping these removes staging leftovers and the retired decisions.
  let staging = tempfile::Builder::new()
    .prefix(".cadence-staging-")
    .tempdir_in(root)
    .map_err(Error::io(root))?;
  let retired = tempfile::Builder::new()
    .prefix(".cadence-retired-")
    .tempdir_in(root)
    .map_err(Error::io(root))?;

  let fresh = staging.path().join(DECISIONS_DIR);
  fs::create_dir(&fresh).map_err(Error::io(&fresh))?;
  write_decisions(&fresh, run)?;

  let decisions = root.join(DECISIONS_DIR);
  let parked = swap_dir(&fresh, &decisions, retired.path())?;

  if let Err(e) = replace_file(&root.join(MESSAGES_FILE), &messages) {
    // Restore the previous decisions.
    let undone = fs::rename(&decisions, &fresh)
      .and_then(|()| match &parked {
        Some(parked) => fs::rename(parked, &decisions),
        None => Ok(()),
      });
    if let Err(undo) = undone {
      tracing::error!(root = %root.display(), error = %undo, "could not roll back decisions");
    }
    return Err(e);
  }
  Ok(())
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers see either the old or the new content.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
  let dir = parent_of(path)?;
  fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
  let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(Error::io(&dir))?;
  tmp.write_all(bytes).map_err(Error::io(tmp.path()))?;
  tmp.persist(path).map_err(|e| Error::io(path)(e.error))?;
  Ok(())
}

/// Create `path` with `bytes` unless it already exists. The content is fully
/// written before the name appears.
fn create_new(path: &Path, bytes: &[u8]) -> Result<bool> {
  let dir = parent_of(path)?;
  fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
  let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(Error::io(&dir))?;
  tmp.write_all(bytes).map_err(Error::io(tmp.path()))?;
  match fs::hard_link(tmp.path(), path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
    Err(e) => Err(Error::io(path)(e)),
  }
}

/// Read a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<String>> {
  match fs::read_to_string(path) {
    Ok(text) => Ok(Some(text)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(Error::io(path)(e)),
  }
}

fn parse<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
  serde_json::from_str(text).map_err(|e| cadence_core::Error::malformed(text, &e).into())
}

fn read_rationales(root: &Path) -> Result<Vec<Rationale>> {
  let dir = root.join(DECISIONS_DIR);
  let entries = match fs::read_dir(&dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(Error::io(&dir)(e)),
  };

  let mut out = Vec::new();
  for entry in entries {
    let path = entry.map_err(Error::io(&dir))?.path();
    let is_record = path.extension().is_some_and(|ext| ext == "json")
      && path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    if !is_record {
      continue;
    }
    let text = fs::read_to_string(&path).map_err(Error::io(&path))?;
    out.push(parse::<Rationale>(&text)?);
  }
  out.sort_by(|a, b| a.decision_id.cmp(&b.decision_id));
  Ok(out)
}

// ─── TimelineStore impl ──────────────────────────────────────────────────────

impl TimelineStore for FileStore {
  type Error = Error;

  async fn save_run(&self, run: &GeneratedRun) -> Result<()> {
    let _guard = self.lock.write().await;
    let run = run.clone();
    self.blocking(move |root| replace_run(&root, &run)).await?;
    tracing::debug!(root = %self.root.display(), "run written");
    Ok(())
  }

  async fn save_timeline(&self, timeline: &Timeline) -> Result<()> {
    let _guard = self.lock.write().await;
    let bytes = to_pretty(timeline)?;
    self
      .blocking(move |root| replace_file(&root.join(MESSAGES_FILE), &bytes))
      .await
  }

  async fn load_timeline(&self) -> Result<Option<Timeline>> {
    let _guard = self.lock.read().await;
    let text = self
      .blocking(|root| read_optional(&root.join(MESSAGES_FILE)))
      .await?;
    text.as_deref().map(parse::<Timeline>).transpose()
  }

  async fn get_rationale(&self, id: &DecisionId) -> Result<Option<Rationale>> {
    let Some(path) = self.rationale_path(id) else {
      return Ok(None);
    };
    let _guard = self.lock.read().await;
    let text = self.blocking(move |_| read_optional(&path)).await?;
    text.as_deref().map(parse::<Rationale>).transpose()
  }

  async fn insert_rationale(&self, rationale: Rationale) -> Result<bool> {
    let path = self
      .rationale_path(&rationale.decision_id)
      .ok_or_else(|| Error::UnusableId(rationale.decision_id.clone()))?;
    let bytes = to_pretty(&rationale)?;
    let _guard = self.lock.write().await;
    self.blocking(move |_| create_new(&path, &bytes)).await
  }

  async fn list_rationales(&self) -> Result<Vec<Rationale>> {
    let _guard = self.lock.read().await;
    self.blocking(|root| read_rationales(&root)).await
  }
}

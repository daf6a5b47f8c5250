//! The `TimelineStore` trait, message queries, and an in-memory backend.
//!
//! Storage backends (`cadence-store-sqlite`, `cadence-store-file`) implement
//! the trait. The API and CLI depend on this abstraction only.

use std::{
  convert::Infallible,
  future::Future,
  sync::{PoisonError, RwLock},
};

use serde::Deserialize;

use crate::{
  decision::{DecisionId, Rationale, RationaleBook},
  member::Role,
  message::Message,
  timeline::{GeneratedRun, Timeline},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Filters for listing messages out of a timeline. Every set field must
/// match; paging applies after filtering.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageQuery {
  pub sender_role: Option<Role>,
  pub tag:         Option<String>,
  pub decision_id: Option<DecisionId>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

impl MessageQuery {
  pub fn matches(&self, m: &Message) -> bool {
    self.sender_role.is_none_or(|r| m.sender_role == r)
      && self.tag.as_deref().is_none_or(|t| m.has_tag(t))
      && self
        .decision_id
        .as_ref()
        .is_none_or(|id| m.decision_id.as_ref() == Some(id))
  }

  pub fn apply<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
    messages
      .iter()
      .filter(|m| self.matches(m))
      .skip(self.offset.unwrap_or(0))
      .take(self.limit.unwrap_or(usize::MAX))
      .collect()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Persistence for one generated run: a timeline plus its rationale records.
///
/// Runs are replaced whole; readers never see a mix of two runs. Rationales
/// are insert-only: once stored, a record for a decision id never changes.
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers on a multi-threaded runtime.
pub trait TimelineStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Atomically replace the stored timeline and all rationales with `run`.
  fn save_run<'a>(
    &'a self,
    run: &'a GeneratedRun,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the stored timeline, keeping rationales. Used by the role repair
  /// pass.
  fn save_timeline<'a>(
    &'a self,
    timeline: &'a Timeline,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The stored timeline, or `None` if nothing has been saved yet.
  fn load_timeline(
    &self,
  ) -> impl Future<Output = Result<Option<Timeline>, Self::Error>> + Send + '_;

  fn get_rationale<'a>(
    &'a self,
    id: &'a DecisionId,
  ) -> impl Future<Output = Result<Option<Rationale>, Self::Error>> + Send + 'a;

  /// Store a rationale unless one already exists for its id. Returns whether
  /// it was inserted.
  fn insert_rationale(
    &self,
    rationale: Rationale,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All stored rationales, ordered by decision id.
  fn list_rationales(
    &self,
  ) -> impl Future<Output = Result<Vec<Rationale>, Self::Error>> + Send + '_;
}

// ─── In-memory backend ───────────────────────────────────────────────────────

/// A [`TimelineStore`] held in process memory. Used by tests and for
/// generate-and-serve sessions that need no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: RwLock<Stored>,
}

#[derive(Debug, Default)]
struct Stored {
  timeline:   Option<Timeline>,
  rationales: RationaleBook,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub fn with_run(run: GeneratedRun) -> Self {
    Self {
      inner: RwLock::new(Stored {
        timeline:   Some(run.timeline),
        rationales: run.rationales,
      }),
    }
  }
}

impl TimelineStore for MemoryStore {
  type Error = Infallible;

  async fn save_run(&self, run: &GeneratedRun) -> Result<(), Infallible> {
    *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Stored {
      timeline:   Some(run.timeline.clone()),
      rationales: run.rationales.clone(),
    };
    Ok(())
  }

  async fn save_timeline(&self, timeline: &Timeline) -> Result<(), Infallible> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner).timeline =
      Some(timeline.clone());
    Ok(())
  }

  async fn load_timeline(&self) -> Result<Option<Timeline>, Infallible> {
    Ok(self.inner.read().unwrap_or_else(PoisonError::into_inner).timeline.clone())
  }

  async fn get_rationale(&self, id: &DecisionId) -> Result<Option<Rationale>, Infallible> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    Ok(inner.rationales.get(id).cloned())
  }

  async fn insert_rationale(&self, rationale: Rationale) -> Result<bool, Infallible> {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    Ok(inner.rationales.insert(rationale).is_ok())
  }

  async fn list_rationales(&self) -> Result<Vec<Rationale>, Infallible> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    Ok(inner.rationales.iter().cloned().collect())
  }
}

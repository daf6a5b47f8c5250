//! The finished output of a scheduler run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  Result,
  decision::RationaleBook,
  member::{Member, Role},
  message::Message,
};

/// The covered date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
  pub start_date: NaiveDate,
  pub days:       u32,
}

/// Aggregates computed from the final message set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStats {
  pub total_messages:                     usize,
  pub member_messages:                    usize,
  /// The configured rate, echoed for the viewer.
  pub estimated_member_messages_per_week: f64,
  /// Share of status updates reporting adherence, as a percentage in
  /// `0.0..=100.0`. `None` when the run contains no status update.
  pub adherence_pct_observed:             Option<f64>,
}

impl TimelineStats {
  pub fn compute(messages: &[Message], member_msgs_per_week: f64) -> Self {
    let member_messages = messages
      .iter()
      .filter(|m| m.sender_role == Role::Member)
      .count();

    let (adhered, missed) =
      messages.iter().fold((0usize, 0usize), |(a, m), msg| {
        match msg.meta.adherence_flag {
          Some(true) => (a + 1, m),
          Some(false) => (a, m + 1),
          None => (a, m),
        }
      });

    let observed = adhered + missed;
    let adherence_pct_observed =
      (observed > 0).then(|| adhered as f64 * 100.0 / observed as f64);

    Self {
      total_messages: messages.len(),
      member_messages,
      estimated_member_messages_per_week: member_msgs_per_week,
      adherence_pct_observed,
    }
  }
}

/// Member, period, statistics and the ordered message list.
///
/// Built once per run and published whole; nothing observes a partially built
/// timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
  pub member:       Member,
  pub generated_at: DateTime<Utc>,
  pub period:       Period,
  pub meta:         TimelineStats,
  pub messages:     Vec<Message>,
}

impl Timeline {
  /// SHA-256 over the canonical JSON form, hex encoded.
  ///
  /// Two timelines with the same fingerprint serialise to the same bytes.
  pub fn fingerprint(&self) -> Result<String> {
    let bytes = serde_json::to_vec(self)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
  }

  pub fn message(&self, id: u64) -> Option<&Message> {
    // Ids are dense and 1-based in a finished timeline; fall back to a scan
    // for data that came from elsewhere.
    let idx = usize::try_from(id).ok()?.checked_sub(1)?;
    match self.messages.get(idx) {
      Some(m) if m.id == id => Some(m),
      _ => self.messages.iter().find(|m| m.id == id),
    }
  }

  /// Up to `window` messages strictly before message `id`, oldest first.
  pub fn preceding(&self, id: u64, window: usize) -> &[Message] {
    let Some(end) = self.messages.iter().position(|m| m.id == id) else {
      return &[];
    };
    &self.messages[end.saturating_sub(window)..end]
  }
}

/// Everything a scheduler run produces, published as one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRun {
  pub timeline:   Timeline,
  pub rationales: RationaleBook,
}

//! Decisions and their rationale records.
//!
//! A decision has no record of its own: it exists as the `decision_id` shared
//! by the messages that announce it, plus exactly one [`Rationale`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── DecisionId ──────────────────────────────────────────────────────────────

/// Identifier linking announcing messages to their rationale,
/// e.g. `decision_test_3fa81c09`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DecisionId(String);

impl DecisionId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  /// Build an id from a kind prefix and 32 random bits.
  pub fn from_bits(kind: DecisionKind, bits: u32) -> Self {
    Self(format!("{}_{bits:08x}", kind.id_prefix()))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The kind encoded in the id prefix. Ids minted elsewhere count as
  /// clinical.
  pub fn kind(&self) -> DecisionKind {
    let panel = DecisionKind::DiagnosticPanel.id_prefix();
    if self.0.strip_prefix(panel).is_some_and(|rest| rest.starts_with('_')) {
      DecisionKind::DiagnosticPanel
    } else {
      DecisionKind::Clinical
    }
  }
}

impl std::fmt::Display for DecisionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Kind & confidence ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
  /// A periodic lab panel: scheduled, then reported a day later.
  DiagnosticPanel,
  /// An ad-hoc clinical recommendation, e.g. a supplement trial.
  Clinical,
}

impl DecisionKind {
  pub fn id_prefix(self) -> &'static str {
    match self {
      Self::DiagnosticPanel => "decision_test",
      Self::Clinical => "decision",
    }
  }

  /// The follow-up actions attached to every rationale of this kind.
  pub fn next_steps(self) -> Vec<String> {
    let steps: &[&str] = match self {
      Self::DiagnosticPanel => {
        &["Monitor adherence", "Recheck at next 3-month panel"]
      }
      Self::Clinical => {
        &["Monitor labs", "Reinforce adherence", "Follow-up in 6 weeks"]
      }
    };
    steps.iter().map(|s| (*s).to_owned()).collect()
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  Low,
  #[default]
  Medium,
  High,
}

// ─── Rationale ───────────────────────────────────────────────────────────────

/// The justification for one decision. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
  pub decision_id:     DecisionId,
  pub kind:            DecisionKind,
  pub rationale:       String,
  pub confidence:      Confidence,
  /// Never empty.
  pub next_steps:      Vec<String>,
  /// Texts of the most recent messages the rationale was derived from.
  #[serde(default)]
  pub context_excerpt: Vec<String>,
  pub created_at:      DateTime<Utc>,
}

// ─── RationaleBook ───────────────────────────────────────────────────────────

/// Insert-only map of rationales keyed by decision id.
///
/// Ordered so that serialising a book is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RationaleBook(BTreeMap<DecisionId, Rationale>);

impl RationaleBook {
  pub fn new() -> Self { Self::default() }

  /// Record `rationale`. An existing record for the same id is never
  /// replaced.
  pub fn insert(&mut self, rationale: Rationale) -> Result<()> {
    if self.0.contains_key(&rationale.decision_id) {
      return Err(Error::RationaleExists(rationale.decision_id));
    }
    self.0.insert(rationale.decision_id.clone(), rationale);
    Ok(())
  }

  pub fn get(&self, id: &DecisionId) -> Option<&Rationale> { self.0.get(id) }

  pub fn contains(&self, id: &DecisionId) -> bool { self.0.contains_key(id) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &Rationale> { self.0.values() }
}

impl FromIterator<Rationale> for RationaleBook {
  /// Later duplicates are dropped, keeping the first record for each id.
  fn from_iter<I: IntoIterator<Item = Rationale>>(iter: I) -> Self {
    let mut book = Self::new();
    for r in iter {
      let _ = book.insert(r);
    }
    book
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn rationale(id: &str, text: &str) -> Rationale {
    Rationale {
      decision_id:     DecisionId::new(id),
      kind:            DecisionKind::Clinical,
      rationale:       text.into(),
      confidence:      Confidence::Medium,
      next_steps:      DecisionKind::Clinical.next_steps(),
      context_excerpt: vec![],
      created_at:      Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  #[test]
  fn ids_carry_kind_prefix() {
    let id = DecisionId::from_bits(DecisionKind::DiagnosticPanel, 0xbeef);
    assert_eq!(id.as_str(), "decision_test_0000beef");
    let id = DecisionId::from_bits(DecisionKind::Clinical, 0x1234_abcd);
    assert_eq!(id.as_str(), "decision_1234abcd");
  }

  #[test]
  fn kind_is_recovered_from_prefix() {
    let panel = DecisionId::from_bits(DecisionKind::DiagnosticPanel, 1);
    assert_eq!(panel.kind(), DecisionKind::DiagnosticPanel);
    let clinical = DecisionId::from_bits(DecisionKind::Clinical, 1);
    assert_eq!(clinical.kind(), DecisionKind::Clinical);
    assert_eq!(DecisionId::new("decision_testing").kind(), DecisionKind::Clinical);
  }

  #[test]
  fn book_refuses_to_overwrite() {
    let mut book = RationaleBook::new();
    book.insert(rationale("decision_1", "first")).unwrap();

    let err = book.insert(rationale("decision_1", "second")).unwrap_err();
    assert!(matches!(err, Error::RationaleExists(_)));

    let kept = book.get(&DecisionId::new("decision_1")).unwrap();
    assert_eq!(kept.rationale, "first");
    assert_eq!(book.len(), 1);
  }

  #[test]
  fn every_kind_has_next_steps() {
    assert!(!DecisionKind::Clinical.next_steps().is_empty());
    assert!(!DecisionKind::DiagnosticPanel.next_steps().is_empty());
  }
}

//! Justification records for decisions.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
  Result,
  decision::{Confidence, DecisionId, DecisionKind, Rationale, RationaleBook},
  factory::trim_sentences,
  generate::{Intent, Sampling, TextGenerator},
  message::Message,
};

/// Default number of preceding messages a rationale is derived from.
pub const DEFAULT_WINDOW: usize = 8;

/// How many message texts are quoted in [`Rationale::context_excerpt`].
const EXCERPT_LEN: usize = 6;

const RATIONALE_SAMPLING: Sampling =
  Sampling { temperature: 0.0, max_tokens: 250 };

/// Adherence outcomes reported in a context window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Adherence {
  adhered: usize,
  missed:  usize,
}

impl Adherence {
  fn observe(context: &[Message]) -> Self {
    context.iter().fold(Self::default(), |acc, m| match m.meta.adherence_flag {
      Some(true) => Self { adhered: acc.adhered + 1, ..acc },
      Some(false) => Self { missed: acc.missed + 1, ..acc },
      None => acc,
    })
  }

  fn total(self) -> usize { self.adhered + self.missed }

  /// Clear majorities over at least two observations move confidence off
  /// medium.
  fn confidence(self) -> Confidence {
    if self.total() < 2 {
      return Confidence::Medium;
    }
    let share = self.adhered as f64 / self.total() as f64;
    if share >= 0.75 {
      Confidence::High
    } else if share <= 0.25 {
      Confidence::Low
    } else {
      Confidence::Medium
    }
  }
}

pub struct RationaleGenerator<G> {
  generator: Arc<G>,
  window:    usize,
}

impl<G: TextGenerator> RationaleGenerator<G> {
  pub fn new(generator: Arc<G>, window: usize) -> Self {
    Self { generator, window: window.max(1) }
  }

  pub fn window(&self) -> usize { self.window }

  /// Build the rationale for `decision_id` from the most recent messages of
  /// `context` (oldest first). Deterministic for a deterministic generator.
  ///
  /// `created_at` is the moment of the decision, not wall-clock time.
  pub async fn synthesize(
    &self,
    decision_id: &DecisionId,
    kind: DecisionKind,
    context: &[Message],
    created_at: DateTime<Utc>,
  ) -> Rationale {
    let window = &context[context.len().saturating_sub(self.window)..];
    let adherence = Adherence::observe(window);

    let prompt = Intent::Rationale.prompt(&prompt_body(decision_id, kind, window));
    let text = match self.generator.generate(&prompt, RATIONALE_SAMPLING).await {
      Ok(raw) => trim_sentences(&raw, 3),
      Err(e) => {
        tracing::debug!(%decision_id, error = %e, "rationale generation degraded");
        String::new()
      }
    };
    let text = if text.is_empty() {
      fallback_rationale(decision_id, kind, adherence)
    } else {
      text
    };

    Rationale {
      decision_id: decision_id.clone(),
      kind,
      rationale: text,
      confidence: adherence.confidence(),
      next_steps: kind.next_steps(),
      context_excerpt: window[window.len().saturating_sub(EXCERPT_LEN)..]
        .iter()
        .map(|m| m.text.clone())
        .collect(),
      created_at,
    }
  }

  /// Synthesize and insert into `book`. An id that already has a rationale
  /// is refused before any generation happens.
  pub async fn record(
    &self,
    book: &mut RationaleBook,
    decision_id: &DecisionId,
    kind: DecisionKind,
    context: &[Message],
    created_at: DateTime<Utc>,
  ) -> Result<()> {
    if book.contains(decision_id) {
      return Err(crate::Error::RationaleExists(decision_id.clone()));
    }
    let rationale = self.synthesize(decision_id, kind, context, created_at).await;
    book.insert(rationale)
  }
}

fn prompt_body(
  decision_id: &DecisionId,
  kind: DecisionKind,
  window: &[Message],
) -> String {
  let about = match kind {
    DecisionKind::DiagnosticPanel => "a diagnostic panel result",
    DecisionKind::Clinical => "a clinical recommendation",
  };
  let thread = window
    .iter()
    .map(|m| format!("{} | {}: {}", m.timestamp.to_rfc3339(), m.sender, m.text))
    .collect::<Vec<_>>()
    .join("\n");
  format!(
    "You are a clinical assistant writing a concise rationale for decision \
     {decision_id}, {about}. Use the recent message thread below. Keep it to \
     two or three sentences.\n\nRecent messages:\n{thread}"
  )
}

fn fallback_rationale(
  decision_id: &DecisionId,
  kind: DecisionKind,
  adherence: Adherence,
) -> String {
  let observed = match adherence.total() {
    0 => "No recent status updates were reported.".to_owned(),
    n => format!(
      "{} of {n} recent status updates reported adherence.",
      adherence.adhered
    ),
  };
  let reason = match kind {
    DecisionKind::DiagnosticPanel => {
      "The panel result sets the plan for the next quarter and will be \
       rechecked at the following panel."
    }
    DecisionKind::Clinical => {
      "A supplement trial is recommended to improve the lipid profile and \
       will be reviewed at the next panel."
    }
  };
  format!("Decision {decision_id}: {observed} {reason}")
}

//! Error types for `cadence-core`.

use thiserror::Error;

use crate::decision::DecisionId;

/// How many characters either side of a parse failure are kept in the excerpt.
const EXCERPT_RADIUS: usize = 60;

#[derive(Debug, Error)]
pub enum Error {
  /// No persisted timeline exists and nothing is able to generate one.
  #[error("{0}")]
  MissingInput(String),

  /// A persisted timeline (or rationale) failed structural parsing.
  #[error("malformed input: {reason}\n  near: {excerpt}")]
  MalformedInput { reason: String, excerpt: String },

  /// Rationales are insert-only; a second record for an id is refused.
  #[error("rationale already recorded for {0}")]
  RationaleExists(DecisionId),

  #[error("invalid cast: {0}")]
  InvalidCast(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// The standard MissingInput error for a store with nothing in it.
  pub fn no_timeline(location: impl std::fmt::Display) -> Self {
    Self::MissingInput(format!(
      "no timeline found at {location}; run `cadence generate` to create one"
    ))
  }

  /// Build a [`Error::MalformedInput`] from a JSON parse failure, quoting the
  /// offending region of `source`.
  pub fn malformed(source: &str, err: &serde_json::Error) -> Self {
    Self::MalformedInput {
      reason:  err.to_string(),
      excerpt: excerpt(source, err.line(), err.column()),
    }
  }
}

/// Cut a single-line excerpt of `source` around a 1-based `line`/`column`.
///
/// serde_json reports line 0 for errors that are not tied to a position; the
/// start of the input is used then.
pub fn excerpt(source: &str, line: usize, column: usize) -> String {
  let text = source.lines().nth(line.saturating_sub(1)).unwrap_or_default();
  let chars: Vec<char> = text.chars().collect();
  let centre = column.saturating_sub(1).min(chars.len());
  let start = centre.saturating_sub(EXCERPT_RADIUS);
  let end = (centre + EXCERPT_RADIUS).min(chars.len());

  let mut out: String = chars[start..end].iter().collect();
  if start > 0 {
    out.insert_str(0, "...");
  }
  if end < chars.len() {
    out.push_str("...");
  }
  out
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn malformed_quotes_the_offending_line() {
    let source = "{\n  \"messages\": [1, 2,, 3]\n}";
    let err = serde_json::from_str::<serde_json::Value>(source).unwrap_err();

    match Error::malformed(source, &err) {
      Error::MalformedInput { excerpt, .. } => {
        assert!(excerpt.contains("\"messages\": [1, 2,, 3]"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn excerpt_trims_long_lines() {
    let long = "x".repeat(500);
    let cut = excerpt(&long, 1, 250);
    assert!(cut.starts_with("..."));
    assert!(cut.ends_with("..."));
    assert_eq!(cut.len(), 2 * EXCERPT_RADIUS + 6);
  }

  #[test]
  fn excerpt_handles_out_of_range_positions() {
    assert_eq!(excerpt("abc", 9, 9), "");
    assert_eq!(excerpt("abc", 0, 0), "abc");
  }
}

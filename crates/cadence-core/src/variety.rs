//! Near-duplicate suppression for free-text candidate phrasings.
//!
//! Similarity is the Jaccard index over lower-cased, whitespace-separated word
//! sets. Pairs at or above the threshold count as duplicates.

use std::collections::HashSet;

/// Default duplicate threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Appended to rejected candidates when too few distinct phrasings survive.
const FILLER_SUFFIXES: [&str; 5] = [
  "when you get a chance",
  "no rush on this",
  "thanks in advance",
  "just wanted to check",
  "if that works for you",
];

fn word_set(text: &str) -> HashSet<String> {
  text.split_whitespace().map(str::to_lowercase).collect()
}

/// J(A, B) = |A ∩ B| / |A ∪ B| over the word sets of `a` and `b`.
///
/// Two texts without any words are treated as identical (1.0).
pub fn jaccard(a: &str, b: &str) -> f64 {
  jaccard_sets(&word_set(a), &word_set(b))
}

fn jaccard_sets(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
  let union = a.union(b).count();
  if union == 0 {
    return 1.0;
  }
  a.intersection(b).count() as f64 / union as f64
}

/// Greedy diversity filter over candidate phrasings.
#[derive(Debug, Clone)]
pub struct VarietyFilter {
  threshold: f64,
}

impl Default for VarietyFilter {
  fn default() -> Self { Self { threshold: DEFAULT_THRESHOLD } }
}

impl VarietyFilter {
  pub fn new(threshold: f64) -> Self {
    Self { threshold: threshold.clamp(0.0, 1.0) }
  }

  pub fn threshold(&self) -> f64 { self.threshold }

  /// Whether `candidate` is distinct enough from every text in `kept`.
  pub fn is_distinct<'a>(
    &self,
    candidate: &str,
    kept: impl IntoIterator<Item = &'a str>,
  ) -> bool {
    let words = word_set(candidate);
    kept
      .into_iter()
      .all(|k| jaccard_sets(&words, &word_set(k)) < self.threshold)
  }

  /// Keep every candidate that is dissimilar from all previously kept ones,
  /// in input order. If fewer than `k` survive, rejected candidates are given
  /// a filler suffix and re-checked until `k` is reached or every
  /// (candidate, suffix) pair has been tried.
  ///
  /// Blank candidates are dropped. Always terminates; returns fewer than `k`
  /// phrasings when the pool cannot supply them.
  pub fn select(&self, candidates: &[String], k: usize) -> Vec<String> {
    let mut kept: Vec<(String, HashSet<String>)> = Vec::new();
    let mut rejected: Vec<&str> = Vec::new();

    for candidate in candidates {
      let text = candidate.trim();
      if text.is_empty() {
        continue;
      }
      let words = word_set(text);
      if self.is_distinct_from(&words, &kept) {
        kept.push((text.to_owned(), words));
      } else {
        rejected.push(text);
      }
    }

    'rejected: for base in rejected {
      if kept.len() >= k {
        break;
      }
      for suffix in FILLER_SUFFIXES {
        let mutated = mutate(base, suffix);
        let words = word_set(&mutated);
        if self.is_distinct_from(&words, &kept) {
          kept.push((mutated, words));
          continue 'rejected;
        }
      }
    }

    kept.into_iter().map(|(text, _)| text).collect()
  }

  fn is_distinct_from(
    &self,
    words: &HashSet<String>,
    kept: &[(String, HashSet<String>)],
  ) -> bool {
    kept
      .iter()
      .all(|(_, other)| jaccard_sets(words, other) < self.threshold)
  }
}

/// `base` with `suffix` attached, keeping terminal punctuation at the end.
fn mutate(base: &str, suffix: &str) -> String {
  match base.char_indices().last() {
    Some((idx, c)) if matches!(c, '.' | '?' | '!') => {
      format!("{}, {suffix}{c}", &base[..idx])
    }
    _ => format!("{base}, {suffix}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
  }

  fn assert_pairwise_distinct(filter: &VarietyFilter, out: &[String]) {
    for (i, a) in out.iter().enumerate() {
      for b in &out[i + 1..] {
        assert!(
          jaccard(a, b) < filter.threshold(),
          "{a:?} vs {b:?} = {}",
          jaccard(a, b)
        );
      }
    }
  }

  #[test]
  fn jaccard_is_case_insensitive() {
    assert_eq!(jaccard("Hello World", "hello world"), 1.0);
    assert_eq!(jaccard("a b", "c d"), 0.0);
    assert!((jaccard("a b c", "a b d") - 0.5).abs() < 1e-9);
    assert_eq!(jaccard("", "   "), 1.0);
  }

  #[test]
  fn empty_pool_yields_nothing() {
    let filter = VarietyFilter::default();
    assert!(filter.select(&[], 3).is_empty());
  }

  #[test]
  fn near_duplicates_are_dropped() {
    let filter = VarietyFilter::default();
    let out = filter.select(
      &strings(&[
        "Can I swap my run for a swim tomorrow?",
        "can i swap my run for a swim tomorrow?",
        "What should I eat before training?",
      ]),
      2,
    );
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], "Can I swap my run for a swim tomorrow?");
    assert_eq!(out[1], "What should I eat before training?");
  }

  #[test]
  fn greedy_scan_keeps_every_distinct_candidate() {
    let filter = VarietyFilter::default();
    let out = filter.select(&strings(&["alpha beta", "gamma delta", "epsilon"]), 1);
    assert_eq!(out.len(), 3);
  }

  #[test]
  fn suffix_mutation_fills_up_to_k() {
    let filter = VarietyFilter::default();
    let out = filter.select(
      &strings(&["Missed my workout.", "missed my workout.", "Missed my workout."]),
      3,
    );
    assert_eq!(out.len(), 3);
    assert_eq!(out[0], "Missed my workout.");
    assert!(out[1].ends_with('.'));
    assert_pairwise_distinct(&filter, &out);
  }

  #[test]
  fn exhausted_pool_terminates_short() {
    let filter = VarietyFilter::default();
    let out = filter.select(&strings(&["same", "same"]), 10);
    assert!(out.len() < 10);
    assert!(!out.is_empty());
    assert_pairwise_distinct(&filter, &out);
  }

  #[test]
  fn long_duplicates_outlast_every_suffix() {
    // Twenty shared words against at most six new tokens per suffix.
    let sentence = "Managed every morning stretch today and kept my heart rate \
                    inside the target zone for nearly a forty minute session";
    assert_eq!(sentence.split_whitespace().count(), 20);
    let filter = VarietyFilter::default();
    for suffix in FILLER_SUFFIXES {
      assert!(jaccard(&mutate(sentence, suffix), sentence) >= filter.threshold());
    }

    let out = filter.select(&strings(&[sentence, sentence]), 2);
    assert_eq!(out, strings(&[sentence]));
  }

  #[test]
  fn blank_candidates_are_ignored() {
    let filter = VarietyFilter::default();
    let out = filter.select(&strings(&["", "   ", "hello there"]), 2);
    assert_eq!(out, strings(&["hello there"]));
  }

  #[test]
  fn mutate_keeps_terminal_punctuation() {
    assert_eq!(mutate("Ready?", "no rush"), "Ready, no rush?");
    assert_eq!(mutate("Ready", "no rush"), "Ready, no rush");
  }
}

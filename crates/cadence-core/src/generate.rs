//! The `TextGenerator` capability and its two in-process implementations.
//!
//! Prompts built by this crate start with an intent marker line such as
//! `[intent:exercise_update]`. Model-backed generators see it as ordinary
//! context; [`TemplateGenerator`] uses it to pick a canned phrasing.

use std::future::Future;

use sha2::{Digest, Sha256};
use thiserror::Error;

// ─── Capability ──────────────────────────────────────────────────────────────

/// Sampling parameters for a single completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
  pub temperature: f32,
  pub max_tokens:  u32,
}

impl Sampling {
  /// Maximally deterministic sampling for system, plan and report text.
  pub const DETERMINISTIC: Sampling =
    Sampling { temperature: 0.0, max_tokens: 120 };

  pub fn with_temperature(temperature: f32) -> Self {
    Self { temperature, ..Self::DETERMINISTIC }
  }
}

/// Why a generator produced nothing usable. Always recovered by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
  #[error("text generator unavailable")]
  Unavailable,

  #[error("text generator returned no usable text")]
  Empty,

  #[error("text generator backend error: {0}")]
  Backend(String),
}

/// Turns a prompt into short natural-language text.
///
/// Implementations may be slow (model inference) and may fail; callers in this
/// crate await every call before appending the resulting message, so the order
/// of a timeline never depends on generation latency.
pub trait TextGenerator: Send + Sync {
  /// One completion for `prompt`.
  fn generate<'a>(
    &'a self,
    prompt: &'a str,
    sampling: Sampling,
  ) -> impl Future<Output = Result<String, GenerationError>> + Send + 'a;

  /// Up to `n` alternative completions. Best effort: fewer than `n` is not an
  /// error.
  fn generate_variants<'a>(
    &'a self,
    prompt: &'a str,
    n: usize,
    temperature: f32,
  ) -> impl Future<Output = Result<Vec<String>, GenerationError>> + Send + 'a;
}

// ─── Intents ─────────────────────────────────────────────────────────────────

/// What a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
  Welcome,
  InitialPlan,
  TestScheduled,
  TestResult,
  ExerciseUpdate,
  StatusAdhered,
  StatusMissed,
  SupportiveReply,
  MemberQuestion,
  QuestionReply,
  ClinicalDecision,
  CheckIn,
  Rationale,
}

impl Intent {
  pub const ALL: [Intent; 13] = [
    Self::Welcome,
    Self::InitialPlan,
    Self::TestScheduled,
    Self::TestResult,
    Self::ExerciseUpdate,
    Self::StatusAdhered,
    Self::StatusMissed,
    Self::SupportiveReply,
    Self::MemberQuestion,
    Self::QuestionReply,
    Self::ClinicalDecision,
    Self::CheckIn,
    Self::Rationale,
  ];

  pub fn key(self) -> &'static str {
    match self {
      Self::Welcome => "welcome",
      Self::InitialPlan => "initial_plan",
      Self::TestScheduled => "test_scheduled",
      Self::TestResult => "test_result",
      Self::ExerciseUpdate => "exercise_update",
      Self::StatusAdhered => "status_adhered",
      Self::StatusMissed => "status_missed",
      Self::SupportiveReply => "supportive_reply",
      Self::MemberQuestion => "member_question",
      Self::QuestionReply => "question_reply",
      Self::ClinicalDecision => "clinical_decision",
      Self::CheckIn => "check_in",
      Self::Rationale => "rationale",
    }
  }

  /// Prefix `body` with this intent's marker line.
  pub fn prompt(self, body: &str) -> String {
    format!("[intent:{}]\n{body}", self.key())
  }

  /// Read the intent marker from the first line of `prompt`.
  pub fn from_prompt(prompt: &str) -> Option<Self> {
    let key = prompt
      .lines()
      .next()?
      .trim()
      .strip_prefix("[intent:")?
      .strip_suffix(']')?;
    Self::ALL.into_iter().find(|i| i.key() == key)
  }

  fn templates(self) -> &'static [&'static str] {
    match self {
      Self::Welcome => &[
        "Welcome aboard! I'm your concierge and I'll coordinate everything with the team.",
        "Hi and welcome! I'll be your day-to-day contact, so message me any time.",
      ],
      Self::InitialPlan => &[
        "I've reviewed your history and set an initial plan focused on diet, exercise and a baseline lipid panel.",
        "Your starting plan targets LDL through diet changes and regular cardio; we'll confirm with baseline labs.",
      ],
      Self::TestScheduled => &[
        "Your blood panel is booked; please fast for ten hours beforehand.",
        "I've scheduled your quarterly diagnostic panel and sent the details to your calendar.",
        "The lab visit is confirmed for tomorrow morning, remember to fast overnight.",
      ],
      Self::TestResult => &[
        "I've reviewed the results; there is a mild change and we'll adjust the plan accordingly.",
        "Your panel is back and broadly stable, with LDL slightly above target.",
        "Results are in: lipids moved in the right direction, so we'll keep the current plan.",
      ],
      Self::ExerciseUpdate => &[
        "Here's your updated exercise plan for the next two weeks. Keep intensity moderate.",
        "New fortnight block: three cardio sessions and two strength sessions each week.",
        "I've refreshed your program with slightly longer zone 2 sessions this cycle.",
        "Next two weeks focus on consistency, aim for thirty minutes of movement daily.",
      ],
      Self::StatusAdhered => &[
        "Completed today's session and felt better afterward.",
        "Stuck to the meal plan today and got my walk in.",
        "Did the full workout this morning, energy is good.",
        "Hit all my targets today, even the stretching.",
      ],
      Self::StatusMissed => &[
        "Missed my workout today, work ran late.",
        "Didn't manage the plan today, too many meetings.",
        "Skipped the session, I was exhausted.",
        "Off track today, ate out twice and no exercise.",
      ],
      Self::SupportiveReply => &[
        "No worries, one missed day is fine; let's aim for a short session tomorrow.",
        "Thanks for being honest, we can move the session to the weekend.",
        "That happens, try a ten minute walk tonight if you can.",
      ],
      Self::MemberQuestion => &[
        "Can I swap tomorrow's run for a swim?",
        "Is it okay to have coffee before the fasting blood test?",
        "Could we move Thursday's session to the evening?",
        "What should I eat before a morning workout?",
        "Do I need to change anything while I'm travelling next week?",
        "Is the supplement safe to take with my other medication?",
      ],
      Self::QuestionReply => &[
        "Yes, that works; keep the effort similar to the original session.",
        "Good question, I'll check with the team and confirm shortly.",
        "Absolutely, I've updated your schedule.",
        "Keep it light and listen to your body, that's perfectly fine.",
      ],
      Self::ClinicalDecision => &[
        "Given the mild lipid rise, I recommend a twelve week trial of a plant sterol supplement.",
        "Based on recent trends, let's start omega-3 supplementation and recheck at the next panel.",
        "I'd like to add a soluble fibre supplement daily and review in six weeks.",
      ],
      Self::CheckIn => &[
        "Just checking in, how are you finding the plan this week?",
        "Hi! Anything we can help with this week?",
        "Quick check-in: how is your energy and sleep lately?",
      ],
      Self::Rationale => &[
        "Recent messages show partial adherence alongside a mild lipid change, which supports this recommendation.",
        "The thread indicates inconsistent adherence; this step adds support while we monitor the next panel.",
      ],
    }
  }
}

// ─── TemplateGenerator ───────────────────────────────────────────────────────

/// Deterministic, model-free generator backed by hand-written phrasings.
///
/// The phrasing is chosen by hashing the prompt, so the same prompt always
/// yields the same text and different prompts spread over the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
  fn pool(prompt: &str) -> Result<&'static [&'static str], GenerationError> {
    Intent::from_prompt(prompt)
      .map(Intent::templates)
      .ok_or(GenerationError::Unavailable)
  }

  fn offset(prompt: &str, len: usize) -> usize {
    let digest = Sha256::digest(prompt.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(head) % len as u64) as usize
  }
}

impl TextGenerator for TemplateGenerator {
  async fn generate(
    &self,
    prompt: &str,
    _sampling: Sampling,
  ) -> Result<String, GenerationError> {
    let pool = Self::pool(prompt)?;
    Ok(pool[Self::offset(prompt, pool.len())].to_owned())
  }

  async fn generate_variants(
    &self,
    prompt: &str,
    n: usize,
    _temperature: f32,
  ) -> Result<Vec<String>, GenerationError> {
    let pool = Self::pool(prompt)?;
    let start = Self::offset(prompt, pool.len());
    Ok(
      pool
        .iter()
        .cycle()
        .skip(start)
        .take(n.min(pool.len()))
        .map(|s| (*s).to_owned())
        .collect(),
    )
  }
}

// ─── DisabledGenerator ───────────────────────────────────────────────────────

/// A generator that is never available. Everything falls back to the
/// hand-written sentences.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
  async fn generate(
    &self,
    _prompt: &str,
    _sampling: Sampling,
  ) -> Result<String, GenerationError> {
    Err(GenerationError::Unavailable)
  }

  async fn generate_variants(
    &self,
    _prompt: &str,
    _n: usize,
    _temperature: f32,
  ) -> Result<Vec<String>, GenerationError> {
    Err(GenerationError::Unavailable)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intent_marker_round_trips() {
    for intent in Intent::ALL {
      let prompt = intent.prompt("anything at all");
      assert_eq!(Intent::from_prompt(&prompt), Some(intent));
    }
    assert_eq!(Intent::from_prompt("no marker here"), None);
    assert_eq!(Intent::from_prompt("[intent:nonsense]\nbody"), None);
  }

  #[test]
  fn every_intent_has_templates() {
    for intent in Intent::ALL {
      assert!(!intent.templates().is_empty(), "{intent:?}");
    }
  }

  #[tokio::test]
  async fn template_generation_is_stable() {
    let prompt = Intent::ExerciseUpdate.prompt("week 3, travel=false");
    let a = TemplateGenerator
      .generate(&prompt, Sampling::DETERMINISTIC)
      .await
      .unwrap();
    let b = TemplateGenerator
      .generate(&prompt, Sampling::DETERMINISTIC)
      .await
      .unwrap();
    assert_eq!(a, b);
    assert!(Intent::ExerciseUpdate.templates().contains(&a.as_str()));
  }

  #[tokio::test]
  async fn variants_are_capped_by_pool_size() {
    let prompt = Intent::MemberQuestion.prompt("travel=false");
    let variants = TemplateGenerator
      .generate_variants(&prompt, 50, 0.8)
      .await
      .unwrap();
    assert_eq!(variants.len(), Intent::MemberQuestion.templates().len());

    let two = TemplateGenerator
      .generate_variants(&prompt, 2, 0.8)
      .await
      .unwrap();
    assert_eq!(two.len(), 2);
    assert_ne!(two[0], two[1]);
  }

  #[tokio::test]
  async fn unmarked_prompts_are_unavailable() {
    let err = TemplateGenerator
      .generate("plain prompt", Sampling::DETERMINISTIC)
      .await
      .unwrap_err();
    assert_eq!(err, GenerationError::Unavailable);
  }

  #[tokio::test]
  async fn disabled_generator_never_answers() {
    assert!(
      DisabledGenerator
        .generate_variants("x", 3, 0.5)
        .await
        .is_err()
    );
  }
}

//! Builds single [`Message`] records from event descriptors.
//!
//! The factory owns text construction only. It never assigns ids or decides
//! ordering; the scheduler does both once the run is complete.

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};

use crate::{
  Result,
  decision::DecisionId,
  generate::{GenerationError, Intent, Sampling, TextGenerator},
  member::{Cast, Member, Role, Sender},
  message::{Message, MessageMeta, MessageType},
  variety::VarietyFilter,
};

/// Generated text is cut to at most this many sentences.
pub const MAX_SENTENCES: usize = 2;

/// How many recently chosen free-text phrasings a new choice must differ from.
const RECENT_MEMORY: usize = 6;

/// Hand-written text used whenever generation is unavailable or unusable.
pub fn fallback_text(role: Role) -> &'static str {
  match role {
    Role::Member => "Thanks, I'll keep you posted on how it goes.",
    Role::Concierge => {
      "Thanks for the update, noted. I'll keep the team in the loop."
    }
    Role::Medical => {
      "I've reviewed the latest information and will update the plan as needed."
    }
    Role::Coach => {
      "Keep the intensity moderate and stick with the current program for now."
    }
    Role::Unknown => "Thanks for the update, noted.",
  }
}

/// Collapse whitespace and keep at most `max` sentences. A sentence ends at
/// `.`, `!` or `?` followed by whitespace or the end of the text. Non-empty
/// output always ends in terminal punctuation.
pub fn trim_sentences(text: &str, max: usize) -> String {
  let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
  let flat = flat.trim_matches(|c: char| c == '"' || c.is_whitespace());
  // Single quotes are only stripped as a pair; one alone may be an apostrophe.
  let flat = match flat.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
    Some(inner) => inner.trim(),
    None => flat,
  };

  let mut end = flat.len();
  let mut seen = 0;
  for (i, c) in flat.char_indices() {
    if !matches!(c, '.' | '!' | '?') {
      continue;
    }
    let after = i + c.len_utf8();
    if flat[after..].chars().next().is_none_or(char::is_whitespace) {
      seen += 1;
      if seen == max {
        end = after;
        break;
      }
    }
  }

  let mut out = flat[..end].trim().to_owned();
  if !out.is_empty() && !out.ends_with(['.', '!', '?']) {
    out.push('.');
  }
  out
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// How the text of a message is produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Voice {
  /// System, plan, report and decision text at temperature 0.
  Deterministic,
  /// Member or advisor free text: several sampled candidates, diversified by
  /// the [`VarietyFilter`], one picked with the content random source.
  Conversational { temperature: f32 },
}

impl Voice {
  pub fn temperature(self) -> f32 {
    match self {
      Self::Deterministic => Sampling::DETERMINISTIC.temperature,
      Self::Conversational { temperature } => temperature,
    }
  }
}

/// Everything the factory needs to build one message.
#[derive(Debug, Clone)]
pub struct MessageSpec {
  pub intent:       Intent,
  pub sender:       Sender,
  pub timestamp:    DateTime<Utc>,
  pub tags:         Vec<String>,
  pub message_type: MessageType,
  pub decision_id:  Option<DecisionId>,
  pub meta:         MessageMeta,
  pub voice:        Voice,
  /// Event-specific context appended to the prompt.
  pub detail:       String,
}

impl MessageSpec {
  /// A deterministic, untagged message with default flags.
  pub fn new(
    intent: Intent,
    sender: Sender,
    timestamp: DateTime<Utc>,
    message_type: MessageType,
  ) -> Self {
    Self {
      intent,
      sender,
      timestamp,
      tags: Vec::new(),
      message_type,
      decision_id: None,
      meta: MessageMeta::default(),
      voice: Voice::Deterministic,
      detail: String::new(),
    }
  }

  pub fn tagged(mut self, tags: &[&str]) -> Self {
    self.tags = tags.iter().map(|t| (*t).to_owned()).collect();
    self
  }

  pub fn decision(mut self, id: DecisionId) -> Self {
    self.decision_id = Some(id);
    self
  }

  pub fn meta(mut self, meta: MessageMeta) -> Self {
    self.meta = meta;
    self
  }

  pub fn conversational(mut self, temperature: f32) -> Self {
    self.voice = Voice::Conversational { temperature };
    self
  }

  pub fn detail(mut self, detail: impl Into<String>) -> Self {
    self.detail = detail.into();
    self
  }
}

/// Tuning for free-text selection.
#[derive(Debug, Clone, Copy)]
pub struct FactoryOptions {
  /// Candidates requested from the generator per free-text turn.
  pub variants:     usize,
  /// Distinct candidates the filter should try to keep.
  pub min_distinct: usize,
  pub threshold:    f64,
}

impl Default for FactoryOptions {
  fn default() -> Self {
    Self {
      variants:     4,
      min_distinct: 3,
      threshold:    crate::variety::DEFAULT_THRESHOLD,
    }
  }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

pub struct MessageFactory<G> {
  generator: Arc<G>,
  member:    Member,
  cast:      Cast,
  filter:    VarietyFilter,
  options:   FactoryOptions,
  rng:       StdRng,
  /// The content seed, if one was given. Logged with each prompt.
  seed:      Option<u64>,
  recent:    VecDeque<String>,
  degraded:  usize,
}

impl<G: TextGenerator> MessageFactory<G> {
  /// Fails if the cast cannot map every sender name back to one role.
  ///
  /// `content_seed` drives wording choices only; `None` seeds from entropy.
  pub fn new(
    generator: Arc<G>,
    member: Member,
    cast: Cast,
    options: FactoryOptions,
    content_seed: Option<u64>,
  ) -> Result<Self> {
    cast.validate()?;
    let rng = match content_seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_os_rng(),
    };
    Ok(Self {
      generator,
      member,
      cast,
      filter: VarietyFilter::new(options.threshold),
      options,
      rng,
      seed: content_seed,
      recent: VecDeque::with_capacity(RECENT_MEMORY),
      degraded: 0,
    })
  }

  pub fn cast(&self) -> &Cast { &self.cast }

  pub fn member(&self) -> &Member { &self.member }

  /// Number of messages whose text came from the fallback sentences.
  pub fn degraded(&self) -> usize { self.degraded }

  /// Build one message. Never fails: unusable generation degrades to
  /// [`fallback_text`].
  pub async fn compose(&mut self, spec: MessageSpec) -> Message {
    let role = spec.sender.role();
    let prompt = spec.intent.prompt(&self.describe(&spec));
    tracing::trace!(
      intent = spec.intent.key(),
      temperature = spec.voice.temperature(),
      seed = ?self.seed,
      %prompt,
      "prompt rendered"
    );

    let text = match spec.voice {
      Voice::Deterministic => self.deterministic(&prompt).await,
      Voice::Conversational { temperature } => {
        self.conversational(&prompt, temperature).await
      }
    };

    let text = match text {
      Ok(text) => text,
      Err(e) => {
        tracing::debug!(intent = spec.intent.key(), error = %e, "generation degraded");
        self.degraded += 1;
        fallback_text(role).to_owned()
      }
    };

    Message {
      id: 0,
      timestamp: spec.timestamp,
      sender: self.cast.name(spec.sender).to_owned(),
      sender_role: role,
      text,
      tags: spec.tags,
      decision_id: spec.decision_id,
      message_type: spec.message_type,
      meta: spec.meta,
    }
  }

  fn describe(&self, spec: &MessageSpec) -> String {
    let m = &self.member;
    format!(
      "You are {name} ({role}) on a health concierge team, messaging {member} \
       ({age}, {location}, managing {condition}) on {date}. {detail} \
       Write one or two short WhatsApp-style sentences.",
      name = self.cast.name(spec.sender),
      role = spec.sender.role(),
      member = m.name,
      age = m.age,
      location = m.location,
      condition = m.chronic_condition,
      date = spec.timestamp.date_naive(),
      detail = spec.detail,
    )
  }

  async fn deterministic(
    &self,
    prompt: &str,
  ) -> Result<String, GenerationError> {
    let raw = self.generator.generate(prompt, Sampling::DETERMINISTIC).await?;
    let text = trim_sentences(&raw, MAX_SENTENCES);
    if text.is_empty() {
      return Err(GenerationError::Empty);
    }
    Ok(text)
  }

  async fn conversational(
    &mut self,
    prompt: &str,
    temperature: f32,
  ) -> Result<String, GenerationError> {
    let raw = self
      .generator
      .generate_variants(prompt, self.options.variants, temperature)
      .await?;

    let candidates: Vec<String> = raw
      .iter()
      .map(|c| trim_sentences(c, MAX_SENTENCES))
      .filter(|c| !c.is_empty())
      .collect();
    let pool = self.filter.select(&candidates, self.options.min_distinct);

    let fresh: Vec<&String> = pool
      .iter()
      .filter(|c| {
        self.filter.is_distinct(c, self.recent.iter().map(String::as_str))
      })
      .collect();

    let choice = match fresh.choose(&mut self.rng) {
      Some(c) => (*c).clone(),
      None => pool
        .choose(&mut self.rng)
        .cloned()
        .ok_or(GenerationError::Empty)?,
    };

    if self.recent.len() == RECENT_MEMORY {
      self.recent.pop_front();
    }
    self.recent.push_back(choice.clone());
    Ok(choice)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    generate::{DisabledGenerator, TemplateGenerator},
    message::tags,
  };

  /// Returns the same canned output for every prompt.
  struct Canned(&'static str);

  impl TextGenerator for Canned {
    async fn generate(
      &self,
      _prompt: &str,
      _sampling: Sampling,
    ) -> Result<String, GenerationError> {
      Ok(self.0.to_owned())
    }

    async fn generate_variants(
      &self,
      _prompt: &str,
      n: usize,
      _temperature: f32,
    ) -> Result<Vec<String>, GenerationError> {
      Ok(vec![self.0.to_owned(); n])
    }
  }

  fn spec(intent: Intent, sender: Sender, voice: Voice) -> MessageSpec {
    MessageSpec {
      intent,
      sender,
      timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
      tags: vec![tags::CHECKIN.to_owned()],
      message_type: MessageType::Chat,
      decision_id: None,
      meta: MessageMeta::default(),
      voice,
      detail: String::new(),
    }
  }

  fn factory<G: TextGenerator>(generator: G) -> MessageFactory<G> {
    MessageFactory::new(
      Arc::new(generator),
      Member::default(),
      Cast::default(),
      FactoryOptions::default(),
      Some(7),
    )
    .unwrap()
  }

  #[test]
  fn trims_to_two_sentences() {
    assert_eq!(
      trim_sentences("One. Two! Three? Four.", 2),
      "One. Two!"
    );
    assert_eq!(trim_sentences("  no punctuation  ", 2), "no punctuation.");
    assert_eq!(trim_sentences("Take 1.5 mg daily. Then rest.", 1), "Take 1.5 mg daily.");
    assert_eq!(trim_sentences("line one\n\nline two.", 2), "line one line two.");
    assert_eq!(trim_sentences("   ", 2), "");
  }

  #[test]
  fn lone_apostrophes_survive_trimming() {
    assert_eq!(trim_sentences("'Tis the season for long runs.", 2), "'Tis the season for long runs.");
    assert_eq!(trim_sentences("Borrowed my sisters'", 2), "Borrowed my sisters'.");
    assert_eq!(trim_sentences("'Sounds good, see you then.'", 2), "Sounds good, see you then.");
    assert_eq!(trim_sentences("\"Sounds good.\"", 2), "Sounds good.");
  }

  #[derive(Clone, Default)]
  struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

  impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
  }

  #[tokio::test]
  async fn rendered_prompts_are_traced() {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::TRACE)
      .with_ansi(false)
      .with_writer(move || writer.clone())
      .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut f = factory(TemplateGenerator);
    f.compose(spec(
      Intent::CheckIn,
      Sender::Concierge,
      Voice::Conversational { temperature: 0.2 },
    ))
    .await;

    let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(logged.contains("prompt rendered"), "{logged}");
    assert!(logged.contains("[intent:check_in]"), "{logged}");
    assert!(logged.contains("temperature=0.2"), "{logged}");
    assert!(logged.contains("seed=Some(7)"), "{logged}");
  }

  #[test]
  fn invalid_cast_fails_fast() {
    let cast = Cast { concierge: "Dr_Warren".into(), ..Cast::default() };
    let result = MessageFactory::new(
      Arc::new(TemplateGenerator),
      Member::default(),
      cast,
      FactoryOptions::default(),
      None,
    );
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn disabled_generator_falls_back_by_role() {
    let mut f = factory(DisabledGenerator);

    for sender in Sender::ALL {
      for voice in [
        Voice::Deterministic,
        Voice::Conversational { temperature: 0.6 },
      ] {
        let msg = f.compose(spec(Intent::CheckIn, sender, voice)).await;
        assert_eq!(msg.text, fallback_text(sender.role()));
        assert_eq!(msg.sender_role, sender.role());
        assert_eq!(msg.sender, Cast::default().name(sender));
      }
    }
    assert_eq!(f.degraded(), 8);
  }

  #[tokio::test]
  async fn blank_output_falls_back() {
    let mut f = factory(Canned("   \n  "));
    let msg = f
      .compose(spec(Intent::TestResult, Sender::MedicalLead, Voice::Deterministic))
      .await;
    assert_eq!(msg.text, fallback_text(Role::Medical));

    let msg = f
      .compose(spec(
        Intent::MemberQuestion,
        Sender::Member,
        Voice::Conversational { temperature: 0.6 },
      ))
      .await;
    assert_eq!(msg.text, fallback_text(Role::Member));
  }

  #[tokio::test]
  async fn long_output_is_trimmed() {
    let mut f = factory(Canned("First point. Second point. Third point."));
    let msg = f
      .compose(spec(Intent::InitialPlan, Sender::MedicalLead, Voice::Deterministic))
      .await;
    assert_eq!(msg.text, "First point. Second point.");
    assert_eq!(msg.id, 0);
  }

  #[tokio::test]
  async fn same_content_seed_same_wording() {
    let mut a = factory(TemplateGenerator);
    let mut b = factory(TemplateGenerator);
    for _ in 0..10 {
      let s = spec(
        Intent::MemberQuestion,
        Sender::Member,
        Voice::Conversational { temperature: 0.6 },
      );
      assert_eq!(a.compose(s.clone()).await.text, b.compose(s).await.text);
    }
  }

  #[tokio::test]
  async fn conversational_turns_avoid_recent_repeats() {
    let mut f = factory(TemplateGenerator);
    let s = spec(
      Intent::MemberQuestion,
      Sender::Member,
      Voice::Conversational { temperature: 0.6 },
    );
    let first = f.compose(s.clone()).await.text;
    let second = f.compose(s).await.text;
    assert_ne!(first, second);
  }
}

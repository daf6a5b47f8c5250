//! The deterministic conversation scheduler.
//!
//! One pass over the covered days decides which events happen, asks the
//! [`MessageFactory`] for each message, and records a rationale for every
//! decision. Structural randomness (which events occur, when, who answers,
//! decision ids) comes from one seedable source; wording comes from a second,
//! independent one owned by the factory.
//!
//! Message ids are not touched during the pass. They are assigned once, after
//! a stable sort by timestamp, so the final ids are dense and follow time
//! order regardless of the order events were generated in.

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
};

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  decision::{DecisionId, DecisionKind, RationaleBook},
  factory::{FactoryOptions, MessageFactory, MessageSpec},
  generate::{Intent, TextGenerator},
  member::{Cast, Member, Sender},
  message::{Message, MessageMeta, MessageType, tags},
  rationale::{DEFAULT_WINDOW, RationaleGenerator},
  timeline::{GeneratedRun, Period, Timeline, TimelineStats},
};

// ─── Rules ───────────────────────────────────────────────────────────────────

/// The behavioural rule set. Out-of-range values are normalised by
/// [`ScheduleRules::normalized`], never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleRules {
  /// Average member-initiated conversations per week.
  pub member_msgs_per_week:      f64,
  /// Share of member-initiated conversations that are status updates; the
  /// rest are questions.
  pub status_share:              f64,
  /// Probability that a status update reports adherence.
  pub adherence_prob:            f64,
  pub clinical_decision_daily_p: f64,
  pub checkin_daily_p:           f64,
  pub exercise_interval_days:    u32,
  /// Every n-th week (1-based) is a travel week.
  pub travel_week_period:        u32,
  /// Day offsets on which a diagnostic panel is scheduled.
  pub panel_offsets:             Vec<u32>,
  /// Messages preceding a decision that feed its rationale.
  pub rationale_window:          usize,
  pub question_variants:         usize,
  pub min_distinct_variants:     usize,
  pub similarity_threshold:      f64,
}

impl Default for ScheduleRules {
  fn default() -> Self {
    Self {
      member_msgs_per_week:      5.0,
      status_share:              0.6,
      adherence_prob:            0.5,
      clinical_decision_daily_p: 0.02,
      checkin_daily_p:           0.10,
      exercise_interval_days:    14,
      travel_week_period:        4,
      panel_offsets:             vec![0, 90, 180],
      rationale_window:          DEFAULT_WINDOW,
      question_variants:         4,
      min_distinct_variants:     3,
      similarity_threshold:      crate::variety::DEFAULT_THRESHOLD,
    }
  }
}

impl ScheduleRules {
  /// Clamp probabilities into `[0, 1]`, raise zero intervals to 1, and drop
  /// duplicate panel offsets.
  pub fn normalized(mut self) -> Self {
    fn unit(p: f64) -> f64 {
      if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
    }
    self.member_msgs_per_week = if self.member_msgs_per_week.is_nan() {
      0.0
    } else {
      self.member_msgs_per_week.clamp(0.0, 7.0)
    };
    self.status_share = unit(self.status_share);
    self.adherence_prob = unit(self.adherence_prob);
    self.clinical_decision_daily_p = unit(self.clinical_decision_daily_p);
    self.checkin_daily_p = unit(self.checkin_daily_p);
    self.similarity_threshold = unit(self.similarity_threshold);
    self.exercise_interval_days = self.exercise_interval_days.max(1);
    self.travel_week_period = self.travel_week_period.max(1);
    self.rationale_window = self.rationale_window.max(1);
    self.question_variants = self.question_variants.max(1);
    self.panel_offsets.sort_unstable();
    self.panel_offsets.dedup();
    self
  }

  /// Daily probability of a member-initiated conversation.
  pub fn member_daily_p(&self) -> f64 {
    (self.member_msgs_per_week / 7.0).clamp(0.0, 1.0)
  }
}

/// The two independent random sources. `None` seeds from OS entropy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seeds {
  /// Which events occur, their timing, responders and decision ids.
  pub structure: Option<u64>,
  /// Which phrasing is chosen for free-text turns.
  pub content:   Option<u64>,
}

impl Seeds {
  pub fn fixed(structure: u64, content: u64) -> Self {
    Self { structure: Some(structure), content: Some(content) }
  }
}

/// Everything one generation run needs apart from the text backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
  pub start_date: NaiveDate,
  /// Zero or negative yields an empty run.
  pub days:       i64,
  pub member:     Member,
  pub cast:       Cast,
  pub rules:      ScheduleRules,
  pub seeds:      Seeds,
}

impl Default for RunSettings {
  fn default() -> Self {
    Self {
      start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
      days:       240,
      member:     Member::default(),
      cast:       Cast::default(),
      rules:      ScheduleRules::default(),
      seeds:      Seeds::default(),
    }
  }
}

impl RunSettings {
  pub fn scheduler<G: TextGenerator>(&self, generator: Arc<G>) -> Result<ConversationScheduler<G>> {
    ConversationScheduler::new(
      generator,
      self.member.clone(),
      self.cast.clone(),
      self.rules.clone(),
      self.seeds,
    )
  }

  /// Build a scheduler and run it over the configured period.
  pub async fn generate<G: TextGenerator>(&self, generator: Arc<G>) -> Result<GeneratedRun> {
    Ok(self.scheduler(generator)?.run(self.start_date, self.days).await)
  }
}

// ─── Calendar ────────────────────────────────────────────────────────────────

/// Simulated clock positions within a day.
mod clock {
  use chrono::Duration;

  pub fn welcome() -> Duration { Duration::hours(7) }
  pub fn initial_plan() -> Duration { Duration::hours(7) + Duration::minutes(30) }
  pub fn panel_scheduled() -> Duration { Duration::hours(8) }
  /// The result follows the scheduling message by one day plus this much.
  pub fn panel_result_delay() -> Duration { Duration::days(1) + Duration::hours(1) }
  pub fn exercise_update() -> Duration { Duration::hours(9) }
  pub fn check_in() -> Duration { Duration::hours(9) + Duration::minutes(30) }
  /// Questions arrive between 10:00 and 16:00.
  pub const QUESTION_HOUR: i64 = 10;
  pub const QUESTION_SPREAD_HOURS: i64 = 6;
  /// Answers follow a question by one to four hours.
  pub const REPLY_MAX_HOURS: i64 = 4;
  pub fn clinical_decision() -> Duration { Duration::hours(13) }
  pub fn status() -> Duration { Duration::hours(18) }
  pub fn supportive_reply() -> Duration { Duration::hours(20) }
}

/// 1-based week number of a day offset.
pub fn week_of(day_offset: u32) -> u32 { day_offset / 7 + 1 }

/// Travel weeks for a run of `days` days: `{w : w % period == 0}` over the
/// weeks the run touches.
pub fn travel_weeks(days: u32, period: u32) -> BTreeSet<u32> {
  let period = period.max(1);
  let weeks = days.div_ceil(7);
  (1..=weeks).filter(|w| w % period == 0).collect()
}

/// Travel-week membership, fixed before the day loop starts.
#[derive(Debug, Clone)]
struct TravelCalendar {
  start: NaiveDate,
  weeks: BTreeSet<u32>,
}

impl TravelCalendar {
  fn new(start: NaiveDate, days: u32, period: u32) -> Self {
    Self { start, weeks: travel_weeks(days, period) }
  }

  fn day(&self, day_offset: u32) -> bool {
    self.weeks.contains(&week_of(day_offset))
  }

  fn at(&self, ts: DateTime<Utc>) -> bool {
    let offset = (ts.date_naive() - self.start).num_days();
    u32::try_from(offset).is_ok_and(|o| self.day(o))
  }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Messages and rationales accumulated during the day loop. Single writer:
/// only the scheduler appends, and only after each message is fully built.
#[derive(Default)]
struct Draft {
  messages: Vec<Message>,
  book:     RationaleBook,
  issued:   HashSet<DecisionId>,
}

impl Draft {
  /// Everything drafted at or before `at`, in time order (ties keep
  /// insertion order), trimmed to the last `window` messages.
  fn context(&self, at: DateTime<Utc>, window: usize) -> Vec<Message> {
    let mut ctx: Vec<&Message> =
      self.messages.iter().filter(|m| m.timestamp <= at).collect();
    ctx.sort_by_key(|m| m.timestamp);
    ctx[ctx.len().saturating_sub(window)..]
      .iter()
      .map(|m| (*m).clone())
      .collect()
  }
}

pub struct ConversationScheduler<G> {
  factory:    MessageFactory<G>,
  rationales: RationaleGenerator<G>,
  rules:      ScheduleRules,
  rng:        StdRng,
}

impl<G: TextGenerator> ConversationScheduler<G> {
  /// Fails only if the cast is invalid.
  pub fn new(
    generator: Arc<G>,
    member: Member,
    cast: Cast,
    rules: ScheduleRules,
    seeds: Seeds,
  ) -> Result<Self> {
    let rules = rules.normalized();
    let options = FactoryOptions {
      variants:     rules.question_variants,
      min_distinct: rules.min_distinct_variants,
      threshold:    rules.similarity_threshold,
    };
    let factory =
      MessageFactory::new(generator.clone(), member, cast, options, seeds.content)?;
    let rationales = RationaleGenerator::new(generator, rules.rationale_window);
    let rng = match seeds.structure {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_os_rng(),
    };
    Ok(Self { factory, rationales, rules, rng })
  }

  pub fn rules(&self) -> &ScheduleRules { &self.rules }

  /// Generate a run stamped with the current time.
  pub async fn run(self, start_date: NaiveDate, duration_days: i64) -> GeneratedRun {
    self.run_at(start_date, duration_days, Utc::now()).await
  }

  /// Generate a run with an explicit `generated_at`, for reproducible output.
  ///
  /// A zero or negative duration yields an empty timeline and no decisions.
  pub async fn run_at(
    mut self,
    start_date: NaiveDate,
    duration_days: i64,
    generated_at: DateTime<Utc>,
  ) -> GeneratedRun {
    let days = u32::try_from(duration_days.max(0)).unwrap_or(u32::MAX);
    let calendar = TravelCalendar::new(start_date, days, self.rules.travel_week_period);
    let mut draft = Draft::default();

    for offset in 0..days {
      let Some(date) = start_date.checked_add_days(Days::new(u64::from(offset)))
      else {
        tracing::warn!(offset, "calendar overflow, stopping early");
        break;
      };
      let midnight = date.and_time(NaiveTime::MIN).and_utc();
      let travel_week = calendar.day(offset);

      if offset == 0 {
        self.onboarding(&mut draft, midnight).await;
      }
      if offset % self.rules.exercise_interval_days == 0 {
        self.exercise_update(&mut draft, midnight, week_of(offset), travel_week).await;
      }
      if self.rules.panel_offsets.contains(&offset) {
        self.diagnostic_panel(&mut draft, midnight, &calendar).await;
      }
      if self.rng.random_bool(self.rules.member_daily_p()) {
        if self.rng.random_bool(self.rules.status_share) {
          let adhered = self.rng.random_bool(self.rules.adherence_prob);
          self.member_status(&mut draft, midnight, adhered, travel_week).await;
        } else {
          self.member_question(&mut draft, midnight, travel_week).await;
        }
      }
      if self.rng.random_bool(self.rules.clinical_decision_daily_p) {
        self.clinical_decision(&mut draft, midnight, travel_week).await;
      }
      if self.rng.random_bool(self.rules.checkin_daily_p) {
        self.check_in(&mut draft, midnight, travel_week).await;
      }
    }

    let Draft { mut messages, book, .. } = draft;
    finalize(&mut messages);
    let meta = TimelineStats::compute(&messages, self.rules.member_msgs_per_week);

    tracing::info!(
      days,
      messages = meta.total_messages,
      member_messages = meta.member_messages,
      decisions = book.len(),
      degraded = self.factory.degraded(),
      "timeline generated"
    );

    GeneratedRun {
      timeline:   Timeline {
        member: self.factory.member().clone(),
        generated_at,
        period: Period { start_date, days },
        meta,
        messages,
      },
      rationales: book,
    }
  }

  // ── Event generators ──────────────────────────────────────────────────────

  async fn onboarding(&mut self, draft: &mut Draft, midnight: DateTime<Utc>) {
    let condition = self.factory.member().chronic_condition.clone();

    let welcome = MessageSpec::new(
      Intent::Welcome,
      Sender::Concierge,
      midnight + clock::welcome(),
      MessageType::System,
    )
    .tagged(&[tags::ONBOARD])
    .detail("Send the onboarding welcome and introduce the team.");
    self.emit(draft, welcome).await;

    let plan = MessageSpec::new(
      Intent::InitialPlan,
      Sender::MedicalLead,
      midnight + clock::initial_plan(),
      MessageType::System,
    )
    .tagged(&[tags::PLAN])
    .detail(format!("Share the initial care plan for {condition}."));
    self.emit(draft, plan).await;
  }

  async fn exercise_update(
    &mut self,
    draft: &mut Draft,
    midnight: DateTime<Utc>,
    week: u32,
    travel_week: bool,
  ) {
    let mut detail = format!("Share the exercise plan for weeks {week} and {}.", week + 1);
    let spec_tags: &[&str] = if travel_week {
      detail.push_str(
        " The member is travelling this week, so adapt it for hotel gyms and short sessions.",
      );
      &[tags::EXERCISE_UPDATE, tags::TRAVEL_ADAPT]
    } else {
      &[tags::EXERCISE_UPDATE]
    };

    let spec = MessageSpec::new(
      Intent::ExerciseUpdate,
      Sender::Coach,
      midnight + clock::exercise_update(),
      MessageType::Plan,
    )
    .tagged(spec_tags)
    .meta(MessageMeta { travel_week, ..MessageMeta::default() })
    .detail(detail);
    self.emit(draft, spec).await;
  }

  async fn diagnostic_panel(
    &mut self,
    draft: &mut Draft,
    midnight: DateTime<Utc>,
    calendar: &TravelCalendar,
  ) {
    let id = self.mint(draft, DecisionKind::DiagnosticPanel);
    let scheduled_at = midnight + clock::panel_scheduled();
    let result_at = scheduled_at + clock::panel_result_delay();

    let scheduled = MessageSpec::new(
      Intent::TestScheduled,
      Sender::Concierge,
      scheduled_at,
      MessageType::System,
    )
    .tagged(&[tags::TEST_SCHEDULE])
    .decision(id.clone())
    .meta(MessageMeta { travel_week: calendar.at(scheduled_at), ..MessageMeta::default() })
    .detail(format!(
      "Confirm the diagnostic blood panel booked for {}.",
      result_at.date_naive()
    ));
    self.emit(draft, scheduled).await;

    let result = MessageSpec::new(
      Intent::TestResult,
      Sender::MedicalLead,
      result_at,
      MessageType::Report,
    )
    .tagged(&[tags::TEST_RESULT])
    .decision(id.clone())
    .meta(MessageMeta { travel_week: calendar.at(result_at), ..MessageMeta::default() })
    .detail("Report the diagnostic panel results and what they mean for the plan.");
    self.decide(draft, result, &id, DecisionKind::DiagnosticPanel).await;
  }

  async fn member_status(
    &mut self,
    draft: &mut Draft,
    midnight: DateTime<Utc>,
    adhered: bool,
    travel_week: bool,
  ) {
    let (intent, outcome) = if adhered {
      (Intent::StatusAdhered, tags::ADHERENCE)
    } else {
      (Intent::StatusMissed, tags::MISSED)
    };
    let status = MessageSpec::new(intent, Sender::Member, midnight + clock::status(), MessageType::Chat)
      .tagged(&[tags::STATUS, outcome])
      .meta(MessageMeta {
        member_initiated: true,
        adherence_flag:   Some(adhered),
        travel_week,
      })
      .conversational(0.5)
      .detail(format!(
        "Tell the team whether you followed today's plan (adhered: {adhered}, travelling: {travel_week})."
      ));
    self.emit(draft, status).await;

    if !adhered {
      let reply = MessageSpec::new(
        Intent::SupportiveReply,
        Sender::Concierge,
        midnight + clock::supportive_reply(),
        MessageType::Chat,
      )
      .tagged(&[tags::REPLY, tags::SUPPORT])
      .meta(MessageMeta { travel_week, ..MessageMeta::default() })
      .conversational(0.2)
      .detail("The member missed today's plan; reply supportively and suggest a small next step.");
      self.emit(draft, reply).await;
    }
  }

  async fn member_question(
    &mut self,
    draft: &mut Draft,
    midnight: DateTime<Utc>,
    travel_week: bool,
  ) {
    let asked_at = midnight
      + Duration::hours(clock::QUESTION_HOUR + self.rng.random_range(0..=clock::QUESTION_SPREAD_HOURS));
    let answered_at = asked_at + Duration::hours(self.rng.random_range(1..=clock::REPLY_MAX_HOURS));
    let responder = *Sender::ADVISORS.choose(&mut self.rng).unwrap_or(&Sender::Concierge);

    let question = MessageSpec::new(Intent::MemberQuestion, Sender::Member, asked_at, MessageType::Chat)
      .tagged(&[tags::QUESTION])
      .meta(MessageMeta { member_initiated: true, adherence_flag: None, travel_week })
      .conversational(0.6)
      .detail(if travel_week {
        "Ask the team a scheduling or advice question; you are travelling this week."
      } else {
        "Ask the team a scheduling or advice question."
      });
    let question = self.emit(draft, question).await;

    let reply = MessageSpec::new(Intent::QuestionReply, responder, answered_at, MessageType::Chat)
      .tagged(&[tags::REPLY])
      .meta(MessageMeta { travel_week, ..MessageMeta::default() })
      .conversational(0.2)
      .detail(format!("Answer the member's question: \"{question}\""));
    self.emit(draft, reply).await;
  }

  async fn clinical_decision(
    &mut self,
    draft: &mut Draft,
    midnight: DateTime<Utc>,
    travel_week: bool,
  ) {
    let id = self.mint(draft, DecisionKind::Clinical);
    let spec = MessageSpec::new(
      Intent::ClinicalDecision,
      Sender::MedicalLead,
      midnight + clock::clinical_decision(),
      MessageType::Decision,
    )
    .tagged(&[tags::DECISION])
    .decision(id.clone())
    .meta(MessageMeta { travel_week, ..MessageMeta::default() })
    .detail("Announce a clinical decision, such as a supplement trial, based on recent lipid trends and adherence.");
    self.decide(draft, spec, &id, DecisionKind::Clinical).await;
  }

  async fn check_in(&mut self, draft: &mut Draft, midnight: DateTime<Utc>, travel_week: bool) {
    let spec = MessageSpec::new(
      Intent::CheckIn,
      Sender::Concierge,
      midnight + clock::check_in(),
      MessageType::Chat,
    )
    .tagged(&[tags::CHECKIN])
    .meta(MessageMeta { travel_week, ..MessageMeta::default() })
    .conversational(0.2)
    .detail("Send a short unprompted check-in.");
    self.emit(draft, spec).await;
  }

  // ── Plumbing ──────────────────────────────────────────────────────────────

  /// Build a message and append it; returns its text.
  async fn emit(&mut self, draft: &mut Draft, spec: MessageSpec) -> String {
    tracing::debug!(intent = spec.intent.key(), at = %spec.timestamp, "event");
    let message = self.factory.compose(spec).await;
    let text = message.text.clone();
    draft.messages.push(message);
    text
  }

  /// Emit the announcing message of a decision, then record its rationale
  /// from the messages that precede it.
  async fn decide(
    &mut self,
    draft: &mut Draft,
    spec: MessageSpec,
    id: &DecisionId,
    kind: DecisionKind,
  ) {
    let at = spec.timestamp;
    let context = draft.context(at, self.rationales.window());
    self.emit(draft, spec).await;

    if let Err(e) = self.rationales.record(&mut draft.book, id, kind, &context, at).await {
      // Ids are minted unique per run, so this is unreachable in practice.
      tracing::warn!(decision_id = %id, error = %e, "rationale not recorded");
    }
  }

  /// A fresh decision id, unique within the run.
  fn mint(&mut self, draft: &mut Draft, kind: DecisionKind) -> DecisionId {
    loop {
      let id = DecisionId::from_bits(kind, self.rng.next_u32());
      if draft.issued.insert(id.clone()) {
        return id;
      }
    }
  }
}

/// Stable-sort by timestamp and assign dense 1-based ids in that order.
pub fn finalize(messages: &mut [Message]) {
  messages.sort_by_key(|m| m.timestamp);
  for (i, m) in messages.iter_mut().enumerate() {
    m.id = i as u64 + 1;
  }
}

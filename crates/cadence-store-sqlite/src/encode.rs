//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings and dates are ISO `YYYY-MM-DD`. Closed
//! enums are stored as their lowercase names. Nested structures (member,
//! statistics, message meta, tag lists) are compact JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, de::DeserializeOwned};

use cadence_core::{
  decision::{Confidence, DecisionId, DecisionKind, Rationale},
  member::Role,
  message::{Message, MessageType},
  timeline::{Period, Timeline},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_json<T: Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

/// Parse a JSON column. Failures surface as
/// [`cadence_core::Error::MalformedInput`] quoting the stored text.
pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> {
  serde_json::from_str(s).map_err(|e| cadence_core::Error::malformed(s, &e).into())
}

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Roles outside the closed set read back as `Unknown` so the repair pass
/// can deal with them.
pub fn decode_role(s: &str) -> Role {
  match s {
    "member" => Role::Member,
    "concierge" => Role::Concierge,
    "medical" => Role::Medical,
    "coach" => Role::Coach,
    other => {
      tracing::warn!(role = other, "unrecognised sender role");
      Role::Unknown
    }
  }
}

pub fn encode_message_type(t: MessageType) -> &'static str {
  match t {
    MessageType::System => "system",
    MessageType::Chat => "chat",
    MessageType::Plan => "plan",
    MessageType::Report => "report",
    MessageType::Decision => "decision",
  }
}

pub fn decode_message_type(s: &str) -> Result<MessageType> {
  match s {
    "system" => Ok(MessageType::System),
    "chat" => Ok(MessageType::Chat),
    "plan" => Ok(MessageType::Plan),
    "report" => Ok(MessageType::Report),
    "decision" => Ok(MessageType::Decision),
    other => Err(unknown("message_type", other)),
  }
}

pub fn encode_kind(k: DecisionKind) -> &'static str {
  match k {
    DecisionKind::DiagnosticPanel => "diagnostic_panel",
    DecisionKind::Clinical => "clinical",
  }
}

pub fn decode_kind(s: &str) -> Result<DecisionKind> {
  match s {
    "diagnostic_panel" => Ok(DecisionKind::DiagnosticPanel),
    "clinical" => Ok(DecisionKind::Clinical),
    other => Err(unknown("kind", other)),
  }
}

pub fn encode_confidence(c: Confidence) -> &'static str {
  match c {
    Confidence::Low => "low",
    Confidence::Medium => "medium",
    Confidence::High => "high",
  }
}

pub fn decode_confidence(s: &str) -> Result<Confidence> {
  match s {
    "low" => Ok(Confidence::Low),
    "medium" => Ok(Confidence::Medium),
    "high" => Ok(Confidence::High),
    other => Err(unknown("confidence", other)),
  }
}

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownValue { column, value: value.to_owned() }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Raw strings read directly from the `runs` row.
pub struct RawRun {
  pub member_json:  String,
  pub generated_at: String,
  pub start_date:   String,
  pub days:         u32,
  pub stats_json:   String,
}

impl RawRun {
  pub fn encode(timeline: &Timeline) -> Result<Self> {
    Ok(Self {
      member_json:  encode_json(&timeline.member)?,
      generated_at: encode_dt(timeline.generated_at),
      start_date:   encode_date(timeline.period.start_date),
      days:         timeline.period.days,
      stats_json:   encode_json(&timeline.meta)?,
    })
  }

  pub fn into_timeline(self, messages: Vec<RawMessage>) -> Result<Timeline> {
    Ok(Timeline {
      member:       decode_json(&self.member_json)?,
      generated_at: decode_dt(&self.generated_at)?,
      period:       Period {
        start_date: decode_date(&self.start_date)?,
        days:       self.days,
      },
      meta:         decode_json(&self.stats_json)?,
      messages:     messages
        .into_iter()
        .map(RawMessage::into_message)
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw values read directly from a `messages` row.
pub struct RawMessage {
  pub message_id:   i64,
  pub timestamp:    String,
  pub sender:       String,
  pub sender_role:  String,
  pub text:         String,
  pub tags:         String,
  pub decision_id:  Option<String>,
  pub message_type: String,
  pub meta_json:    String,
}

impl RawMessage {
  pub fn encode(m: &Message) -> Result<Self> {
    Ok(Self {
      message_id:   i64::try_from(m.id).map_err(|_| unknown("message_id", &m.id.to_string()))?,
      timestamp:    encode_dt(m.timestamp),
      sender:       m.sender.clone(),
      sender_role:  m.sender_role.as_str().to_owned(),
      text:         m.text.clone(),
      tags:         encode_json(&m.tags)?,
      decision_id:  m.decision_id.as_ref().map(|id| id.as_str().to_owned()),
      message_type: encode_message_type(m.message_type).to_owned(),
      meta_json:    encode_json(&m.meta)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      id:           u64::try_from(self.message_id)
        .map_err(|_| unknown("message_id", &self.message_id.to_string()))?,
      timestamp:    decode_dt(&self.timestamp)?,
      sender:       self.sender,
      sender_role:  decode_role(&self.sender_role),
      text:         self.text,
      tags:         decode_json(&self.tags)?,
      decision_id:  self.decision_id.map(DecisionId::new),
      message_type: decode_message_type(&self.message_type)?,
      meta:         decode_json(&self.meta_json)?,
    })
  }
}

/// Raw strings read directly from a `rationales` row.
pub struct RawRationale {
  pub decision_id:     String,
  pub kind:            String,
  pub rationale:       String,
  pub confidence:      String,
  pub next_steps:      String,
  pub context_excerpt: String,
  pub created_at:      String,
}

impl RawRationale {
  pub fn encode(r: &Rationale) -> Result<Self> {
    Ok(Self {
      decision_id:     r.decision_id.as_str().to_owned(),
      kind:            encode_kind(r.kind).to_owned(),
      rationale:       r.rationale.clone(),
      confidence:      encode_confidence(r.confidence).to_owned(),
      next_steps:      encode_json(&r.next_steps)?,
      context_excerpt: encode_json(&r.context_excerpt)?,
      created_at:      encode_dt(r.created_at),
    })
  }

  pub fn into_rationale(self) -> Result<Rationale> {
    Ok(Rationale {
      decision_id:     DecisionId::new(self.decision_id),
      kind:            decode_kind(&self.kind)?,
      rationale:       self.rationale,
      confidence:      decode_confidence(&self.confidence)?,
      next_steps:      decode_json(&self.next_steps)?,
      context_excerpt: decode_json(&self.context_excerpt)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }

  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      decision_id:     row.get(0)?,
      kind:            row.get(1)?,
      rationale:       row.get(2)?,
      confidence:      row.get(3)?,
      next_steps:      row.get(4)?,
      context_excerpt: row.get(5)?,
      created_at:      row.get(6)?,
    })
  }
}

impl RawMessage {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:   row.get(0)?,
      timestamp:    row.get(1)?,
      sender:       row.get(2)?,
      sender_role:  row.get(3)?,
      text:         row.get(4)?,
      tags:         row.get(5)?,
      decision_id:  row.get(6)?,
      message_type: row.get(7)?,
      meta_json:    row.get(8)?,
    })
  }
}

impl RawRun {
  pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_json:  row.get(0)?,
      generated_at: row.get(1)?,
      start_date:   row.get(2)?,
      days:         row.get(3)?,
      stats_json:   row.get(4)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_roles_decode_as_unknown() {
    assert_eq!(decode_role("coach"), Role::Coach);
    assert_eq!(decode_role("nutritionist"), Role::Unknown);
  }

  #[test]
  fn broken_json_is_reported_as_malformed_input() {
    let err = decode_json::<Vec<String>>("[\"status\", ").unwrap_err();
    assert!(matches!(
      err,
      Error::Core(cadence_core::Error::MalformedInput { .. })
    ));
  }

  #[test]
  fn enum_columns_reject_unexpected_values() {
    assert!(decode_message_type("memo").is_err());
    assert!(decode_kind("surgery").is_err());
    assert_eq!(decode_confidence("high").unwrap(), Confidence::High);
  }
}

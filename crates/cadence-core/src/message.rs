//! A single timeline message and its metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{decision::DecisionId, member::Role};

// ─── Tags ────────────────────────────────────────────────────────────────────

/// The fixed tag vocabulary. Each event kind draws from its own subset.
pub mod tags {
  pub const ONBOARD: &str = "ONBOARD";
  pub const PLAN: &str = "PLAN";
  pub const TEST_SCHEDULE: &str = "TEST_SCHEDULE";
  pub const TEST_RESULT: &str = "TEST_RESULT";
  pub const EXERCISE_UPDATE: &str = "EXERCISE_UPDATE";
  pub const TRAVEL_ADAPT: &str = "TRAVEL_ADAPT";
  pub const STATUS: &str = "STATUS";
  pub const ADHERENCE: &str = "ADHERENCE";
  pub const MISSED: &str = "MISSED";
  pub const QUESTION: &str = "QUESTION";
  pub const REPLY: &str = "REPLY";
  pub const SUPPORT: &str = "SUPPORT";
  pub const DECISION: &str = "DECISION";
  pub const CHECKIN: &str = "CHECKIN";

  pub const ALL: [&str; 14] = [
    ONBOARD,
    PLAN,
    TEST_SCHEDULE,
    TEST_RESULT,
    EXERCISE_UPDATE,
    TRAVEL_ADAPT,
    STATUS,
    ADHERENCE,
    MISSED,
    QUESTION,
    REPLY,
    SUPPORT,
    DECISION,
    CHECKIN,
  ];
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse message classification used by the viewer for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
  System,
  Chat,
  Plan,
  Report,
  Decision,
}

/// Structured flags carried by every message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
  pub member_initiated: bool,
  /// Adherence outcome of a status update; `None` for every other message.
  pub adherence_flag:   Option<bool>,
  pub travel_week:      bool,
}

// ─── Message ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  /// Dense 1-based position in the finished timeline. Zero while the run is
  /// still being generated; the scheduler assigns ids after its final sort.
  pub id:           u64,
  pub timestamp:    DateTime<Utc>,
  /// Display name of the author.
  pub sender:       String,
  #[serde(default)]
  pub sender_role:  Role,
  pub text:         String,
  pub tags:         Vec<String>,
  pub decision_id:  Option<DecisionId>,
  pub message_type: MessageType,
  pub meta:         MessageMeta,
}

impl Message {
  pub fn has_tag(&self, tag: &str) -> bool {
    self.tags.iter().any(|t| t == tag)
  }
}

//! The member profile and the fixed cast of people in a conversation.
//!
//! Every message is authored by one [`Sender`] slot. The slot decides the
//! message's [`Role`] through a single closed `match`, so the mapping is total
//! by construction. [`Cast`] only attaches display names to the slots.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Member ──────────────────────────────────────────────────────────────────

/// The person being coached. Created once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
  pub id:                String,
  pub name:              String,
  pub age:               u8,
  pub location:          String,
  /// Free-text tag, e.g. "High LDL cholesterol".
  pub chronic_condition: String,
}

impl Default for Member {
  fn default() -> Self {
    Self {
      id:                "rohan_patel_001".into(),
      name:              "Rohan Patel".into(),
      age:               36,
      location:          "Singapore".into(),
      chronic_condition: "High LDL cholesterol".into(),
    }
  }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

/// The role recorded on every message.
///
/// `Unknown` is never produced by the scheduler. It only appears when reading
/// data written by something else, and is cleared by
/// [`crate::validate::repair_roles`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Member,
  Concierge,
  Medical,
  Coach,
  #[default]
  Unknown,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Member => "member",
      Self::Concierge => "concierge",
      Self::Medical => "medical",
      Self::Coach => "coach",
      Self::Unknown => "unknown",
    }
  }
}

impl std::fmt::Display for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A seat in the fixed cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
  Member,
  Concierge,
  MedicalLead,
  Coach,
}

impl Sender {
  pub const ALL: [Sender; 4] =
    [Self::Member, Self::Concierge, Self::MedicalLead, Self::Coach];

  /// Everyone who may answer the member.
  pub const ADVISORS: [Sender; 3] =
    [Self::Concierge, Self::MedicalLead, Self::Coach];

  pub fn role(self) -> Role {
    match self {
      Self::Member => Role::Member,
      Self::Concierge => Role::Concierge,
      Self::MedicalLead => Role::Medical,
      Self::Coach => Role::Coach,
    }
  }
}

// ─── Cast ────────────────────────────────────────────────────────────────────

/// Display names for each [`Sender`] seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cast {
  pub member:       String,
  pub concierge:    String,
  pub medical_lead: String,
  pub coach:        String,
}

impl Default for Cast {
  fn default() -> Self {
    Self {
      member:       "Rohan".into(),
      concierge:    "Ruby".into(),
      medical_lead: "Dr_Warren".into(),
      coach:        "Advik".into(),
    }
  }
}

impl Cast {
  pub fn name(&self, sender: Sender) -> &str {
    match sender {
      Sender::Member => &self.member,
      Sender::Concierge => &self.concierge,
      Sender::MedicalLead => &self.medical_lead,
      Sender::Coach => &self.coach,
    }
  }

  /// Find the seat a display name belongs to.
  pub fn sender_named(&self, name: &str) -> Option<Sender> {
    Sender::ALL.into_iter().find(|s| self.name(*s) == name)
  }

  /// The role for a display name, if it belongs to this cast.
  pub fn role_of(&self, name: &str) -> Option<Role> {
    self.sender_named(name).map(Sender::role)
  }

  /// Names must be non-empty and pairwise distinct, otherwise a sender name
  /// could not be mapped back to exactly one role.
  pub fn validate(&self) -> Result<()> {
    for (i, a) in Sender::ALL.iter().enumerate() {
      let name = self.name(*a);
      if name.trim().is_empty() {
        return Err(Error::InvalidCast(format!("{a:?} has an empty name")));
      }
      for b in &Sender::ALL[i + 1..] {
        if self.name(*b) == name {
          return Err(Error::InvalidCast(format!(
            "{a:?} and {b:?} share the name {name:?}"
          )));
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_sender_has_a_known_role() {
    for sender in Sender::ALL {
      assert_ne!(sender.role(), Role::Unknown);
    }
  }

  #[test]
  fn cast_round_trips_names_to_roles() {
    let cast = Cast::default();
    for sender in Sender::ALL {
      assert_eq!(cast.role_of(cast.name(sender)), Some(sender.role()));
    }
    assert_eq!(cast.role_of("Stranger"), None);
  }

  #[test]
  fn duplicate_names_are_rejected() {
    let cast = Cast { coach: "Ruby".into(), ..Cast::default() };
    assert!(matches!(cast.validate(), Err(Error::InvalidCast(_))));
  }

  #[test]
  fn blank_names_are_rejected() {
    let cast = Cast { member: "  ".into(), ..Cast::default() };
    assert!(cast.validate().is_err());
    assert!(Cast::default().validate().is_ok());
  }

  #[test]
  fn missing_role_deserialises_as_unknown() {
    #[derive(Deserialize)]
    struct Probe {
      #[serde(default)]
      role: Role,
    }
    let probe: Probe = serde_json::from_str("{}").unwrap();
    assert_eq!(probe.role, Role::Unknown);
  }
}

//! Structural checks over a persisted timeline, and the role repair pass.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
  decision::{DecisionId, RationaleBook},
  member::{Cast, Role},
  timeline::Timeline,
};

/// One broken invariant. Validation collects all of them rather than
/// stopping at the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("message {id} is earlier than message {previous}")]
  OutOfOrder { previous: u64, id: u64 },

  #[error("message at position {position} has id {found}, expected {expected}")]
  IdGap { position: usize, expected: u64, found: u64 },

  #[error("message {id} from {sender:?} has no known role")]
  UnknownRole { id: u64, sender: String },

  #[error("message {id} from {sender:?} is marked {found}, expected {expected}")]
  RoleMismatch { id: u64, sender: String, found: Role, expected: Role },

  #[error("sender {sender:?} appears with more than one role: {roles:?}")]
  InconsistentRole { sender: String, roles: Vec<Role> },

  #[error("decision {0} has no rationale")]
  MissingRationale(DecisionId),

  #[error("rationale {0} is not referenced by any message")]
  OrphanRationale(DecisionId),
}

/// Check a timeline on its own: ordering, dense ids, role consistency per
/// sender, and decision/rationale pairing.
pub fn validate(timeline: &Timeline, rationales: &RationaleBook) -> Vec<Violation> {
  check(timeline, rationales, None)
}

/// Like [`validate`], and additionally require every sender's role to match
/// its seat in `cast`.
pub fn validate_with_cast(
  timeline: &Timeline,
  rationales: &RationaleBook,
  cast: &Cast,
) -> Vec<Violation> {
  check(timeline, rationales, Some(cast))
}

fn check(
  timeline: &Timeline,
  rationales: &RationaleBook,
  cast: Option<&Cast>,
) -> Vec<Violation> {
  let mut out = Vec::new();
  let messages = &timeline.messages;

  for (position, m) in messages.iter().enumerate() {
    let expected = position as u64 + 1;
    if m.id != expected {
      out.push(Violation::IdGap { position, expected, found: m.id });
    }
  }
  for pair in messages.windows(2) {
    if pair[1].timestamp < pair[0].timestamp {
      out.push(Violation::OutOfOrder { previous: pair[0].id, id: pair[1].id });
    }
  }

  let mut seen: BTreeMap<&str, BTreeSet<Role>> = BTreeMap::new();
  for m in messages {
    if m.sender_role == Role::Unknown {
      out.push(Violation::UnknownRole { id: m.id, sender: m.sender.clone() });
      continue;
    }
    seen.entry(m.sender.as_str()).or_default().insert(m.sender_role);
    if let Some(cast) = cast {
      match cast.role_of(&m.sender) {
        Some(expected) if expected != m.sender_role => {
          out.push(Violation::RoleMismatch {
            id: m.id,
            sender: m.sender.clone(),
            found: m.sender_role,
            expected,
          });
        }
        Some(_) => {}
        None => out.push(Violation::UnknownRole { id: m.id, sender: m.sender.clone() }),
      }
    }
  }
  for (sender, roles) in seen {
    if roles.len() > 1 {
      out.push(Violation::InconsistentRole {
        sender: sender.to_owned(),
        roles:  roles.into_iter().collect(),
      });
    }
  }

  let referenced: BTreeSet<&DecisionId> =
    messages.iter().filter_map(|m| m.decision_id.as_ref()).collect();
  for id in &referenced {
    if !rationales.contains(id) {
      out.push(Violation::MissingRationale((*id).clone()));
    }
  }
  for r in rationales.iter() {
    if !referenced.contains(&r.decision_id) {
      out.push(Violation::OrphanRationale(r.decision_id.clone()));
    }
  }

  out
}

/// Re-derive the role of every message whose role is unknown from its
/// sender name. Returns how many messages were repaired; senders that are not
/// part of `cast` stay unknown and are logged.
pub fn repair_roles(timeline: &mut Timeline, cast: &Cast) -> usize {
  let mut repaired = 0;
  for m in timeline.messages.iter_mut().filter(|m| m.sender_role == Role::Unknown) {
    match cast.role_of(&m.sender) {
      Some(role) => {
        m.sender_role = role;
        repaired += 1;
      }
      None => {
        tracing::warn!(id = m.id, sender = %m.sender, "no role mapping for sender");
      }
    }
  }
  repaired
}

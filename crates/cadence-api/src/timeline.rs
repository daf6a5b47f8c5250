//! Handlers for the timeline and its messages.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/timeline` | `ETag` is the timeline fingerprint; honours `If-None-Match` |
//! | `GET`  | `/timeline/summary` | member, period, statistics, fingerprint |
//! | `GET`  | `/messages` | `?sender_role&tag&decision_id&limit&offset` |

use std::collections::BTreeSet;

use axum::{
  Json,
  extract::{Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use cadence_core::{
  TextGenerator,
  member::Member,
  message::Message,
  store::{MessageQuery, TimelineStore},
  timeline::{Period, Timeline, TimelineStats},
};
use serde::Serialize;

use crate::{AppState, error::ApiError};

pub(crate) async fn load<S: TimelineStore>(store: &S) -> Result<Timeline, ApiError> {
  store
    .load_timeline()
    .await
    .map_err(ApiError::store)?
    .ok_or_else(ApiError::no_timeline)
}

fn quoted(fingerprint: &str) -> String { format!("\"{fingerprint}\"") }

/// Whether an `If-None-Match` header already names `etag`.
fn not_modified(headers: &HeaderMap, etag: &str) -> bool {
  headers
    .get_all(header::IF_NONE_MATCH)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(','))
    .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
    .any(|tag| tag == "*" || tag == etag.trim_matches('"'))
}

// ─── Full timeline ───────────────────────────────────────────────────────────

/// `GET /timeline`
pub async fn full<S, G>(
  State(state): State<AppState<S, G>>,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: TimelineStore,
  G: TextGenerator,
{
  let timeline = load(state.store.as_ref()).await?;
  let etag = quoted(&timeline.fingerprint()?);

  if not_modified(&headers, &etag) {
    return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
  }
  Ok(([(header::ETAG, etag)], Json(timeline)).into_response())
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Summary {
  pub member:      Member,
  pub period:      Period,
  pub meta:        TimelineStats,
  pub decisions:   usize,
  pub fingerprint: String,
}

/// `GET /timeline/summary`
pub async fn summary<S, G>(
  State(state): State<AppState<S, G>>,
) -> Result<Json<Summary>, ApiError>
where
  S: TimelineStore,
  G: TextGenerator,
{
  let timeline = load(state.store.as_ref()).await?;
  let fingerprint = timeline.fingerprint()?;
  let decisions = timeline
    .messages
    .iter()
    .filter_map(|m| m.decision_id.as_ref())
    .collect::<BTreeSet<_>>()
    .len();

  Ok(Json(Summary {
    member: timeline.member,
    period: timeline.period,
    meta: timeline.meta,
    decisions,
    fingerprint,
  }))
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// `GET /messages[?sender_role=..&tag=..&decision_id=..&limit=..&offset=..]`
pub async fn messages<S, G>(
  State(state): State<AppState<S, G>>,
  Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, ApiError>
where
  S: TimelineStore,
  G: TextGenerator,
{
  let timeline = load(state.store.as_ref()).await?;
  Ok(Json(query.apply(&timeline.messages).into_iter().cloned().collect()))
}

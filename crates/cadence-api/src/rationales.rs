//! Handlers for `/rationales` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/rationales` | Every stored record, ordered by decision id |
//! | `GET`  | `/rationales/{decision_id}` | 404 if not stored |
//! | `GET`  | `/rationales/{decision_id}?message_id=N` | Synthesised from the messages before `N` if not stored |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use cadence_core::{
  TextGenerator,
  decision::{DecisionId, Rationale},
  store::TimelineStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, timeline::load};

/// `GET /rationales`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
) -> Result<Json<Vec<Rationale>>, ApiError>
where
  S: TimelineStore,
  G: TextGenerator,
{
  let all = state.store.list_rationales().await.map_err(ApiError::store)?;
  Ok(Json(all))
}

#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
  /// The message that announced the decision. Enables on-demand synthesis.
  pub message_id: Option<u64>,
}

/// `GET /rationales/{decision_id}[?message_id=N]`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(decision_id): Path<String>,
  Query(params): Query<GetParams>,
) -> Result<Json<Rationale>, ApiError>
where
  S: TimelineStore,
  G: TextGenerator,
{
  let id = DecisionId::new(decision_id);
  if let Some(found) = state.store.get_rationale(&id).await.map_err(ApiError::store)? {
    return Ok(Json(found));
  }

  let Some(message_id) = params.message_id else {
    return Err(ApiError::NotFound(format!("no rationale recorded for {id}")));
  };

  let timeline = load(state.store.as_ref()).await?;
  let message = timeline
    .message(message_id)
    .ok_or_else(|| ApiError::NotFound(format!("message {message_id} not found")))?;
  if message.decision_id.as_ref() != Some(&id) {
    return Err(ApiError::BadRequest(format!(
      "message {message_id} does not announce {id}"
    )));
  }

  let context = timeline.preceding(message_id, state.rationales.window());
  let rationale = state
    .rationales
    .synthesize(&id, id.kind(), context, message.timestamp)
    .await;

  let inserted = state
    .store
    .insert_rationale(rationale.clone())
    .await
    .map_err(ApiError::store)?;
  if inserted {
    tracing::info!(decision_id = %id, message_id, "rationale synthesised on demand");
    return Ok(Json(rationale));
  }

  // Another request stored one first; that record stands.
  state
    .store
    .get_rationale(&id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("no rationale recorded for {id}")))
}

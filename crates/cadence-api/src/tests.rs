//! Router tests against an in-memory store and the template generator.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use cadence_core::{
  decision::{DecisionKind, Rationale, RationaleBook},
  generate::TemplateGenerator,
  member::{Cast, Member, Role},
  message::{Message, tags},
  schedule::{ConversationScheduler, ScheduleRules, Seeds},
  store::{MemoryStore, TimelineStore},
  timeline::GeneratedRun,
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt as _;

use crate::api_router;

async fn generated() -> GeneratedRun {
  let mut rules = ScheduleRules::default();
  rules.clinical_decision_daily_p = 0.1;
  ConversationScheduler::new(
    Arc::new(TemplateGenerator),
    Member::default(),
    Cast::default(),
    rules,
    Seeds::fixed(17, 17),
  )
  .unwrap()
  .run_at(
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    120,
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
  )
  .await
}

fn router(store: Arc<MemoryStore>) -> Router {
  api_router(store, Arc::new(TemplateGenerator), 8)
}

async fn get(router: Router, uri: &str, headers: &[(header::HeaderName, &str)]) -> Response {
  let mut builder = Request::builder().method("GET").uri(uri);
  for (k, v) in headers {
    builder = builder.header(k, *v);
  }
  router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
}

async fn json(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ── Timeline ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_is_missing_input() {
  let resp = get(router(Arc::new(MemoryStore::new())), "/timeline", &[]).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  let body = json(resp).await;
  assert!(body["error"].as_str().unwrap().contains("cadence generate"));
}

#[tokio::test]
async fn timeline_carries_fingerprint_etag() {
  let run = generated().await;
  let fingerprint = run.timeline.fingerprint().unwrap();
  let store = Arc::new(MemoryStore::with_run(run.clone()));

  let resp = get(router(store.clone()), "/timeline", &[]).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let etag = resp.headers().get(header::ETAG).unwrap().to_str().unwrap().to_owned();
  assert_eq!(etag, format!("\"{fingerprint}\""));
  let body = json(resp).await;
  assert_eq!(
    body["messages"].as_array().unwrap().len(),
    run.timeline.messages.len()
  );

  let resp = get(router(store), "/timeline", &[(header::IF_NONE_MATCH, etag.as_str())]).await;
  assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn summary_reports_stats() {
  let run = generated().await;
  let store = Arc::new(MemoryStore::with_run(run.clone()));
  let body = json(get(router(store), "/timeline/summary", &[]).await).await;

  assert_eq!(body["member"]["id"], "rohan_patel_001");
  assert_eq!(body["period"]["days"], 120);
  assert_eq!(body["meta"]["total_messages"], run.timeline.messages.len());
  assert_eq!(body["decisions"], run.rationales.len());
  assert_eq!(body["fingerprint"], run.timeline.fingerprint().unwrap());
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn messages_filter_by_role_and_page() {
  let run = generated().await;
  let store = Arc::new(MemoryStore::with_run(run.clone()));

  let resp = get(router(store.clone()), "/messages?sender_role=coach&limit=2&offset=1", &[]).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let page: Vec<Message> = serde_json::from_value(json(resp).await).unwrap();
  let coach: Vec<_> = run
    .timeline
    .messages
    .iter()
    .filter(|m| m.sender_role == Role::Coach)
    .collect();
  assert_eq!(page.len(), 2);
  assert_eq!(page[0].id, coach[1].id);

  let resp = get(router(store), &format!("/messages?tag={}", tags::ONBOARD), &[]).await;
  let onboard: Vec<Message> = serde_json::from_value(json(resp).await).unwrap();
  assert_eq!(onboard.len(), 1);
}

#[tokio::test]
async fn unknown_role_filter_is_rejected() {
  let store = Arc::new(MemoryStore::with_run(generated().await));
  let resp = get(router(store), "/messages?sender_role=pharmacist", &[]).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Rationales ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn stored_rationales_are_served() {
  let run = generated().await;
  let store = Arc::new(MemoryStore::with_run(run.clone()));

  let all: Vec<Rationale> =
    serde_json::from_value(json(get(router(store.clone()), "/rationales", &[]).await).await)
      .unwrap();
  assert_eq!(all.len(), run.rationales.len());

  let first = run.rationales.iter().next().unwrap();
  let resp = get(router(store), &format!("/rationales/{}", first.decision_id), &[]).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let served: Rationale = serde_json::from_value(json(resp).await).unwrap();
  assert_eq!(&served, first);
}

#[tokio::test]
async fn unknown_rationale_without_message_is_404() {
  let store = Arc::new(MemoryStore::with_run(generated().await));
  let resp = get(router(store), "/rationales/decision_deadbeef", &[]).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

fn without_rationales(run: &GeneratedRun) -> GeneratedRun {
  GeneratedRun { timeline: run.timeline.clone(), rationales: RationaleBook::new() }
}

#[tokio::test]
async fn missing_rationale_is_synthesised_once() {
  let run = generated().await;
  let store = Arc::new(MemoryStore::with_run(without_rationales(&run)));
  let announcing = run
    .timeline
    .messages
    .iter()
    .find(|m| m.has_tag(tags::DECISION))
    .expect("a clinical decision");
  let id = announcing.decision_id.clone().unwrap();
  let uri = format!("/rationales/{id}?message_id={}", announcing.id);

  let resp = get(router(store.clone()), &uri, &[]).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let made: Rationale = serde_json::from_value(json(resp).await).unwrap();
  assert_eq!(made.decision_id, id);
  assert_eq!(made.kind, DecisionKind::Clinical);
  assert_eq!(made.created_at, announcing.timestamp);
  assert!(!made.context_excerpt.is_empty());
  assert_eq!(store.get_rationale(&id).await.unwrap(), Some(made.clone()));

  // A second request returns the stored record rather than a new one.
  let again: Rationale =
    serde_json::from_value(json(get(router(store), &uri, &[]).await).await).unwrap();
  assert_eq!(again, made);
}

#[tokio::test]
async fn synthesis_requires_the_announcing_message() {
  let run = generated().await;
  let store = Arc::new(MemoryStore::with_run(without_rationales(&run)));
  let id = run
    .timeline
    .messages
    .iter()
    .find_map(|m| m.decision_id.clone())
    .unwrap();
  let unrelated = run
    .timeline
    .messages
    .iter()
    .find(|m| m.decision_id.is_none())
    .unwrap();

  let resp = get(
    router(store.clone()),
    &format!("/rationales/{id}?message_id={}", unrelated.id),
    &[],
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let resp = get(router(store.clone()), &format!("/rationales/{id}?message_id=999999"), &[]).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert!(store.list_rationales().await.unwrap().is_empty());
}

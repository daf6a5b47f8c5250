//! Integration tests for `SqliteStore` against in-memory and on-disk
//! databases.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use cadence_core::{
  decision::DecisionId,
  generate::TemplateGenerator,
  member::{Cast, Member, Role},
  schedule::{ConversationScheduler, ScheduleRules, Seeds},
  store::TimelineStore,
  timeline::GeneratedRun,
  validate::validate,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn run(seed: u64, days: i64) -> GeneratedRun {
  ConversationScheduler::new(
    Arc::new(TemplateGenerator),
    Member::default(),
    Cast::default(),
    ScheduleRules::default(),
    Seeds::fixed(seed, seed),
  )
  .unwrap()
  .run_at(
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    days,
    Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap(),
  )
  .await
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_is_empty() {
  let s = store().await;
  assert!(s.load_timeline().await.unwrap().is_none());
  assert!(s.list_rationales().await.unwrap().is_empty());
}

#[tokio::test]
async fn run_round_trips() {
  let s = store().await;
  let run = run(1, 200).await;
  s.save_run(&run).await.unwrap();

  let loaded = s.load_timeline().await.unwrap().unwrap();
  assert_eq!(loaded, run.timeline);
  assert_eq!(
    loaded.fingerprint().unwrap(),
    run.timeline.fingerprint().unwrap()
  );

  let rationales = s.list_rationales().await.unwrap();
  assert_eq!(rationales, run.rationales.iter().cloned().collect::<Vec<_>>());
  assert!(validate(&loaded, &rationales.into_iter().collect()).is_empty());
}

#[tokio::test]
async fn saving_a_run_replaces_the_previous_one() {
  let s = store().await;
  let first = run(1, 200).await;
  let second = run(2, 30).await;
  s.save_run(&first).await.unwrap();
  s.save_run(&second).await.unwrap();

  assert_eq!(s.load_timeline().await.unwrap(), Some(second.timeline));
  let ids: Vec<_> = s
    .list_rationales()
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.decision_id)
    .collect();
  let expected: Vec<_> = second.rationales.iter().map(|r| r.decision_id.clone()).collect();
  assert_eq!(ids, expected);
}

#[tokio::test]
async fn empty_run_is_stored_as_empty() {
  let s = store().await;
  let empty = run(1, 0).await;
  s.save_run(&empty).await.unwrap();
  let loaded = s.load_timeline().await.unwrap().unwrap();
  assert!(loaded.messages.is_empty());
}

#[tokio::test]
async fn save_timeline_keeps_rationales() {
  let s = store().await;
  let run = run(3, 120).await;
  s.save_run(&run).await.unwrap();

  let mut timeline = run.timeline.clone();
  timeline.messages[0].sender_role = Role::Unknown;
  s.save_timeline(&timeline).await.unwrap();

  let loaded = s.load_timeline().await.unwrap().unwrap();
  assert_eq!(loaded.messages[0].sender_role, Role::Unknown);
  assert_eq!(s.list_rationales().await.unwrap().len(), run.rationales.len());
}

// ─── Rationales ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn rationales_are_insert_only() {
  let s = store().await;
  let run = run(4, 120).await;
  s.save_run(&run).await.unwrap();

  let mut existing = run.rationales.iter().next().unwrap().clone();
  let original = existing.clone();
  existing.rationale = "Overwritten.".into();
  assert!(!s.insert_rationale(existing.clone()).await.unwrap());
  assert_eq!(
    s.get_rationale(&existing.decision_id).await.unwrap(),
    Some(original.clone())
  );

  let mut fresh = original;
  fresh.decision_id = DecisionId::new("decision_ffffffff");
  assert!(s.insert_rationale(fresh.clone()).await.unwrap());
  assert_eq!(s.get_rationale(&fresh.decision_id).await.unwrap(), Some(fresh));
}

#[tokio::test]
async fn missing_rationale_is_none() {
  let s = store().await;
  let id = DecisionId::new("decision_00000000");
  assert!(s.get_rationale(&id).await.unwrap().is_none());
}

// ─── Files ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn persists_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cadence.db");
  let run = run(5, 90).await;

  SqliteStore::open(&path).await.unwrap().save_run(&run).await.unwrap();
  let reopened = SqliteStore::open(&path).await.unwrap();
  assert_eq!(reopened.load_timeline().await.unwrap(), Some(run.timeline));
}

#[tokio::test]
async fn corrupt_columns_surface_as_malformed_input() {
  let s = store().await;
  s.save_run(&run(6, 10).await).await.unwrap();
  s.conn
    .call(|conn| {
      conn.execute("UPDATE messages SET tags = '[\"onboard\", ' WHERE message_id = 1", [])?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s.load_timeline().await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(cadence_core::Error::MalformedInput { .. })
  ));
}

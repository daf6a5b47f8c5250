//! [`SqliteStore`], the SQLite implementation of [`TimelineStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;

use cadence_core::{
  decision::{DecisionId, Rationale},
  store::TimelineStore,
  timeline::{GeneratedRun, Timeline},
};

use crate::{
  Result,
  encode::{RawMessage, RawRationale, RawRun},
  schema::SCHEMA,
};

const SELECT_RATIONALE: &str = "SELECT decision_id, kind, rationale, confidence, next_steps,
          context_excerpt, created_at
   FROM rationales";

const INSERT_RATIONALE: &str = "INSERT OR IGNORE INTO rationales (
     decision_id, kind, rationale, confidence, next_steps, context_excerpt, created_at
   ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Cadence timeline store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn write_timeline(
  tx: &rusqlite::Transaction<'_>,
  run: &RawRun,
  messages: &[RawMessage],
) -> rusqlite::Result<()> {
  tx.execute("DELETE FROM messages", [])?;
  tx.execute(
    "INSERT OR REPLACE INTO runs (run_key, member_json, generated_at, start_date, days, stats_json)
     VALUES (1, ?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      run.member_json,
      run.generated_at,
      run.start_date,
      run.days,
      run.stats_json,
    ],
  )?;

  let mut stmt = tx.prepare(
    "INSERT INTO messages (
       message_id, timestamp, sender, sender_role, text,
       tags, decision_id, message_type, meta_json
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
  )?;
  for m in messages {
    stmt.execute(rusqlite::params![
      m.message_id,
      m.timestamp,
      m.sender,
      m.sender_role,
      m.text,
      m.tags,
      m.decision_id,
      m.message_type,
      m.meta_json,
    ])?;
  }
  Ok(())
}

fn insert_rationale(conn: &rusqlite::Connection, r: &RawRationale) -> rusqlite::Result<usize> {
  conn.execute(
    INSERT_RATIONALE,
    rusqlite::params![
      r.decision_id,
      r.kind,
      r.rationale,
      r.confidence,
      r.next_steps,
      r.context_excerpt,
      r.created_at,
    ],
  )
}

fn encode_timeline(timeline: &Timeline) -> Result<(RawRun, Vec<RawMessage>)> {
  let run = RawRun::encode(timeline)?;
  let messages = timeline
    .messages
    .iter()
    .map(RawMessage::encode)
    .collect::<Result<Vec<_>>>()?;
  Ok((run, messages))
}

// ─── TimelineStore impl ──────────────────────────────────────────────────────

impl TimelineStore for SqliteStore {
  type Error = crate::Error;

  async fn save_run(&self, run: &GeneratedRun) -> Result<()> {
    let (raw_run, messages) = encode_timeline(&run.timeline)?;
    let rationales = run
      .rationales
      .iter()
      .map(RawRationale::encode)
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        write_timeline(&tx, &raw_run, &messages)?;
        tx.execute("DELETE FROM rationales", [])?;
        for r in &rationales {
          insert_rationale(&tx, r)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(
      messages = run.timeline.messages.len(),
      rationales = run.rationales.len(),
      "run saved"
    );
    Ok(())
  }

  async fn save_timeline(&self, timeline: &Timeline) -> Result<()> {
    let (raw_run, messages) = encode_timeline(timeline)?;
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        write_timeline(&tx, &raw_run, &messages)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_timeline(&self) -> Result<Option<Timeline>> {
    let raw: Option<(RawRun, Vec<RawMessage>)> = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let run = tx
          .query_row(
            "SELECT member_json, generated_at, start_date, days, stats_json
             FROM runs WHERE run_key = 1",
            [],
            RawRun::read,
          )
          .optional()?;
        let Some(run) = run else {
          return Ok(None);
        };
        let messages = {
          let mut stmt = tx.prepare(
            "SELECT message_id, timestamp, sender, sender_role, text,
                    tags, decision_id, message_type, meta_json
             FROM messages ORDER BY message_id",
          )?;
          stmt
            .query_map([], RawMessage::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(Some((run, messages)))
      })
      .await?;

    raw.map(|(run, messages)| run.into_timeline(messages)).transpose()
  }

  async fn get_rationale(&self, id: &DecisionId) -> Result<Option<Rationale>> {
    let id_str = id.as_str().to_owned();
    let raw: Option<RawRationale> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("{SELECT_RATIONALE} WHERE decision_id = ?1"),
              rusqlite::params![id_str],
              RawRationale::read,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRationale::into_rationale).transpose()
  }

  async fn insert_rationale(&self, rationale: Rationale) -> Result<bool> {
    let raw = RawRationale::encode(&rationale)?;
    let inserted = self
      .conn
      .call(move |conn| Ok(insert_rationale(conn, &raw)?))
      .await?;
    Ok(inserted == 1)
  }

  async fn list_rationales(&self) -> Result<Vec<Rationale>> {
    let raws: Vec<RawRationale> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("{SELECT_RATIONALE} ORDER BY decision_id"))?;
        let rows = stmt
          .query_map([], RawRationale::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRationale::into_rationale).collect()
  }
}

//! SQL schema for the Cadence SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout revision for later migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- At most one run is stored. Replacing it rewrites this row and every
-- message inside a single transaction.
CREATE TABLE IF NOT EXISTS runs (
    run_key       INTEGER PRIMARY KEY CHECK (run_key = 1),
    member_json   TEXT NOT NULL,
    generated_at  TEXT NOT NULL,   -- RFC 3339 UTC
    start_date    TEXT NOT NULL,   -- YYYY-MM-DD
    days          INTEGER NOT NULL,
    stats_json    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    message_id    INTEGER PRIMARY KEY,   -- dense, 1-based, time order
    timestamp     TEXT NOT NULL,
    sender        TEXT NOT NULL,
    sender_role   TEXT NOT NULL,
    text          TEXT NOT NULL,
    tags          TEXT NOT NULL DEFAULT '[]',
    decision_id   TEXT,
    message_type  TEXT NOT NULL,
    meta_json     TEXT NOT NULL
);

-- Rationales are insert-only outside of a full run replacement.
CREATE TABLE IF NOT EXISTS rationales (
    decision_id      TEXT PRIMARY KEY,
    kind             TEXT NOT NULL,   -- 'diagnostic_panel' | 'clinical'
    rationale        TEXT NOT NULL,
    confidence       TEXT NOT NULL,   -- 'low' | 'medium' | 'high'
    next_steps       TEXT NOT NULL DEFAULT '[]',
    context_excerpt  TEXT NOT NULL DEFAULT '[]',
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_decision_idx ON messages(decision_id);

PRAGMA user_version = 1;
";

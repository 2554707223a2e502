/// SQL DDL for the valet event log.
/// Only CREATE, INSERT, and SELECT statements exist anywhere in this crate;
/// the append-only contract is upheld by construction.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    source TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    ingested_at TEXT NOT NULL,
    person_ids TEXT NOT NULL DEFAULT '[]',
    person_count INTEGER NOT NULL DEFAULT 0,
    account_id TEXT,
    opportunity_id TEXT,
    meeting_id TEXT,
    thread_id TEXT,
    transcript_id TEXT,
    payload TEXT NOT NULL,
    derived_metadata TEXT
);

CREATE TABLE IF NOT EXISTS event_persons (
    event_id TEXT NOT NULL REFERENCES events(id),
    person_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_occurred ON events(occurred_at);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
CREATE INDEX IF NOT EXISTS idx_events_type_occurred ON events(type, occurred_at);
CREATE INDEX IF NOT EXISTS idx_events_person_count ON events(person_count, occurred_at);
CREATE INDEX IF NOT EXISTS idx_events_account ON events(account_id);
CREATE INDEX IF NOT EXISTS idx_events_opportunity ON events(opportunity_id);
CREATE INDEX IF NOT EXISTS idx_events_meeting ON events(meeting_id);
CREATE INDEX IF NOT EXISTS idx_events_thread ON events(thread_id);
CREATE INDEX IF NOT EXISTS idx_events_transcript ON events(transcript_id);
CREATE INDEX IF NOT EXISTS idx_event_persons_person ON event_persons(person_id);
CREATE INDEX IF NOT EXISTS idx_event_persons_event ON event_persons(event_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

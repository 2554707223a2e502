use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A log record persisted to SQLite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub source: Option<String>,
}

/// Query parameters for searching persisted logs.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub source: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite sink that persists warn+ logs. Useful when a dropped event or a
/// degraded query needs to be diagnosed after the fact.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS logs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 source TEXT,
                 created_at TEXT NOT NULL DEFAULT (datetime('now'))
             );
             CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
             CREATE INDEX IF NOT EXISTS idx_logs_source ON logs(source);
             CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, record: &LogInsert) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.timestamp,
                record.level,
                record.target,
                record.message,
                record.fields,
                record.source,
            ],
        );
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, source FROM logs WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(level) = &q.level {
            sql.push_str(&format!(" AND level = ?{}", params.len() + 1));
            params.push(Box::new(level.clone()));
        }
        if let Some(target) = &q.target {
            sql.push_str(&format!(" AND target LIKE ?{}", params.len() + 1));
            params.push(Box::new(format!("%{target}%")));
        }
        if let Some(source) = &q.source {
            sql.push_str(&format!(" AND source = ?{}", params.len() + 1));
            params.push(Box::new(source.clone()));
        }
        if let Some(since) = &q.since {
            sql.push_str(&format!(" AND timestamp >= ?{}", params.len() + 1));
            params.push(Box::new(since.clone()));
        }

        sql.push_str(" ORDER BY id DESC");

        let limit = q.limit.unwrap_or(100);
        sql.push_str(&format!(" LIMIT {limit}"));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                source: row.get(6)?,
            })
        })?;

        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

struct LogInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    source: Option<String>,
}

/// tracing Layer that writes warn+ events to SQLite.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

/// Visitor that pulls the message, the upstream `source` field, and the
/// remaining fields out of a tracing event.
struct FieldVisitor {
    message: Option<String>,
    source: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            source: None,
            fields: serde_json::Map::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(val),
            "source" => self.source = Some(val.trim_matches('"').to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(val));
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "source" => self.source = Some(value.to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        // Only persist WARN and above
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let fields_json = if visitor.fields.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&visitor.fields).unwrap_or_default())
        };

        let record = LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: fields_json,
            source: visitor.source,
        };

        self.sink.insert(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("valet-test-logs-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("test-logs.db")
    }

    fn insert(sink: &SqliteLogSink, level: &str, message: &str, source: Option<&str>) {
        sink.insert(&LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.into(),
            target: "valet_store::events".into(),
            message: message.into(),
            fields: None,
            source: source.map(|s| s.to_string()),
        });
    }

    #[test]
    fn sink_creates_and_inserts() {
        let sink = SqliteLogSink::new(&temp_db()).unwrap();
        insert(&sink, "ERROR", "failed to record event", Some("calendar"));
        assert_eq!(sink.count().unwrap(), 1);
    }

    #[test]
    fn query_by_level() {
        let sink = SqliteLogSink::new(&temp_db()).unwrap();
        insert(&sink, "WARN", "query degraded", None);
        insert(&sink, "ERROR", "append failed", None);

        let results = sink
            .query(&LogQuery {
                level: Some("ERROR".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "append failed");
    }

    #[test]
    fn query_by_source() {
        let sink = SqliteLogSink::new(&temp_db()).unwrap();
        insert(&sink, "ERROR", "calendar append failed", Some("calendar"));
        insert(&sink, "ERROR", "crm append failed", Some("crm"));

        let results = sink
            .query(&LogQuery {
                source: Some("crm".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "crm append failed");
    }

    #[test]
    fn query_limit_returns_newest_first() {
        let sink = SqliteLogSink::new(&temp_db()).unwrap();
        for i in 0..10 {
            insert(&sink, "WARN", &format!("msg {i}"), None);
        }

        let results = sink
            .query(&LogQuery {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].message, "msg 9");
    }

    #[test]
    fn log_record_serde_roundtrip() {
        let record = LogRecord {
            id: 1,
            timestamp: "2026-08-06T12:00:00Z".into(),
            level: "WARN".into(),
            target: "valet_graph::queries".into(),
            message: "query degraded to empty result".into(),
            fields: Some(r#"{"query":"timeline_for_person"}"#.into()),
            source: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 1);
        assert_eq!(parsed.target, "valet_graph::queries");
    }
}

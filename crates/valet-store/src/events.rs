use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, instrument};

use valet_core::event::{Event, EventEntities, NewEvent};
use valet_core::ids::EventId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Column list shared by every SELECT over the events table; the order is
/// what `row_to_event` expects.
pub const EVENT_COLUMNS: &str = "id, type, source, occurred_at, ingested_at, person_ids, \
     account_id, opportunity_id, meeting_id, thread_id, transcript_id, payload, derived_metadata";

/// The append-only write side of the log.
///
/// The public surface is insertion and point lookup; no update or delete
/// exists, by contract rather than by database permissions.
pub struct EventStore {
    db: Database,
    // ingested_at is promised monotonic per writer even across clock slew
    last_ingested: Mutex<Option<DateTime<Utc>>>,
}

impl EventStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            last_ingested: Mutex::new(None),
        }
    }

    /// Append a single event. Assigns `id` and `ingested_at`.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, source = %event.source))]
    pub fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        event.validate()?;
        let ingested_at = self.next_ingestion_stamp();

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let stored = insert_event(&tx, event, ingested_at)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Append a batch in a single transaction. All rows land or none do.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub fn append_batch(&self, events: Vec<NewEvent>) -> Result<Vec<Event>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        for event in &events {
            event.validate()?;
        }
        let ingested_at = self.next_ingestion_stamp();

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut stored = Vec::with_capacity(events.len());
            for event in events {
                stored.push(insert_event(&tx, event, ingested_at)?);
            }
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Fire-and-forget append: failures are logged here and swallowed so
    /// the observing pipeline never stalls on log availability.
    pub fn record(&self, event: NewEvent) {
        match self.append(event) {
            Ok(stored) => debug!(event_id = %stored.id, "event recorded"),
            Err(e) => error!(error = %e, "failed to record event"),
        }
    }

    /// Fire-and-forget batch append.
    pub fn record_batch(&self, events: Vec<NewEvent>) {
        let count = events.len();
        match self.append_batch(events) {
            Ok(_) => debug!(count, "event batch recorded"),
            Err(e) => error!(error = %e, count, "failed to record event batch"),
        }
    }

    /// Get a single event by ID.
    #[instrument(skip(self), fields(event_id = %event_id))]
    pub fn get(&self, event_id: &EventId) -> Result<Event, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([event_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_event(row),
                None => Err(StoreError::NotFound(format!("event {event_id}"))),
            }
        })
    }

    /// Total number of events in the log.
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn next_ingestion_stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_ingested.lock();
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

fn insert_event(
    conn: &Connection,
    event: NewEvent,
    ingested_at: DateTime<Utc>,
) -> Result<Event, StoreError> {
    let id = EventId::new();
    let person_ids_json = serde_json::to_string(&event.entities.person_ids)?;
    let metadata_json = event
        .derived_metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO events (id, type, source, occurred_at, ingested_at, person_ids, person_count, \
         account_id, opportunity_id, meeting_id, thread_id, transcript_id, payload, derived_metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            id.as_str(),
            event.event_type.to_string(),
            event.source.to_string(),
            event.occurred_at.to_rfc3339(),
            ingested_at.to_rfc3339(),
            person_ids_json,
            event.entities.person_ids.len() as i64,
            event.entities.account_id.as_deref(),
            event.entities.opportunity_id.as_deref(),
            event.entities.meeting_id.as_deref(),
            event.entities.thread_id.as_deref(),
            event.entities.transcript_id.as_deref(),
            serde_json::to_string(&event.payload)?,
            metadata_json,
        ],
    )?;

    for person_id in &event.entities.person_ids {
        conn.execute(
            "INSERT INTO event_persons (event_id, person_id) VALUES (?1, ?2)",
            rusqlite::params![id.as_str(), person_id],
        )?;
    }

    Ok(Event {
        id,
        event_type: event.event_type,
        source: event.source,
        occurred_at: event.occurred_at,
        ingested_at,
        entities: event.entities,
        payload: event.payload,
        derived_metadata: event.derived_metadata,
    })
}

/// Rehydrate an `Event` from a row selected with `EVENT_COLUMNS`.
pub fn row_to_event(row: &rusqlite::Row<'_>) -> Result<Event, StoreError> {
    let type_str: String = row_helpers::get(row, 1, "events", "type")?;
    let source_str: String = row_helpers::get(row, 2, "events", "source")?;
    let occurred_str: String = row_helpers::get(row, 3, "events", "occurred_at")?;
    let ingested_str: String = row_helpers::get(row, 4, "events", "ingested_at")?;
    let person_ids_str: String = row_helpers::get(row, 5, "events", "person_ids")?;
    let payload_str: String = row_helpers::get(row, 11, "events", "payload")?;
    let metadata_str: Option<String> = row_helpers::get_opt(row, 12, "events", "derived_metadata")?;

    Ok(Event {
        id: EventId::from_raw(row_helpers::get::<String>(row, 0, "events", "id")?),
        event_type: row_helpers::parse_enum(&type_str, "events", "type")?,
        source: row_helpers::parse_enum(&source_str, "events", "source")?,
        occurred_at: row_helpers::parse_timestamp(&occurred_str, "events", "occurred_at")?,
        ingested_at: row_helpers::parse_timestamp(&ingested_str, "events", "ingested_at")?,
        entities: EventEntities {
            person_ids: row_helpers::parse_json(&person_ids_str, "events", "person_ids")?,
            account_id: row_helpers::get_opt(row, 6, "events", "account_id")?,
            opportunity_id: row_helpers::get_opt(row, 7, "events", "opportunity_id")?,
            meeting_id: row_helpers::get_opt(row, 8, "events", "meeting_id")?,
            thread_id: row_helpers::get_opt(row, 9, "events", "thread_id")?,
            transcript_id: row_helpers::get_opt(row, 10, "events", "transcript_id")?,
        },
        payload: row_helpers::parse_json(&payload_str, "events", "payload")?,
        derived_metadata: metadata_str
            .as_deref()
            .map(|raw| row_helpers::parse_json(raw, "events", "derived_metadata"))
            .transpose()?,
    })
}

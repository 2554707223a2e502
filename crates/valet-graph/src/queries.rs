use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use tracing::{instrument, warn};

use valet_core::event::{Event, EventType};
use valet_store::error::StoreError;
use valet_store::events::{row_to_event, EVENT_COLUMNS};
use valet_store::Database;

use crate::projections::{CooccurrenceResult, EventStats, PersonInteraction, TimelineEvent};

/// Tunables for the read side.
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// How many recent multi-person events the co-occurrence scan reads.
    /// A cap, not a sampling strategy: recency bias is accepted.
    pub cooccurrence_scan_cap: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cooccurrence_scan_cap: 500,
        }
    }
}

/// Stateless read-side over the event log.
///
/// Every public method is a pure projection and degrades to an empty
/// result on any underlying failure; a brief built from many sub-queries
/// loses sections instead of failing outright.
pub struct ContextGraph {
    db: Database,
    config: GraphConfig,
}

impl ContextGraph {
    pub fn new(db: Database, config: GraphConfig) -> Self {
        Self { db, config }
    }

    /// All events referencing a person, ascending by occurrence.
    #[instrument(skip(self))]
    pub fn timeline_for_person(&self, person_id: &str, limit: u32) -> Vec<TimelineEvent> {
        degrade(
            "timeline_for_person",
            self.try_person_events(person_id, None, "ASC", Some(limit)),
        )
        .into_iter()
        .map(TimelineEvent::from_event)
        .collect()
    }

    /// Person-scoped events within a lookback window, newest first.
    #[instrument(skip(self))]
    pub fn recent_interactions(&self, person_id: &str, days_back: u32) -> Vec<PersonInteraction> {
        let since = Utc::now() - Duration::days(days_back as i64);
        degrade(
            "recent_interactions",
            self.try_person_events(person_id, Some(since), "DESC", None),
        )
        .into_iter()
        .map(|event| PersonInteraction::from_event(person_id, event))
        .collect()
    }

    pub fn events_for_meeting(&self, meeting_id: &str) -> Vec<TimelineEvent> {
        self.events_for_entity("meeting_id", meeting_id)
    }

    pub fn events_for_thread(&self, thread_id: &str) -> Vec<TimelineEvent> {
        self.events_for_entity("thread_id", thread_id)
    }

    pub fn events_for_account(&self, account_id: &str) -> Vec<TimelineEvent> {
        self.events_for_entity("account_id", account_id)
    }

    pub fn events_for_opportunity(&self, opportunity_id: &str) -> Vec<TimelineEvent> {
        self.events_for_entity("opportunity_id", opportunity_id)
    }

    pub fn events_for_transcript(&self, transcript_id: &str) -> Vec<TimelineEvent> {
        self.events_for_entity("transcript_id", transcript_id)
    }

    /// Global feed, newest first, optionally restricted to an allow-list
    /// of event types.
    #[instrument(skip(self, types))]
    pub fn activity_feed(&self, limit: u32, types: Option<&[EventType]>) -> Vec<TimelineEvent> {
        degrade("activity_feed", self.try_activity_feed(limit, types))
            .into_iter()
            .map(TimelineEvent::from_event)
            .collect()
    }

    /// Events in [local midnight, next local midnight), ascending.
    #[instrument(skip(self))]
    pub fn todays_events(&self) -> Vec<TimelineEvent> {
        let (start, end) = local_day_window();
        degrade("todays_events", self.try_events_between(start, end))
            .into_iter()
            .map(TimelineEvent::from_event)
            .collect()
    }

    /// Windowed counts grouped by type and source.
    #[instrument(skip(self))]
    pub fn event_stats(&self, days_back: u32) -> EventStats {
        degrade("event_stats", self.try_event_stats(days_back))
    }

    /// People who frequently appear together, over a bounded recent window.
    /// Unordered pairs; count desc, then recency desc.
    #[instrument(skip(self))]
    pub fn person_cooccurrences(&self, limit: usize) -> Vec<CooccurrenceResult> {
        let mut results = degrade("person_cooccurrences", self.try_cooccurrences());
        results.truncate(limit);
        results
    }

    /// Transcript events within a lookback window, newest first.
    #[instrument(skip(self))]
    pub fn recent_transcripts(&self, days_back: u32, limit: u32) -> Vec<TimelineEvent> {
        let since = Utc::now() - Duration::days(days_back as i64);
        degrade(
            "recent_transcripts",
            self.try_typed_events(EventType::TranscriptObserved, Some(since), "DESC", Some(limit)),
        )
        .into_iter()
        .map(TimelineEvent::from_event)
        .collect()
    }

    /// Transcripts linked to a specific meeting, ascending.
    #[instrument(skip(self))]
    pub fn transcripts_for_meeting(&self, meeting_id: &str) -> Vec<TimelineEvent> {
        self.events_for_entity("meeting_id", meeting_id)
            .into_iter()
            .filter(|e| e.event_type == EventType::TranscriptObserved)
            .collect()
    }

    /// Transcripts involving a person, newest first.
    #[instrument(skip(self))]
    pub fn transcripts_for_person(&self, person_id: &str, limit: u32) -> Vec<TimelineEvent> {
        let mut transcripts: Vec<TimelineEvent> = degrade(
            "transcripts_for_person",
            self.try_person_events(person_id, None, "DESC", None),
        )
        .into_iter()
        .filter(|e| e.event_type == EventType::TranscriptObserved)
        .map(TimelineEvent::from_event)
        .collect();
        transcripts.truncate(limit as usize);
        transcripts
    }

    /// Calendar observations inside a window, newest first. Feeds the
    /// entity linker's candidate set.
    #[instrument(skip(self))]
    pub fn calendar_events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Vec<TimelineEvent> {
        degrade(
            "calendar_events_between",
            self.try_calendar_between(start, end, limit),
        )
        .into_iter()
        .map(TimelineEvent::from_event)
        .collect()
    }

    /// Events carrying an opportunity reference, newest first. Feeds the
    /// opportunity linker.
    #[instrument(skip(self))]
    pub fn events_with_opportunity(&self, limit: u32) -> Vec<TimelineEvent> {
        degrade("events_with_opportunity", self.try_with_opportunity(limit))
            .into_iter()
            .map(TimelineEvent::from_event)
            .collect()
    }

    // --- internal fallible queries ---

    fn events_for_entity(&self, column: &'static str, id: &str) -> Vec<TimelineEvent> {
        degrade(column, self.try_entity_events(column, id))
            .into_iter()
            .map(TimelineEvent::from_event)
            .collect()
    }

    fn try_person_events(
        &self,
        person_id: &str,
        since: Option<DateTime<Utc>>,
        order: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events \
                 WHERE id IN (SELECT event_id FROM event_persons WHERE person_id = ?1)"
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(person_id.to_string())];

            if let Some(since) = since {
                params.push(Box::new(since.to_rfc3339()));
                sql.push_str(&format!(" AND occurred_at >= ?{}", params.len()));
            }
            sql.push_str(&format!(" ORDER BY occurred_at {order}"));
            if let Some(limit) = limit {
                params.push(Box::new(limit));
                sql.push_str(&format!(" LIMIT ?{}", params.len()));
            }

            collect_events(conn, &sql, &params)
        })
    }

    fn try_entity_events(&self, column: &'static str, id: &str) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE {column} = ?1 ORDER BY occurred_at ASC"
            );
            let params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(id.to_string())];
            collect_events(conn, &sql, &params)
        })
    }

    fn try_typed_events(
        &self,
        event_type: EventType,
        since: Option<DateTime<Utc>>,
        order: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE type = ?1");
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(event_type.to_string())];

            if let Some(since) = since {
                params.push(Box::new(since.to_rfc3339()));
                sql.push_str(&format!(" AND occurred_at >= ?{}", params.len()));
            }
            sql.push_str(&format!(" ORDER BY occurred_at {order}"));
            if let Some(limit) = limit {
                params.push(Box::new(limit));
                sql.push_str(&format!(" LIMIT ?{}", params.len()));
            }

            collect_events(conn, &sql, &params)
        })
    }

    fn try_activity_feed(
        &self,
        limit: u32,
        types: Option<&[EventType]>,
    ) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events");
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(types) = types.filter(|t| !t.is_empty()) {
                let placeholders: Vec<String> = types
                    .iter()
                    .map(|t| {
                        params.push(Box::new(t.to_string()));
                        format!("?{}", params.len())
                    })
                    .collect();
                sql.push_str(&format!(" WHERE type IN ({})", placeholders.join(", ")));
            }

            params.push(Box::new(limit));
            sql.push_str(&format!(" ORDER BY occurred_at DESC LIMIT ?{}", params.len()));

            collect_events(conn, &sql, &params)
        })
    }

    fn try_events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events \
                 WHERE occurred_at >= ?1 AND occurred_at < ?2 ORDER BY occurred_at ASC"
            );
            let params: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(start.to_rfc3339()), Box::new(end.to_rfc3339())];
            collect_events(conn, &sql, &params)
        })
    }

    fn try_calendar_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events \
                 WHERE type = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3 \
                 ORDER BY occurred_at DESC LIMIT ?4"
            );
            let params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
                Box::new(EventType::CalendarObserved.to_string()),
                Box::new(start.to_rfc3339()),
                Box::new(end.to_rfc3339()),
                Box::new(limit),
            ];
            collect_events(conn, &sql, &params)
        })
    }

    fn try_with_opportunity(&self, limit: u32) -> Result<Vec<Event>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events \
                 WHERE opportunity_id IS NOT NULL ORDER BY occurred_at DESC LIMIT ?1"
            );
            let params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(limit)];
            collect_events(conn, &sql, &params)
        })
    }

    fn try_event_stats(&self, days_back: u32) -> Result<EventStats, StoreError> {
        let since = Utc::now() - Duration::days(days_back as i64);
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT type, source FROM events WHERE occurred_at >= ?1")?;
            let mut rows = stmt.query([since.to_rfc3339()])?;

            let mut stats = EventStats::default();
            while let Some(row) = rows.next()? {
                let event_type: String = row.get(0)?;
                let source: String = row.get(1)?;
                stats.total += 1;
                *stats.by_type.entry(event_type).or_insert(0) += 1;
                *stats.by_source.entry(source).or_insert(0) += 1;
            }
            Ok(stats)
        })
    }

    fn try_cooccurrences(&self) -> Result<Vec<CooccurrenceResult>, StoreError> {
        struct PairAgg {
            count: u64,
            types: BTreeSet<EventType>,
            most_recent: DateTime<Utc>,
        }

        let rows: Vec<(String, String, String)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT person_ids, type, occurred_at FROM events \
                 WHERE person_count >= 2 ORDER BY occurred_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([self.config.cooccurrence_scan_cap], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;

        let mut pairs: BTreeMap<(String, String), PairAgg> = BTreeMap::new();
        for (person_ids_json, type_str, occurred_str) in rows {
            let persons: BTreeSet<String> =
                valet_store::row_helpers::parse_json(&person_ids_json, "events", "person_ids")?;
            let event_type: EventType =
                valet_store::row_helpers::parse_enum(&type_str, "events", "type")?;
            let occurred_at =
                valet_store::row_helpers::parse_timestamp(&occurred_str, "events", "occurred_at")?;

            let persons: Vec<&String> = persons.iter().collect();
            for i in 0..persons.len() {
                for j in (i + 1)..persons.len() {
                    // BTreeSet iteration is sorted, so (a, b) is canonical
                    let key = (persons[i].clone(), persons[j].clone());
                    let agg = pairs.entry(key).or_insert(PairAgg {
                        count: 0,
                        types: BTreeSet::new(),
                        most_recent: occurred_at,
                    });
                    agg.count += 1;
                    agg.types.insert(event_type);
                    if occurred_at > agg.most_recent {
                        agg.most_recent = occurred_at;
                    }
                }
            }
        }

        let mut results: Vec<CooccurrenceResult> = pairs
            .into_iter()
            .map(|((person_a, person_b), agg)| CooccurrenceResult {
                person_a,
                person_b,
                shared_events: agg.count,
                event_types: agg.types.into_iter().collect(),
                most_recent: agg.most_recent,
            })
            .collect();

        results.sort_by(|a, b| {
            b.shared_events
                .cmp(&a.shared_events)
                .then(b.most_recent.cmp(&a.most_recent))
        });
        Ok(results)
    }
}

/// Read failures never propagate out of the query layer: warn and return
/// the empty projection so composite reports degrade instead of failing.
fn degrade<T: Default>(query: &'static str, result: Result<T, StoreError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(query, error = %e, "query degraded to empty result");
            T::default()
        }
    }
}

fn collect_events(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Box<dyn rusqlite::types::ToSql>],
) -> Result<Vec<Event>, StoreError> {
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(param_refs.as_slice())?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(row_to_event(row)?);
    }
    Ok(events)
}

/// [local midnight, next local midnight) expressed in UTC.
fn local_day_window() -> (DateTime<Utc>, DateTime<Utc>) {
    let today = Local::now().date_naive();
    let start = today
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let end = (today + Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    (start, end)
}

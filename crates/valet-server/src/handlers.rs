//! HTTP handlers: inbound event submission and outbound query results.
//!
//! Submission is fire-and-forget at the HTTP level too: a failed append is
//! reported in the response body with a 202, never as a 5xx that could
//! fail an observation pipeline. Read handlers lean on the query layer's
//! degrade-to-empty behavior and always produce a 200 (or an explicit 404
//! for "nothing to brief").

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use valet_core::event::{EventType, NewEvent};
use valet_graph::EntityLinker;
use valet_insights::{insights_for_meeting, insights_for_transcript, pre_meeting_brief};

use crate::server::AppState;

type Reply = (StatusCode, Json<Value>);

fn ok(value: Value) -> Reply {
    (StatusCode::OK, Json(value))
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub async fn health() -> Reply {
    ok(json!({ "status": "ok" }))
}

pub async fn submit_event(State(state): State<AppState>, Json(event): Json<NewEvent>) -> Reply {
    match state.store.append(event) {
        Ok(stored) => (
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "id": stored.id })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "event submission failed");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "accepted": false, "error": e.to_string() })),
            )
        }
    }
}

pub async fn submit_batch(
    State(state): State<AppState>,
    Json(events): Json<Vec<NewEvent>>,
) -> Reply {
    let count = events.len();
    match state.store.append_batch(events) {
        Ok(stored) => (
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "count": stored.len() })),
        ),
        Err(e) => {
            tracing::error!(error = %e, count, "event batch submission failed");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "accepted": false, "error": e.to_string() })),
            )
        }
    }
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
    /// Comma-separated event type allow-list; unknown names are ignored.
    pub types: Option<String>,
}

pub async fn activity(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Reply {
    let types: Option<Vec<EventType>> = q.types.map(|raw| {
        raw.split(',')
            .filter_map(|t| t.trim().parse().ok())
            .collect()
    });
    let feed = state
        .graph
        .activity_feed(q.limit.unwrap_or(50), types.as_deref());
    ok(to_value(&feed))
}

pub async fn today(State(state): State<AppState>) -> Reply {
    ok(to_value(&state.graph.todays_events()))
}

#[derive(Deserialize)]
pub struct WindowQuery {
    pub days_back: Option<u32>,
}

pub async fn stats(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Reply {
    ok(to_value(&state.graph.event_stats(q.days_back.unwrap_or(7))))
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

pub async fn cooccurrences(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Reply {
    let pairs = state
        .graph
        .person_cooccurrences(q.limit.unwrap_or(50) as usize);
    ok(to_value(&pairs))
}

pub async fn timeline(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Reply {
    let events = state
        .graph
        .timeline_for_person(&person_id, q.limit.unwrap_or(100));
    ok(to_value(&events))
}

pub async fn interactions(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Reply {
    let interactions = state
        .graph
        .recent_interactions(&person_id, q.days_back.unwrap_or(30));
    ok(to_value(&interactions))
}

pub async fn meeting_brief(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Reply {
    let mut config = state.brief_config.clone();
    if let Some(days_back) = q.days_back {
        config.lookback_days = days_back;
    }
    match pre_meeting_brief(&state.graph, &meeting_id, &config) {
        Some(brief) => ok(to_value(&brief)),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no calendar event for meeting {meeting_id}") })),
        ),
    }
}

pub async fn meeting_insights(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Reply {
    let linker = EntityLinker::new(&state.graph, state.linker_config.clone());
    match insights_for_meeting(
        &state.graph,
        &linker,
        &state.extractor,
        &meeting_id,
        &state.brief_config,
    ) {
        Some(insights) => ok(to_value(&insights)),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no transcript for meeting {meeting_id}") })),
        ),
    }
}

pub async fn transcript_insights(
    State(state): State<AppState>,
    Path(transcript_id): Path<String>,
) -> Reply {
    let linker = EntityLinker::new(&state.graph, state.linker_config.clone());
    match insights_for_transcript(
        &state.graph,
        &linker,
        &state.extractor,
        &transcript_id,
        &state.brief_config,
    ) {
        Some(insights) => ok(to_value(&insights)),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no transcript event {transcript_id}") })),
        ),
    }
}

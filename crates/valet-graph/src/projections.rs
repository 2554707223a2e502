use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use valet_core::event::{Event, EventEntities, EventType, SourceSystem};
use valet_core::ids::EventId;
use valet_core::payload::EventPayload;

/// An event as it appears in a timeline view, with a derived one-line
/// summary. Computed at read time, never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: SourceSystem,
    pub occurred_at: DateTime<Utc>,
    pub summary: String,
    pub entities: EventEntities,
    pub payload: EventPayload,
}

impl TimelineEvent {
    pub fn from_event(event: Event) -> Self {
        let summary = summarize(&event);
        Self {
            id: event.id,
            event_type: event.event_type,
            source: event.source,
            occurred_at: event.occurred_at,
            summary,
            entities: event.entities,
            payload: event.payload,
        }
    }
}

/// One-line human summary of an event, derived from its payload.
fn summarize(event: &Event) -> String {
    match &event.payload {
        EventPayload::Calendar { title, .. } => format!("Meeting: {title}"),
        EventPayload::EmailThread { subject, from, .. } => {
            format!("Email: {subject} from {from}")
        }
        EventPayload::EmailSent { subject, .. } => format!("Sent email: {subject}"),
        EventPayload::Task { title, .. } => format!("Task created: {title}"),
        EventPayload::FollowUp { contact_name, .. } => format!("Follow-up: {contact_name}"),
        EventPayload::Reminder { .. } => {
            let kind = event
                .derived_metadata
                .as_ref()
                .and_then(|m| m.reminder_kind.as_deref())
                .unwrap_or("unknown");
            format!("Reminder fired ({kind})")
        }
        EventPayload::Transcript { title, .. } => format!("Transcript: {title}"),
    }
}

/// Entity keys carried alongside a person-scoped interaction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelatedEntityRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
}

/// A timeline event scoped to one person: "what has happened involving X".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersonInteraction {
    pub person_id: String,
    pub event_id: EventId,
    pub event_type: EventType,
    pub source: SourceSystem,
    pub occurred_at: DateTime<Utc>,
    pub context: String,
    pub related: RelatedEntityRefs,
}

impl PersonInteraction {
    pub fn from_event(person_id: &str, event: Event) -> Self {
        let context = summarize(&event);
        Self {
            person_id: person_id.to_string(),
            event_id: event.id,
            event_type: event.event_type,
            source: event.source,
            occurred_at: event.occurred_at,
            context,
            related: RelatedEntityRefs {
                meeting_id: event.entities.meeting_id,
                thread_id: event.entities.thread_id,
                account_id: event.entities.account_id,
                transcript_id: event.entities.transcript_id,
            },
        }
    }
}

/// An unordered pair of people and how often they appear together.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CooccurrenceResult {
    pub person_a: String,
    pub person_b: String,
    pub shared_events: u64,
    pub event_types: Vec<EventType>,
    pub most_recent: DateTime<Utc>,
}

/// Windowed event counts, grouped by type and by source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventStats {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_core::payload::DerivedMetadata;

    fn event_with(payload: EventPayload, event_type: EventType) -> Event {
        Event {
            id: EventId::new(),
            event_type,
            source: SourceSystem::Internal,
            occurred_at: Utc::now(),
            ingested_at: Utc::now(),
            entities: EventEntities::default(),
            payload,
            derived_metadata: None,
        }
    }

    #[test]
    fn calendar_summary_names_the_meeting() {
        let event = event_with(
            EventPayload::Calendar {
                title: "Renewal sync".into(),
                start_time: None,
                end_time: None,
                location: None,
                description: None,
                attendees: vec![],
            },
            EventType::CalendarObserved,
        );
        assert_eq!(summarize(&event), "Meeting: Renewal sync");
    }

    #[test]
    fn reminder_summary_uses_writer_metadata() {
        let mut event = event_with(
            EventPayload::Reminder { note: "call ben".into() },
            EventType::ReminderFired,
        );
        assert_eq!(summarize(&event), "Reminder fired (unknown)");

        event.derived_metadata = Some(DerivedMetadata {
            reminder_kind: Some("follow_up".into()),
            ..Default::default()
        });
        assert_eq!(summarize(&event), "Reminder fired (follow_up)");
    }

    #[test]
    fn person_interaction_carries_related_keys() {
        let mut event = event_with(
            EventPayload::EmailThread {
                subject: "MSA redlines".into(),
                from: "ana@example.com".into(),
                snippet: None,
            },
            EventType::EmailThreadObserved,
        );
        event.entities.thread_id = Some("thr-1".into());

        let interaction = PersonInteraction::from_event("ana@example.com", event);
        assert_eq!(interaction.person_id, "ana@example.com");
        assert_eq!(interaction.related.thread_id.as_deref(), Some("thr-1"));
        assert_eq!(interaction.context, "Email: MSA redlines from ana@example.com");
    }
}

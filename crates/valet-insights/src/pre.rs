use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, instrument};

use valet_core::event::EventType;
use valet_core::payload::EventPayload;
use valet_graph::projections::TimelineEvent;
use valet_graph::ContextGraph;

use crate::types::{
    AttendeeContext, BriefConfig, MeetingInfo, PreMeetingBrief, RelatedFollowUp, RelatedThread,
};

/// Build the pre-meeting brief for a meeting id.
///
/// Returns `None` when the log holds no calendar observation for the id:
/// an explicit "nothing to brief" outcome, not an error. Sub-queries that
/// fail degrade to empty sections.
#[instrument(skip(graph, config))]
pub fn pre_meeting_brief(
    graph: &ContextGraph,
    meeting_id: &str,
    config: &BriefConfig,
) -> Option<PreMeetingBrief> {
    let mut data_sources = vec!["events_for_meeting".to_string()];

    let meeting_events = graph.events_for_meeting(meeting_id);
    let Some(calendar) = meeting_events
        .iter()
        .find(|e| e.event_type == EventType::CalendarObserved)
    else {
        debug!(meeting_id, "no calendar event found, nothing to brief");
        return None;
    };

    let meeting = meeting_info(calendar);
    let attendee_emails = attendee_emails(calendar);

    let mut attendees = Vec::new();
    let mut pool: Vec<TimelineEvent> = Vec::new();
    for email in &attendee_emails {
        let interactions = graph.recent_interactions(email, config.lookback_days);
        data_sources.push(format!("recent_interactions({email})"));
        attendees.push(AttendeeContext {
            email: email.clone(),
            interaction_count: interactions.len(),
            last_interaction: interactions.first().map(|i| i.occurred_at),
            recent_interactions: interactions
                .into_iter()
                .take(config.attendee_recent_cap)
                .collect(),
        });

        pool.extend(graph.timeline_for_person(email, config.timeline_limit));
        data_sources.push(format!("timeline_for_person({email})"));
    }

    let unique = dedupe_by_id(pool);
    let mut recent_interactions = unique.clone();
    recent_interactions.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    recent_interactions.truncate(config.recent_cap);

    let open_follow_ups = follow_ups_in(&unique);
    let related_threads = threads_in(&unique);

    Some(PreMeetingBrief {
        meeting,
        attendees,
        recent_interactions,
        open_follow_ups,
        related_threads,
        generated_at: Utc::now(),
        data_sources: dedupe_strings(data_sources),
    })
}

/// Brief the most recently observed meeting on an attendee's timeline.
/// Useful when the caller knows a person but not a meeting id.
#[instrument(skip(graph, config))]
pub fn upcoming_meeting_brief(
    graph: &ContextGraph,
    attendee_email: &str,
    config: &BriefConfig,
) -> Option<PreMeetingBrief> {
    let timeline = graph.timeline_for_person(attendee_email, 50);
    let Some(meeting_event) = timeline
        .iter()
        .filter(|e| e.event_type == EventType::CalendarObserved)
        .max_by_key(|e| e.occurred_at)
    else {
        debug!(attendee_email, "no meetings on this person's timeline");
        return None;
    };

    let meeting_id = meeting_event
        .entities
        .meeting_id
        .clone()
        .unwrap_or_else(|| meeting_event.id.as_str().to_string());
    pre_meeting_brief(graph, &meeting_id, config)
}

pub(crate) fn meeting_info(event: &TimelineEvent) -> MeetingInfo {
    let meeting_id = event
        .entities
        .meeting_id
        .clone()
        .unwrap_or_else(|| event.id.as_str().to_string());

    match &event.payload {
        EventPayload::Calendar {
            title,
            start_time,
            end_time,
            location,
            description,
            ..
        } => MeetingInfo {
            meeting_id,
            title: title.clone(),
            start_time: start_time.unwrap_or(event.occurred_at),
            end_time: *end_time,
            location: location.clone(),
            description: description.clone(),
        },
        _ => MeetingInfo {
            meeting_id,
            title: "Untitled meeting".into(),
            start_time: event.occurred_at,
            end_time: None,
            location: None,
            description: None,
        },
    }
}

/// Attendees from entity references, falling back to the payload list.
pub(crate) fn attendee_emails(event: &TimelineEvent) -> Vec<String> {
    if !event.entities.person_ids.is_empty() {
        return event.entities.person_ids.clone();
    }
    match &event.payload {
        EventPayload::Calendar { attendees, .. } | EventPayload::Transcript { attendees, .. } => {
            attendees.clone()
        }
        _ => Vec::new(),
    }
}

/// Drop duplicate events by id, keeping first occurrence.
pub(crate) fn dedupe_by_id(events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    let mut seen = std::collections::HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

pub(crate) fn follow_ups_in(events: &[TimelineEvent]) -> Vec<RelatedFollowUp> {
    events
        .iter()
        .filter_map(|event| match &event.payload {
            EventPayload::FollowUp {
                contact_name,
                contact_email,
                context,
                urgency,
            } => Some(RelatedFollowUp {
                event_id: event.id.clone(),
                contact_name: contact_name.clone(),
                contact_email: contact_email
                    .clone()
                    .or_else(|| event.entities.person_ids.first().cloned()),
                context: context.clone(),
                urgency: urgency.clone(),
                created_at: event.occurred_at,
            }),
            _ => None,
        })
        .collect()
}

/// One entry per thread, keeping the most recent activity, newest first.
pub(crate) fn threads_in(events: &[TimelineEvent]) -> Vec<RelatedThread> {
    let mut by_thread: BTreeMap<String, RelatedThread> = BTreeMap::new();

    for event in events {
        let EventPayload::EmailThread { subject, from, snippet } = &event.payload else {
            continue;
        };
        let Some(thread_id) = event.entities.thread_id.clone() else {
            continue;
        };

        let newer = by_thread
            .get(&thread_id)
            .map_or(true, |existing| event.occurred_at > existing.last_activity);
        if newer {
            by_thread.insert(
                thread_id.clone(),
                RelatedThread {
                    thread_id,
                    subject: subject.clone(),
                    from: from.clone(),
                    last_activity: event.occurred_at,
                    snippet: snippet.clone(),
                },
            );
        }
    }

    let mut threads: Vec<RelatedThread> = by_thread.into_values().collect();
    threads.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    threads
}

fn dedupe_strings(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

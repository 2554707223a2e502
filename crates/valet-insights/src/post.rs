use chrono::Utc;
use tracing::{debug, instrument};

use valet_core::event::EventType;
use valet_core::payload::EventPayload;
use valet_graph::projections::TimelineEvent;
use valet_graph::{ContextGraph, EntityLinker, OpportunityMatch};

use crate::extract::ActionExtractor;
use crate::pre::{dedupe_by_id, follow_ups_in, threads_in};
use crate::types::{BriefConfig, ExtractionStats, PostMeetingInsights, SurfacedContext};

/// Turn a transcript event into post-meeting insights: deterministic
/// action extraction plus context correlated from the rest of the log.
#[instrument(skip(graph, linker, extractor, event, config), fields(event_id = %event.id))]
pub fn post_meeting_insights(
    graph: &ContextGraph,
    linker: &EntityLinker<'_>,
    extractor: &ActionExtractor,
    event: &TimelineEvent,
    config: &BriefConfig,
) -> PostMeetingInsights {
    let (meeting_title, content, action_items, payload_attendees) = match &event.payload {
        EventPayload::Transcript {
            title,
            content,
            action_items,
            attendees,
        } => (
            title.clone(),
            content.clone(),
            action_items.clone(),
            attendees.clone(),
        ),
        _ => ("Untitled meeting".to_string(), String::new(), Vec::new(), Vec::new()),
    };

    let transcript_id = event
        .entities
        .transcript_id
        .clone()
        .unwrap_or_else(|| event.id.as_str().to_string());
    let meeting_id = event.entities.meeting_id.clone();
    let attendees = if payload_attendees.is_empty() {
        event.entities.person_ids.clone()
    } else {
        payload_attendees
    };

    let extracted_actions = extractor.extract(&content, &action_items, &attendees);
    let extraction_stats = ExtractionStats::from_actions(&extracted_actions);

    // Prefer entities the linker already resolved at ingest; re-derive from
    // attendees only when the transcript arrived unlinked.
    let related_opportunity = match &event.entities.opportunity_id {
        Some(opportunity_id) => Some(OpportunityMatch {
            opportunity_id: opportunity_id.clone(),
            account_id: event.entities.account_id.clone(),
        }),
        None => linker.find_linked_opportunity(&attendees),
    };

    let mut pool: Vec<TimelineEvent> = Vec::new();
    for email in attendees.iter().take(config.attendee_cap) {
        pool.extend(graph.timeline_for_person(email, config.timeline_limit));
    }
    if let Some(meeting_id) = &meeting_id {
        pool.extend(graph.events_for_meeting(meeting_id));
    }
    let unique = dedupe_by_id(pool);

    let related_follow_ups = follow_ups_in(&unique);
    let mut related_threads = threads_in(&unique);
    related_threads.truncate(config.thread_cap);

    PostMeetingInsights {
        meeting_id,
        transcript_id,
        meeting_title,
        meeting_date: event.occurred_at,
        attendees,
        extracted_actions,
        surfaced_context: SurfacedContext {
            related_opportunity,
            related_follow_ups,
            related_threads,
        },
        generated_at: Utc::now(),
        extraction_stats,
    }
}

/// Insights for a transcript id; `None` when no transcript event exists.
#[instrument(skip(graph, linker, extractor, config))]
pub fn insights_for_transcript(
    graph: &ContextGraph,
    linker: &EntityLinker<'_>,
    extractor: &ActionExtractor,
    transcript_id: &str,
    config: &BriefConfig,
) -> Option<PostMeetingInsights> {
    let events = graph.events_for_transcript(transcript_id);
    let Some(event) = events
        .into_iter()
        .find(|e| e.event_type == EventType::TranscriptObserved)
    else {
        debug!(transcript_id, "no transcript event found");
        return None;
    };
    Some(post_meeting_insights(graph, linker, extractor, &event, config))
}

/// Insights for a meeting id, via its linked transcript; `None` when the
/// meeting has no transcript in the log.
#[instrument(skip(graph, linker, extractor, config))]
pub fn insights_for_meeting(
    graph: &ContextGraph,
    linker: &EntityLinker<'_>,
    extractor: &ActionExtractor,
    meeting_id: &str,
    config: &BriefConfig,
) -> Option<PostMeetingInsights> {
    let events = graph.events_for_meeting(meeting_id);
    let Some(event) = events
        .into_iter()
        .find(|e| e.event_type == EventType::TranscriptObserved)
    else {
        debug!(meeting_id, "no transcript linked to meeting");
        return None;
    };
    Some(post_meeting_insights(graph, linker, extractor, &event, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MatchKind;
    use chrono::Duration;
    use valet_core::event::{EventEntities, NewEvent, SourceSystem};
    use valet_graph::{GraphConfig, LinkerConfig};
    use valet_store::{Database, EventStore};

    fn fixture() -> (EventStore, ContextGraph) {
        let db = Database::in_memory().unwrap();
        (
            EventStore::new(db.clone()),
            ContextGraph::new(db, GraphConfig::default()),
        )
    }

    fn transcript(transcript_id: &str, meeting_id: Option<&str>, content: &str) -> NewEvent {
        NewEvent {
            event_type: EventType::TranscriptObserved,
            source: SourceSystem::Transcription,
            occurred_at: Utc::now(),
            entities: EventEntities {
                person_ids: vec!["jane@acme.com".into()],
                transcript_id: Some(transcript_id.to_string()),
                meeting_id: meeting_id.map(|m| m.to_string()),
                ..Default::default()
            },
            payload: EventPayload::Transcript {
                title: "Acme renewal call".into(),
                content: content.to_string(),
                action_items: vec![],
                attendees: vec!["jane@acme.com".into()],
            },
            derived_metadata: None,
        }
    }

    fn crm_event(opportunity: &str, persons: &[&str]) -> NewEvent {
        NewEvent {
            event_type: EventType::EmailThreadObserved,
            source: SourceSystem::Crm,
            occurred_at: Utc::now() - Duration::days(1),
            entities: EventEntities {
                person_ids: persons.iter().map(|p| p.to_string()).collect(),
                opportunity_id: Some(opportunity.to_string()),
                account_id: Some("acct-1".into()),
                thread_id: Some("crm-thr".into()),
                ..Default::default()
            },
            payload: EventPayload::EmailThread {
                subject: "pipeline update".into(),
                from: "crm@acme.com".into(),
                snippet: None,
            },
            derived_metadata: None,
        }
    }

    #[test]
    fn insights_extract_actions_and_stats() {
        let (store, graph) = fixture();
        store
            .append(transcript(
                "tr-1",
                None,
                "I'll send the MSA by Friday. Action items: review pricing with legal.",
            ))
            .unwrap();

        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        let insights = insights_for_transcript(
            &graph,
            &linker,
            &ActionExtractor::new(),
            "tr-1",
            &BriefConfig::default(),
        )
        .unwrap();

        assert_eq!(insights.transcript_id, "tr-1");
        assert_eq!(insights.meeting_title, "Acme renewal call");
        assert_eq!(insights.extraction_stats.total_actions, 2);
        assert_eq!(insights.extraction_stats.commitments, 1);
        assert_eq!(insights.extraction_stats.action_items, 1);
        let commitment = insights
            .extracted_actions
            .iter()
            .find(|a| a.match_kind == MatchKind::Commitment)
            .unwrap();
        assert_eq!(commitment.mentioned_time.as_deref(), Some("Friday"));
    }

    #[test]
    fn opportunity_rederived_from_attendees_when_unlinked() {
        let (store, graph) = fixture();
        store.append(crm_event("opp-7", &["jane@acme.com"])).unwrap();
        store.append(transcript("tr-1", None, "quick call, no actions")).unwrap();

        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        let insights = insights_for_transcript(
            &graph,
            &linker,
            &ActionExtractor::new(),
            "tr-1",
            &BriefConfig::default(),
        )
        .unwrap();

        let opp = insights.surfaced_context.related_opportunity.unwrap();
        assert_eq!(opp.opportunity_id, "opp-7");
        assert_eq!(opp.account_id.as_deref(), Some("acct-1"));
        // The CRM thread surfaces as related context too
        assert_eq!(insights.surfaced_context.related_threads.len(), 1);
    }

    #[test]
    fn already_linked_opportunity_wins_over_rederivation() {
        let (store, graph) = fixture();
        store.append(crm_event("opp-other", &["jane@acme.com"])).unwrap();
        let mut event = transcript("tr-1", None, "short call");
        event.entities.opportunity_id = Some("opp-linked".into());
        store.append(event).unwrap();

        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        let insights = insights_for_transcript(
            &graph,
            &linker,
            &ActionExtractor::new(),
            "tr-1",
            &BriefConfig::default(),
        )
        .unwrap();

        assert_eq!(
            insights.surfaced_context.related_opportunity.unwrap().opportunity_id,
            "opp-linked"
        );
    }

    #[test]
    fn missing_transcript_yields_none() {
        let (_store, graph) = fixture();
        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        assert!(insights_for_transcript(
            &graph,
            &linker,
            &ActionExtractor::new(),
            "tr-404",
            &BriefConfig::default()
        )
        .is_none());
        assert!(insights_for_meeting(
            &graph,
            &linker,
            &ActionExtractor::new(),
            "m-404",
            &BriefConfig::default()
        )
        .is_none());
    }

    #[test]
    fn meeting_lookup_finds_linked_transcript() {
        let (store, graph) = fixture();
        store
            .append(transcript("tr-1", Some("m-1"), "let me recheck the numbers"))
            .unwrap();

        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        let insights = insights_for_meeting(
            &graph,
            &linker,
            &ActionExtractor::new(),
            "m-1",
            &BriefConfig::default(),
        )
        .unwrap();
        assert_eq!(insights.meeting_id.as_deref(), Some("m-1"));
        assert_eq!(insights.transcript_id, "tr-1");
    }
}

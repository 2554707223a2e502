use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use valet_core::payload::EventPayload;

use crate::projections::TimelineEvent;
use crate::queries::ContextGraph;

/// Thresholds for the linking heuristics.
#[derive(Clone, Debug)]
pub struct LinkerConfig {
    /// Candidate window around a timestamp hint.
    pub hint_window_hours: i64,
    /// Candidate window when no hint is given.
    pub lookback_days: i64,
    /// Maximum calendar candidates fetched per attempt.
    pub candidate_limit: u32,
    /// Token-set overlap above which two titles are considered the same.
    pub jaccard_threshold: f64,
    /// Temporal fallback acceptance bound.
    pub temporal_fallback_mins: i64,
    /// Maximum opportunity-bearing events scanned.
    pub opportunity_scan_limit: u32,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            hint_window_hours: 24,
            lookback_days: 7,
            candidate_limit: 50,
            jaccard_threshold: 0.5,
            temporal_fallback_mins: 120,
            opportunity_scan_limit: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Title,
    Attendees,
    Temporal,
}

/// A calendar event the linker considers the same meeting as a transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingMatch {
    pub meeting_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub matched_on: MatchReason,
}

/// An opportunity reachable through an attendee overlap.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpportunityMatch {
    pub opportunity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Heuristic association of a newly observed transcript with prior
/// observations. Read-only; `None` means "unlinked", never an error.
pub struct EntityLinker<'a> {
    graph: &'a ContextGraph,
    config: LinkerConfig,
}

impl<'a> EntityLinker<'a> {
    pub fn new(graph: &'a ContextGraph, config: LinkerConfig) -> Self {
        Self { graph, config }
    }

    /// Find the calendar event this transcript most plausibly belongs to.
    ///
    /// Priority order, first confident match wins: normalized title
    /// (equality, containment, or token overlap), then attendee overlap,
    /// then closest-in-time within the fallback bound. Candidates are
    /// scanned newest first; ties go to the first candidate seen.
    #[instrument(skip(self, attendees))]
    pub fn find_linked_meeting(
        &self,
        title: Option<&str>,
        occurred_at: Option<DateTime<Utc>>,
        attendees: &[String],
    ) -> Option<MeetingMatch> {
        let (start, end) = match occurred_at {
            Some(hint) => (
                hint - Duration::hours(self.config.hint_window_hours),
                hint + Duration::hours(self.config.hint_window_hours),
            ),
            None => {
                let now = Utc::now();
                (now - Duration::days(self.config.lookback_days), now)
            }
        };

        let candidates = self
            .graph
            .calendar_events_between(start, end, self.config.candidate_limit);
        if candidates.is_empty() {
            return None;
        }

        if let Some(title) = title {
            let wanted = normalize_title(title);
            if !wanted.is_empty() {
                for candidate in &candidates {
                    let candidate_title = normalize_title(candidate_title(candidate));
                    if !candidate_title.is_empty()
                        && self.titles_match(&wanted, &candidate_title)
                    {
                        debug!(meeting = %candidate.id, "linked by title");
                        return Some(to_match(candidate, MatchReason::Title));
                    }
                }
            }
        }

        if !attendees.is_empty() {
            let wanted: BTreeSet<String> =
                attendees.iter().map(|a| normalize_email(a)).collect();
            for candidate in &candidates {
                let overlap = candidate
                    .entities
                    .person_ids
                    .iter()
                    .any(|p| wanted.contains(&normalize_email(p)));
                if overlap {
                    debug!(meeting = %candidate.id, "linked by attendees");
                    return Some(to_match(candidate, MatchReason::Attendees));
                }
            }
        }

        if let Some(hint) = occurred_at {
            let closest = candidates.iter().min_by_key(|c| {
                (c.occurred_at - hint).num_seconds().abs()
            })?;
            let delta_mins = (closest.occurred_at - hint).num_minutes().abs();
            if delta_mins < self.config.temporal_fallback_mins {
                debug!(meeting = %closest.id, delta_mins, "linked by temporal fallback");
                return Some(to_match(closest, MatchReason::Temporal));
            }
        }

        None
    }

    /// Find an opportunity whose recorded people intersect the attendee
    /// set. First overlap in recency order wins; no title heuristic.
    #[instrument(skip(self, attendees))]
    pub fn find_linked_opportunity(&self, attendees: &[String]) -> Option<OpportunityMatch> {
        if attendees.is_empty() {
            return None;
        }

        let wanted: BTreeSet<String> = attendees.iter().map(|a| normalize_email(a)).collect();
        let candidates = self
            .graph
            .events_with_opportunity(self.config.opportunity_scan_limit);

        for candidate in &candidates {
            let overlap = candidate
                .entities
                .person_ids
                .iter()
                .any(|p| wanted.contains(&normalize_email(p)));
            if overlap {
                if let Some(opportunity_id) = candidate.entities.opportunity_id.clone() {
                    debug!(opportunity = %opportunity_id, "linked by attendee email");
                    return Some(OpportunityMatch {
                        opportunity_id,
                        account_id: candidate.entities.account_id.clone(),
                    });
                }
            }
        }

        None
    }

    fn titles_match(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        if a.contains(b) || b.contains(a) {
            return true;
        }
        let words_a: BTreeSet<&str> = a.split_whitespace().collect();
        let words_b: BTreeSet<&str> = b.split_whitespace().collect();
        let intersection = words_a.intersection(&words_b).count();
        let union = words_a.union(&words_b).count();
        union > 0 && (intersection as f64 / union as f64) > self.config.jaccard_threshold
    }
}

fn candidate_title(event: &TimelineEvent) -> &str {
    match &event.payload {
        EventPayload::Calendar { title, .. } => title,
        _ => "",
    }
}

fn to_match(event: &TimelineEvent, matched_on: MatchReason) -> MeetingMatch {
    let (title, start_time) = match &event.payload {
        EventPayload::Calendar { title, start_time, .. } => {
            (title.clone(), start_time.unwrap_or(event.occurred_at))
        }
        _ => (String::new(), event.occurred_at),
    };
    MeetingMatch {
        meeting_id: event
            .entities
            .meeting_id
            .clone()
            .unwrap_or_else(|| event.id.as_str().to_string()),
        title,
        start_time,
        matched_on,
    }
}

/// Lowercase, punctuation stripped, whitespace collapsed.
fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::GraphConfig;
    use valet_core::event::{EventEntities, EventType, NewEvent, SourceSystem};
    use valet_store::{Database, EventStore};

    fn calendar(
        meeting_id: &str,
        title: &str,
        attendees: &[&str],
        at: DateTime<Utc>,
    ) -> NewEvent {
        NewEvent {
            event_type: EventType::CalendarObserved,
            source: SourceSystem::Calendar,
            occurred_at: at,
            entities: EventEntities {
                person_ids: attendees.iter().map(|a| a.to_string()).collect(),
                meeting_id: Some(meeting_id.to_string()),
                ..Default::default()
            },
            payload: EventPayload::Calendar {
                title: title.to_string(),
                start_time: Some(at),
                end_time: None,
                location: None,
                description: None,
                attendees: attendees.iter().map(|a| a.to_string()).collect(),
            },
            derived_metadata: None,
        }
    }

    fn crm_event(opportunity: &str, account: Option<&str>, persons: &[&str]) -> NewEvent {
        NewEvent {
            event_type: EventType::EmailThreadObserved,
            source: SourceSystem::Crm,
            occurred_at: Utc::now(),
            entities: EventEntities {
                person_ids: persons.iter().map(|p| p.to_string()).collect(),
                opportunity_id: Some(opportunity.to_string()),
                account_id: account.map(|a| a.to_string()),
                ..Default::default()
            },
            payload: EventPayload::EmailThread {
                subject: "pipeline".into(),
                from: "crm@example.com".into(),
                snippet: None,
            },
            derived_metadata: None,
        }
    }

    fn fixture() -> (EventStore, Database) {
        let db = Database::in_memory().unwrap();
        (EventStore::new(db.clone()), db)
    }

    #[test]
    fn title_match_ignores_case_and_punctuation() {
        let (store, db) = fixture();
        store
            .append(calendar("m1", "ACME Renewal Sync!", &[], Utc::now()))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        let hit = linker
            .find_linked_meeting(Some("Acme Renewal Sync"), None, &[])
            .unwrap();
        assert_eq!(hit.meeting_id, "m1");
        assert_eq!(hit.matched_on, MatchReason::Title);
    }

    #[test]
    fn unrelated_title_does_not_match() {
        let (store, db) = fixture();
        store
            .append(calendar("m1", "Acme Kickoff", &[], Utc::now()))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        assert!(linker
            .find_linked_meeting(Some("Acme Renewal Sync"), None, &[])
            .is_none());
    }

    #[test]
    fn containment_counts_as_title_match() {
        let (store, db) = fixture();
        store
            .append(calendar("m1", "Renewal Sync", &[], Utc::now()))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        let hit = linker
            .find_linked_meeting(Some("Acme Renewal Sync"), None, &[])
            .unwrap();
        assert_eq!(hit.matched_on, MatchReason::Title);
    }

    #[test]
    fn attendee_overlap_used_when_title_fails() {
        let (store, db) = fixture();
        store
            .append(calendar(
                "m1",
                "Untitled",
                &["Jane@Acme.com", "rob@acme.com"],
                Utc::now(),
            ))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        let hit = linker
            .find_linked_meeting(
                Some("completely different words"),
                None,
                &["jane@acme.com".to_string()],
            )
            .unwrap();
        assert_eq!(hit.meeting_id, "m1");
        assert_eq!(hit.matched_on, MatchReason::Attendees);
    }

    #[test]
    fn temporal_fallback_respects_two_hour_bound() {
        let hint = Utc::now() - Duration::hours(6);

        // 119 minutes away: accepted
        let (store, db) = fixture();
        store
            .append(calendar("near", "x", &[], hint + Duration::minutes(119)))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        let hit = linker.find_linked_meeting(None, Some(hint), &[]).unwrap();
        assert_eq!(hit.meeting_id, "near");
        assert_eq!(hit.matched_on, MatchReason::Temporal);

        // 121 minutes away: rejected
        let (store, db) = fixture();
        store
            .append(calendar("far", "x", &[], hint + Duration::minutes(121)))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());
        assert!(linker.find_linked_meeting(None, Some(hint), &[]).is_none());
    }

    #[test]
    fn hint_window_excludes_distant_candidates() {
        let hint = Utc::now() - Duration::days(5);
        let (store, db) = fixture();
        // Outside the ±24h hint window entirely
        store
            .append(calendar("m1", "Weekly Sync", &[], hint + Duration::days(3)))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        assert!(linker
            .find_linked_meeting(Some("Weekly Sync"), Some(hint), &[])
            .is_none());
    }

    #[test]
    fn first_match_in_recency_order_wins() {
        let (store, db) = fixture();
        let now = Utc::now();
        store
            .append(calendar("older", "Budget Review", &[], now - Duration::hours(30)))
            .unwrap();
        store
            .append(calendar("newer", "Budget Review", &[], now - Duration::hours(1)))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        let hit = linker
            .find_linked_meeting(Some("Budget Review"), None, &[])
            .unwrap();
        assert_eq!(hit.meeting_id, "newer");
    }

    #[test]
    fn opportunity_link_via_attendee_overlap() {
        let (store, db) = fixture();
        store
            .append(crm_event("opp-1", Some("acct-1"), &["jane@acme.com"]))
            .unwrap();
        let graph = ContextGraph::new(db, GraphConfig::default());
        let linker = EntityLinker::new(&graph, LinkerConfig::default());

        let hit = linker
            .find_linked_opportunity(&["JANE@acme.com".to_string()])
            .unwrap();
        assert_eq!(hit.opportunity_id, "opp-1");
        assert_eq!(hit.account_id.as_deref(), Some("acct-1"));

        assert!(linker
            .find_linked_opportunity(&["stranger@elsewhere.com".to_string()])
            .is_none());
        assert!(linker.find_linked_opportunity(&[]).is_none());
    }

    #[test]
    fn normalize_title_strips_noise() {
        assert_eq!(normalize_title("  ACME -- Renewal    Sync!!"), "acme renewal sync");
        assert_eq!(normalize_title("???"), "");
    }
}

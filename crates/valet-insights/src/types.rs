use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use valet_core::ids::EventId;
use valet_graph::projections::{PersonInteraction, TimelineEvent};
use valet_graph::OpportunityMatch;

use crate::rules::MatchKind;

/// An explicit commitment or task mined from transcript text, with enough
/// surrounding material to audit where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedAction {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentioned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentioned_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_person_ids: Vec<String>,
    pub match_kind: MatchKind,
    pub source_context: String,
}

/// Counts per match family over one extraction run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_actions: usize,
    pub action_items: usize,
    pub commitments: usize,
    pub time_bound: usize,
    pub follow_ups: usize,
}

impl ExtractionStats {
    pub fn from_actions(actions: &[ExtractedAction]) -> Self {
        let count = |kind: MatchKind| actions.iter().filter(|a| a.match_kind == kind).count();
        Self {
            total_actions: actions.len(),
            action_items: count(MatchKind::ActionItem),
            commitments: count(MatchKind::Commitment),
            time_bound: count(MatchKind::TimeBound),
            follow_ups: count(MatchKind::FollowUp),
        }
    }
}

/// Tunables for brief composition.
#[derive(Clone, Debug)]
pub struct BriefConfig {
    /// Interaction history window per attendee.
    pub lookback_days: u32,
    /// Timeline depth fetched per attendee.
    pub timeline_limit: u32,
    /// Merged recent-interaction events kept in a brief.
    pub recent_cap: usize,
    /// Interactions kept per attendee context block.
    pub attendee_recent_cap: usize,
    /// Email threads surfaced per brief.
    pub thread_cap: usize,
    /// Attendees considered when pooling context.
    pub attendee_cap: usize,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            timeline_limit: 20,
            recent_cap: 10,
            attendee_recent_cap: 5,
            thread_cap: 5,
            attendee_cap: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingInfo {
    pub meeting_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One attendee's interaction history, summarized for the brief.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttendeeContext {
    pub email: String,
    pub interaction_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<DateTime<Utc>>,
    pub recent_interactions: Vec<PersonInteraction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedFollowUp {
    pub event_id: EventId,
    pub contact_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub context: String,
    pub urgency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedThread {
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// The pre-meeting report: who you are meeting and everything the log
/// knows about them. Rebuilt from the store on every request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreMeetingBrief {
    pub meeting: MeetingInfo,
    pub attendees: Vec<AttendeeContext>,
    pub recent_interactions: Vec<TimelineEvent>,
    pub open_follow_ups: Vec<RelatedFollowUp>,
    pub related_threads: Vec<RelatedThread>,
    pub generated_at: DateTime<Utc>,
    pub data_sources: Vec<String>,
}

/// Context correlated around a transcript from the rest of the log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SurfacedContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_opportunity: Option<OpportunityMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_follow_ups: Vec<RelatedFollowUp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_threads: Vec<RelatedThread>,
}

/// The post-meeting report: extracted actions plus correlated context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostMeetingInsights {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    pub transcript_id: String,
    pub meeting_title: String,
    pub meeting_date: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub extracted_actions: Vec<ExtractedAction>,
    pub surfaced_context: SurfacedContext,
    pub generated_at: DateTime<Utc>,
    pub extraction_stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: MatchKind) -> ExtractedAction {
        ExtractedAction {
            text: "do the thing".into(),
            mentioned_by: None,
            mentioned_time: None,
            related_person_ids: vec![],
            match_kind: kind,
            source_context: "ctx".into(),
        }
    }

    #[test]
    fn stats_count_per_family() {
        let actions = vec![
            action(MatchKind::ActionItem),
            action(MatchKind::Commitment),
            action(MatchKind::Commitment),
            action(MatchKind::TimeBound),
        ];
        let stats = ExtractionStats::from_actions(&actions);
        assert_eq!(stats.total_actions, 4);
        assert_eq!(stats.action_items, 1);
        assert_eq!(stats.commitments, 2);
        assert_eq!(stats.time_bound, 1);
        assert_eq!(stats.follow_ups, 0);
    }
}

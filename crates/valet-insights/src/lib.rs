pub mod extract;
pub mod post;
pub mod pre;
pub mod rules;
pub mod types;

pub use extract::ActionExtractor;
pub use post::{insights_for_meeting, insights_for_transcript, post_meeting_insights};
pub use pre::{pre_meeting_brief, upcoming_meeting_brief};
pub use rules::MatchKind;
pub use types::{
    AttendeeContext, BriefConfig, ExtractedAction, ExtractionStats, MeetingInfo,
    PostMeetingInsights, PreMeetingBrief, RelatedFollowUp, RelatedThread, SurfacedContext,
};

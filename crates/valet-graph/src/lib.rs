pub mod linker;
pub mod projections;
pub mod queries;

pub use linker::{EntityLinker, LinkerConfig, MatchReason, MeetingMatch, OpportunityMatch};
pub use projections::{CooccurrenceResult, EventStats, PersonInteraction, RelatedEntityRefs, TimelineEvent};
pub use queries::{ContextGraph, GraphConfig};

pub mod event;
pub mod ids;
pub mod payload;

pub use event::{Event, EventEntities, EventType, NewEvent, SourceSystem, ValidationError};
pub use ids::EventId;
pub use payload::{DerivedMetadata, EventPayload};

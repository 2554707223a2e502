use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;
use crate::payload::{DerivedMetadata, EventPayload};

/// Closed set of facts the log records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CalendarObserved,
    EmailThreadObserved,
    EmailSent,
    TaskCreated,
    FollowUpCreated,
    ReminderFired,
    TranscriptObserved,
}

impl EventType {
    /// The payload variant this event type carries.
    pub fn expected_payload_kind(&self) -> &'static str {
        match self {
            Self::CalendarObserved => "calendar",
            Self::EmailThreadObserved => "email_thread",
            Self::EmailSent => "email_sent",
            Self::TaskCreated => "task",
            Self::FollowUpCreated => "follow_up",
            Self::ReminderFired => "reminder",
            Self::TranscriptObserved => "transcript",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CalendarObserved => "calendar_observed",
            Self::EmailThreadObserved => "email_thread_observed",
            Self::EmailSent => "email_sent",
            Self::TaskCreated => "task_created",
            Self::FollowUpCreated => "follow_up_created",
            Self::ReminderFired => "reminder_fired",
            Self::TranscriptObserved => "transcript_observed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar_observed" => Ok(Self::CalendarObserved),
            "email_thread_observed" => Ok(Self::EmailThreadObserved),
            "email_sent" => Ok(Self::EmailSent),
            "task_created" => Ok(Self::TaskCreated),
            "follow_up_created" => Ok(Self::FollowUpCreated),
            "reminder_fired" => Ok(Self::ReminderFired),
            "transcript_observed" => Ok(Self::TranscriptObserved),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// The upstream system an observation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSystem {
    Calendar,
    Email,
    Crm,
    Transcription,
    Messaging,
    Internal,
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Calendar => "calendar",
            Self::Email => "email",
            Self::Crm => "crm",
            Self::Transcription => "transcription",
            Self::Messaging => "messaging",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SourceSystem {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(Self::Calendar),
            "email" => Ok(Self::Email),
            "crm" => Ok(Self::Crm),
            "transcription" => Ok(Self::Transcription),
            "messaging" => Ok(Self::Messaging),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown source system: {other}")),
        }
    }
}

/// Sparse foreign keys into upstream systems.
///
/// These exist for indexed lookup only; a reference may point at nothing
/// and no integrity is enforced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub person_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload kind '{payload}' does not match event type '{event_type}'")]
    PayloadMismatch { event_type: String, payload: String },
}

/// A fact about to be written. The store assigns `id` and `ingested_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: SourceSystem,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub entities: EventEntities,
    pub payload: EventPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_metadata: Option<DerivedMetadata>,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let expected = self.event_type.expected_payload_kind();
        if self.payload.kind() != expected {
            return Err(ValidationError::PayloadMismatch {
                event_type: self.event_type.to_string(),
                payload: self.payload.kind().to_string(),
            });
        }
        Ok(())
    }
}

/// An immutable row of the log. Fields never change after the write.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: SourceSystem,
    pub occurred_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub entities: EventEntities,
    pub payload: EventPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_metadata: Option<DerivedMetadata>,
}

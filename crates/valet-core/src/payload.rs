use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The observed fact carried by an event, typed per event kind.
///
/// The `kind` tag mirrors the event's `EventType`; `NewEvent::validate`
/// rejects a payload filed under the wrong type. Adding an event type means
/// adding a variant here, and the compiler walks you to every match site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Calendar {
        title: String,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attendees: Vec<String>,
    },
    EmailThread {
        subject: String,
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snippet: Option<String>,
    },
    EmailSent {
        subject: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        to: Vec<String>,
    },
    Task {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    FollowUp {
        contact_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact_email: Option<String>,
        context: String,
        urgency: String,
    },
    Reminder {
        note: String,
    },
    Transcript {
        title: String,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        action_items: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attendees: Vec<String>,
    },
}

impl EventPayload {
    /// The serde tag for this variant, matching `EventType` wire names.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Calendar { .. } => "calendar",
            Self::EmailThread { .. } => "email_thread",
            Self::EmailSent { .. } => "email_sent",
            Self::Task { .. } => "task",
            Self::FollowUp { .. } => "follow_up",
            Self::Reminder { .. } => "reminder",
            Self::Transcript { .. } => "transcript",
        }
    }
}

/// Writer-supplied auxiliary fields, stored as written and never recomputed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}

impl DerivedMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

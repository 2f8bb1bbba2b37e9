//! Urgency classification for incoming interruptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const CRITICAL_KEYWORDS: [&str; 5] = ["emergency", "critical", "outage", "sev1", "security breach"];

const URGENT_KEYWORDS: [&str; 5] = [
    "urgent",
    "asap",
    "immediately",
    "time sensitive",
    "deadline today",
];

const AUTOMATED_SENDER_MARKERS: [&str; 5] = [
    "noreply",
    "no-reply",
    "newsletter",
    "notifications@",
    "digest",
];

/// Four-level urgency, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Where an interruption came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionSource {
    Mail,
    Chat,
    Call,
    SystemNotification,
    Social,
    Calendar,
    Other,
}

impl InterruptionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            InterruptionSource::Mail => "mail",
            InterruptionSource::Chat => "chat",
            InterruptionSource::Call => "call",
            InterruptionSource::SystemNotification => "system_notification",
            InterruptionSource::Social => "social",
            InterruptionSource::Calendar => "calendar",
            InterruptionSource::Other => "other",
        }
    }

    /// Urgency when nothing in the event says otherwise.
    fn baseline(self) -> Urgency {
        match self {
            InterruptionSource::Chat | InterruptionSource::Call | InterruptionSource::Calendar => {
                Urgency::Medium
            }
            InterruptionSource::Mail
            | InterruptionSource::SystemNotification
            | InterruptionSource::Social
            | InterruptionSource::Other => Urgency::Low,
        }
    }
}

impl fmt::Display for InterruptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InterruptionSource {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mail" | "email" => Ok(InterruptionSource::Mail),
            "chat" => Ok(InterruptionSource::Chat),
            "call" => Ok(InterruptionSource::Call),
            "system_notification" | "system" => Ok(InterruptionSource::SystemNotification),
            "social" => Ok(InterruptionSource::Social),
            "calendar" => Ok(InterruptionSource::Calendar),
            "other" => Ok(InterruptionSource::Other),
            other => Err(crate::error::ValidationError::InvalidValue {
                field: "source".into(),
                message: format!("unknown interruption source '{other}'"),
            }),
        }
    }
}

/// An interruption arriving from the host's notification surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptionEvent {
    pub id: String,
    pub source: InterruptionSource,
    pub sender: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    /// Filled in by the gate when the event is intercepted.
    #[serde(default)]
    pub urgency: Option<Urgency>,
}

impl InterruptionEvent {
    pub fn new(
        source: InterruptionSource,
        sender: impl Into<String>,
        content: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            sender: sender.into(),
            content: content.into(),
            received_at,
            urgency: None,
        }
    }
}

/// Keyword, contact, and sender based urgency rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrgencyClassifier {
    emergency_contacts: Vec<String>,
    priority_contacts: Vec<String>,
    extra_urgent_keywords: Vec<String>,
}

impl UrgencyClassifier {
    pub fn new(
        emergency_contacts: &[String],
        priority_contacts: &[String],
        extra_urgent_keywords: &[String],
    ) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            emergency_contacts: lower(emergency_contacts),
            priority_contacts: lower(priority_contacts),
            extra_urgent_keywords: lower(extra_urgent_keywords),
        }
    }

    pub fn classify(&self, event: &InterruptionEvent) -> Urgency {
        let sender = event.sender.to_lowercase();
        let content = event.content.to_lowercase();

        if matches_contact(&sender, &self.emergency_contacts) {
            return Urgency::Critical;
        }
        if CRITICAL_KEYWORDS.iter().any(|k| content.contains(k)) {
            return Urgency::Critical;
        }
        let urgent = URGENT_KEYWORDS.iter().any(|k| content.contains(k))
            || self
                .extra_urgent_keywords
                .iter()
                .any(|k| content.contains(k.as_str()));
        if urgent || matches_contact(&sender, &self.priority_contacts) {
            return Urgency::High;
        }
        if AUTOMATED_SENDER_MARKERS.iter().any(|m| sender.contains(m)) {
            return Urgency::Low;
        }
        event.source.baseline()
    }
}

/// Exact match, or the contact appears inside a "Name <address>" sender.
fn matches_contact(sender: &str, contacts: &[String]) -> bool {
    contacts.iter().any(|contact| {
        sender == contact || sender.contains(&format!("<{contact}>"))
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Sent once when a conference ends
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConferenceEndEvent {
    /// When the conference started
    pub start_time: DateTime<Utc>,
    /// How long the conference lasted, in seconds
    pub duration: u64,
    /// Provider-specific keys attached when the conference was created
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Everyone who joined the conference
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

impl ConferenceEndEvent {
    /// Parse the raw payload
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Someone who joined the conference
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Attendee {
    /// The identifier the conference knows them by
    #[serde(alias = "id")]
    pub external_id: String,
    /// Whether they ran the conference
    #[serde(default, alias = "host")]
    pub is_host: bool,
}

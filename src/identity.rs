use crate::{event::ConferenceEndEvent, settings::MetadataKeys};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

/// The keys identifying which meeting and launch an event belongs to
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventKeys {
    pub meeting: String,
    pub launch: String,
}

/// A required key was not present
#[derive(Debug, Eq, PartialEq)]
pub struct MissingKey(pub String);

impl Display for MissingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "missing identity key {:?}", self.0)
    }
}

impl std::error::Error for MissingKey {}

/// Extract the meeting and launch references from the event metadata
///
/// The meeting reference is extracted first, so it is the one reported when both are missing.
pub fn resolve(event: &ConferenceEndEvent, keys: &MetadataKeys) -> Result<EventKeys, MissingKey> {
    let meeting = lookup(&event.metadata, &keys.meeting)?;
    let launch = lookup(&event.metadata, &keys.launch)?;

    Ok(EventKeys { meeting, launch })
}

/// Extract the institution reference from the parameters of a resolved launch
pub fn institution_key(params: &Value, name: &str) -> Result<String, MissingKey> {
    params
        .get(name)
        .and_then(as_key)
        .ok_or_else(|| MissingKey(name.to_owned()))
}

fn lookup(metadata: &HashMap<String, Value>, name: &str) -> Result<String, MissingKey> {
    metadata
        .get(name)
        .and_then(as_key)
        .ok_or_else(|| MissingKey(name.to_owned()))
}

/// Keys are opaque, but some producers send them as numbers
fn as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

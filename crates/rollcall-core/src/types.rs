use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable key for one enrolled person.
///
/// Opaque beyond equality and hashing; the recognizer decides what the
/// string contains (typically the enrollment directory name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recognition observation delivered to the tracker.
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    pub identity: Identity,
    /// Recognition confidence in [0, 1], when the recognizer reports one.
    /// Consumed by the driver's confidence floor; the tracker ignores it.
    pub confidence: Option<f32>,
    /// Stamped by the driver. The tracker works off the `now` argument of
    /// `step`, never off this field.
    pub timestamp: DateTime<Local>,
}

/// One continuous presence interval for one identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    /// Set once at creation, immutable afterwards.
    pub entered_at: DateTime<Local>,
    /// Updated on every sighting while the session is open.
    pub last_seen_at: DateTime<Local>,
    /// Set exactly once, at finalization.
    pub exited_at: Option<DateTime<Local>>,
    /// True once the session has left the live set.
    pub finalized: bool,
}

impl Session {
    pub(crate) fn open(identity: Identity, now: DateTime<Local>) -> Self {
        Self {
            identity,
            entered_at: now,
            last_seen_at: now,
            exited_at: None,
            finalized: false,
        }
    }
}

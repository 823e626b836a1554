//! rollcall-core — Presence tracking and the durable attendance ledger.
//!
//! Turns a noisy per-frame stream of identity recognitions into discrete
//! attendance sessions (entry time, exit time) and persists each finished
//! session exactly once to an append-only CSV log.

pub mod ledger;
pub mod recognizer;
pub mod tracker;
pub mod types;

pub use ledger::{AttendanceLedger, AttendanceRecord, LedgerError};
pub use recognizer::{Candidate, Recognizer, RecognizerError, Region};
pub use tracker::PresenceTracker;
pub use types::{Identity, RecognitionEvent, Session};

use std::path::PathBuf;

/// Per-user data directory for rollcall state (`$XDG_DATA_HOME/rollcall`).
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

//! Presence tracker — the session state machine.
//!
//! Applies entry/exit/debounce policy to batches of recognition events.
//! Pure state over `(events, now)` pairs: no clock reads, no I/O, so the
//! whole machine is unit-testable without real time or a real camera.

use crate::types::{Identity, RecognitionEvent, Session};
use chrono::{DateTime, Duration, Local};
use std::collections::{HashMap, HashSet};

/// Tracks one open [`Session`] per identity and finalizes sessions whose
/// identity has gone unseen for longer than the exit timeout.
pub struct PresenceTracker {
    exit_timeout: Duration,
    open: HashMap<Identity, Session>,
}

impl PresenceTracker {
    pub fn new(exit_timeout: Duration) -> Self {
        Self {
            exit_timeout,
            open: HashMap::new(),
        }
    }

    /// Apply one batch of recognition events observed at `now`, then evict
    /// timed-out sessions. Returns the sessions finalized by this step.
    ///
    /// Events are applied before eviction, so an identity reappearing in the
    /// same batch in which it would otherwise time out stays present. The
    /// timeout comparison is strict: a gap exactly equal to the threshold
    /// does not close the session.
    pub fn step(&mut self, events: &[RecognitionEvent], now: DateTime<Local>) -> Vec<Session> {
        for event in events {
            match self.open.get_mut(&event.identity) {
                Some(session) => session.last_seen_at = now,
                None => {
                    tracing::info!(identity = %event.identity, at = %now, "entry");
                    self.open
                        .insert(event.identity.clone(), Session::open(event.identity.clone(), now));
                }
            }
        }

        let seen: HashSet<&Identity> = events.iter().map(|e| &e.identity).collect();
        let expired: Vec<Identity> = self
            .open
            .iter()
            .filter(|(identity, session)| {
                !seen.contains(identity)
                    && !session.finalized
                    && now - session.last_seen_at > self.exit_timeout
            })
            .map(|(identity, _)| identity.clone())
            .collect();

        let mut finalized = Vec::with_capacity(expired.len());
        for identity in expired {
            if let Some(session) = self.open.remove(&identity) {
                finalized.push(Self::finalize(session, now));
            }
        }
        sort_for_output(&mut finalized);
        finalized
    }

    /// Finalize every remaining open session with `exited_at = now`,
    /// regardless of timeout, and clear the live set. Shutdown path: keeps
    /// in-progress presence from being lost when the driver stops.
    pub fn flush(&mut self, now: DateTime<Local>) -> Vec<Session> {
        let mut finalized: Vec<Session> = self
            .open
            .drain()
            .map(|(_, session)| Self::finalize(session, now))
            .collect();
        sort_for_output(&mut finalized);
        finalized
    }

    /// Open (not yet finalized) sessions, in no particular order.
    pub fn open_sessions(&self) -> impl Iterator<Item = &Session> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn finalize(mut session: Session, now: DateTime<Local>) -> Session {
        session.exited_at = Some(now);
        session.finalized = true;
        tracing::info!(
            identity = %session.identity,
            entered_at = %session.entered_at,
            exited_at = %now,
            "exit"
        );
        session
    }
}

/// Deterministic persistence order when several sessions close in one step.
fn sort_for_output(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        a.entered_at
            .cmp(&b.entered_at)
            .then_with(|| a.identity.cmp(&b.identity))
    });
}

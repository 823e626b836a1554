//! Driver loop — one tick per recognition period.
//!
//! Owns the tracker and the ledger; every mutation of either goes through
//! this task, so the single-writer discipline holds by construction. The
//! engine thread only ever sees frames and candidates.

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle, Observation};
use chrono::{DateTime, Local};
use rollcall_core::{
    AttendanceLedger, Candidate, LedgerError, PresenceTracker, RecognitionEvent,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Point-in-time view of the daemon, published after every tick and served
/// over the control interface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub version: String,
    pub open_sessions: Vec<OpenSessionInfo>,
    pub sessions_recorded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionInfo {
    pub name: String,
    pub entered_at: String,
    pub last_seen_at: String,
}

pub struct Driver {
    tracker: PresenceTracker,
    ledger: AttendanceLedger,
    engine: EngineHandle,
    tick: std::time::Duration,
    confidence_floor: Option<f32>,
    status: watch::Sender<StatusSnapshot>,
    sessions_recorded: u64,
}

impl Driver {
    pub fn new(
        tracker: PresenceTracker,
        ledger: AttendanceLedger,
        engine: EngineHandle,
        cfg: &Config,
        status: watch::Sender<StatusSnapshot>,
    ) -> Self {
        Self {
            tracker,
            ledger,
            engine,
            tick: cfg.tick_interval(),
            confidence_floor: cfg.confidence_floor,
            status,
            sessions_recorded: 0,
        }
    }

    /// Run until a stop request (signal or control interface) or an
    /// unrecoverable persistence failure. The shutdown flush runs on every
    /// exit path so open sessions are never silently lost.
    pub async fn run(&mut self, mut stop: mpsc::Receiver<()>) -> Result<(), DriverError> {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut outcome = Ok(());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.engine.observe().await {
                        Ok(observation) => {
                            if let Err(err) = self.apply(observation, Local::now()) {
                                tracing::error!(error = %err, "failed to persist finalized session");
                                outcome = Err(err);
                                break;
                            }
                        }
                        Err(EngineError::ChannelClosed) => {
                            tracing::error!("engine thread gone; stopping");
                            outcome = Err(EngineError::ChannelClosed.into());
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "frame acquisition failed; skipping tick");
                        }
                    }
                    self.publish_status();
                }
                _ = &mut ctrl_c => {
                    tracing::info!("stop requested (signal)");
                    break;
                }
                Some(_) = stop.recv() => {
                    tracing::info!("stop requested (control interface)");
                    break;
                }
            }
        }

        self.shutdown(Local::now(), outcome)
    }

    /// Apply one observation at `now`. Only `Candidates` and
    /// `RecognizerFailed` step the tracker; `NoFrame` leaves session state
    /// (including timeout bookkeeping) untouched.
    fn apply(&mut self, observation: Observation, now: DateTime<Local>) -> Result<(), DriverError> {
        match observation {
            Observation::NoFrame => {
                tracing::debug!("no frame this tick");
                Ok(())
            }
            Observation::RecognizerFailed(reason) => {
                tracing::warn!(error = %reason, "recognition failed; treating as empty batch");
                self.step(&[], now)
            }
            Observation::Candidates(candidates) => {
                let events = build_events(candidates, self.confidence_floor, now);
                self.step(&events, now)
            }
        }
    }

    fn step(&mut self, events: &[RecognitionEvent], now: DateTime<Local>) -> Result<(), DriverError> {
        for session in self.tracker.step(events, now) {
            self.ledger.append(&session)?;
            self.sessions_recorded += 1;
        }
        Ok(())
    }

    fn shutdown(
        &mut self,
        now: DateTime<Local>,
        outcome: Result<(), DriverError>,
    ) -> Result<(), DriverError> {
        let open = self.tracker.flush(now);
        if !open.is_empty() {
            tracing::info!(count = open.len(), "finalizing open sessions at shutdown");
        }

        let mut outcome = outcome;
        for session in open {
            match self.ledger.append(&session) {
                Ok(()) => self.sessions_recorded += 1,
                Err(err) => {
                    tracing::error!(
                        identity = %session.identity,
                        error = %err,
                        "failed to persist session at shutdown"
                    );
                    if outcome.is_ok() {
                        outcome = Err(err.into());
                    }
                }
            }
        }
        self.publish_status();
        outcome
    }

    fn publish_status(&self) {
        let mut open_sessions: Vec<OpenSessionInfo> = self
            .tracker
            .open_sessions()
            .map(|s| OpenSessionInfo {
                name: s.identity.to_string(),
                entered_at: s.entered_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                last_seen_at: s.last_seen_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect();
        open_sessions.sort_by(|a, b| a.entered_at.cmp(&b.entered_at));

        self.status.send_replace(StatusSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            open_sessions,
            sessions_recorded: self.sessions_recorded,
        });
    }
}

/// Filter candidates by the confidence floor and stamp them as events.
fn build_events(
    candidates: Vec<Candidate>,
    floor: Option<f32>,
    now: DateTime<Local>,
) -> Vec<RecognitionEvent> {
    candidates
        .into_iter()
        .filter(|c| floor.map_or(true, |f| c.confidence >= f))
        .map(|c| RecognitionEvent {
            identity: c.identity,
            confidence: Some(c.confidence),
            timestamp: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use chrono::{Duration, TimeZone};
    use rollcall_core::{Recognizer, RecognizerError};
    use rollcall_hw::{CameraError, Frame, VideoSource};
    use std::path::PathBuf;

    fn at(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn temp_ledger(test: &str) -> AttendanceLedger {
        let dir = std::env::temp_dir().join(format!("rollcall-driver-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path: PathBuf = dir.join(format!("{test}.csv"));
        let _ = std::fs::remove_file(&path);
        AttendanceLedger::open(path).unwrap()
    }

    fn candidate(name: &str, confidence: f32) -> Candidate {
        Candidate {
            identity: name.into(),
            confidence,
            region: None,
        }
    }

    fn driver(test: &str, floor: Option<f32>) -> Driver {
        // `apply` never touches the engine; a closed handle is enough.
        let (tx, _rx) = mpsc::channel(1);
        let (status, _) = watch::channel(StatusSnapshot::default());
        Driver {
            tracker: PresenceTracker::new(Duration::seconds(10)),
            ledger: temp_ledger(test),
            engine: EngineHandle { tx },
            tick: std::time::Duration::from_millis(10),
            confidence_floor: floor,
            status,
            sessions_recorded: 0,
        }
    }

    #[test]
    fn candidates_open_then_timeout_persists() {
        let mut d = driver("timeout_persists", None);
        d.apply(Observation::Candidates(vec![candidate("alice", 0.9)]), at(0))
            .unwrap();
        assert_eq!(d.tracker.open_count(), 1);

        d.apply(Observation::Candidates(vec![]), at(11)).unwrap();
        assert_eq!(d.tracker.open_count(), 0);
        assert_eq!(d.sessions_recorded, 1);

        let records = d.ledger.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alice");
    }

    #[test]
    fn no_frame_does_not_advance_eviction() {
        let mut d = driver("no_frame_skips", None);
        d.apply(Observation::Candidates(vec![candidate("alice", 0.9)]), at(0))
            .unwrap();

        // Camera went quiet for far longer than the timeout; without a
        // fabricated batch the session must stay open.
        d.apply(Observation::NoFrame, at(30)).unwrap();
        assert_eq!(d.tracker.open_count(), 1);
        assert!(d.ledger.load_all().unwrap().is_empty());
    }

    #[test]
    fn recognizer_failure_still_advances_eviction() {
        let mut d = driver("recognizer_failure_evicts", None);
        d.apply(Observation::Candidates(vec![candidate("alice", 0.9)]), at(0))
            .unwrap();

        d.apply(Observation::RecognizerFailed("helper died".into()), at(11))
            .unwrap();
        assert_eq!(d.tracker.open_count(), 0);
        assert_eq!(d.ledger.load_all().unwrap().len(), 1);
    }

    #[test]
    fn confidence_floor_drops_weak_candidates() {
        let mut d = driver("confidence_floor", Some(0.8));
        d.apply(
            Observation::Candidates(vec![candidate("alice", 0.5), candidate("bob", 0.9)]),
            at(0),
        )
        .unwrap();

        assert_eq!(d.tracker.open_count(), 1);
        assert_eq!(
            d.tracker.open_sessions().next().unwrap().identity,
            "bob".into()
        );
    }

    #[test]
    fn shutdown_flushes_open_sessions() {
        let mut d = driver("shutdown_flush", None);
        d.apply(Observation::Candidates(vec![candidate("bob", 0.9)]), at(0))
            .unwrap();

        d.shutdown(at(3), Ok(())).unwrap();
        assert_eq!(d.tracker.open_count(), 0);

        let records = d.ledger.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "bob");
        assert_eq!(records[0].entry_time, "2026-03-02 09:00:00");
        assert_eq!(records[0].exit_time, "2026-03-02 09:00:03");
    }

    struct StubSource;

    impl VideoSource for StubSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            Ok(Some(Frame {
                data: vec![0u8; 4],
                width: 2,
                height: 2,
                timestamp: std::time::Instant::now(),
                sequence: 0,
            }))
        }
    }

    struct OneSighting {
        fired: bool,
    }

    impl Recognizer for OneSighting {
        fn identify(
            &mut self,
            _frame: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<Candidate>, RecognizerError> {
            if self.fired {
                Ok(vec![])
            } else {
                self.fired = true;
                Ok(vec![candidate("bob", 0.9)])
            }
        }
    }

    #[tokio::test]
    async fn run_flushes_on_stop_request() {
        let engine = spawn_engine(Box::new(StubSource), Box::new(OneSighting { fired: false }));
        let (status, _status_rx) = watch::channel(StatusSnapshot::default());
        let ledger = temp_ledger("run_stop_flush");
        let path = ledger.path().to_path_buf();

        let mut d = Driver {
            tracker: PresenceTracker::new(Duration::seconds(10)),
            ledger,
            engine,
            tick: std::time::Duration::from_millis(10),
            confidence_floor: None,
            status,
            sessions_recorded: 0,
        };

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let run = tokio::spawn(async move { d.run(stop_rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop_tx.send(()).await.unwrap();
        run.await.unwrap().unwrap();

        // Bob was sighted once and the stop arrived well before the exit
        // timeout; the flush path must have recorded him anyway.
        let records = AttendanceLedger::open(path).unwrap().load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "bob");
    }
}

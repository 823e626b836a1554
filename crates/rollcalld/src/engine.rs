//! Capture/recognition engine.
//!
//! V4L2 capture and the helper pipe are blocking, so both live on a
//! dedicated OS thread. The driver requests one observation per tick over
//! an mpsc channel and gets the reply on a oneshot.

use rollcall_core::{Candidate, Recognizer};
use rollcall_hw::{CameraError, VideoSource};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of one observation tick.
#[derive(Debug)]
pub enum Observation {
    /// Acquisition produced nothing; the driver skips the tick without
    /// stepping the tracker.
    NoFrame,
    /// Recognition ran; zero or more identity candidates.
    Candidates(Vec<Candidate>),
    /// The recognizer errored; the driver steps the tracker with an empty
    /// batch so timeouts still advance.
    RecognizerFailed(String),
}

enum EngineRequest {
    Observe {
        reply: oneshot::Sender<Result<Observation, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread. Dropping every handle stops the
/// thread and releases the camera and the helper.
#[derive(Clone)]
pub struct EngineHandle {
    pub(crate) tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request one observation: capture a frame and run recognition on it.
    pub async fn observe(&self) -> Result<Observation, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Observe { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread. The source and recognizer are
/// opened by the caller (fail-fast at startup) and owned by the thread.
pub fn spawn_engine(
    mut source: Box<dyn VideoSource + Send>,
    mut recognizer: Box<dyn Recognizer + Send>,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(EngineRequest::Observe { reply }) = rx.blocking_recv() {
                let result = run_observe(source.as_mut(), recognizer.as_mut());
                let _ = reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_observe(
    source: &mut dyn VideoSource,
    recognizer: &mut dyn Recognizer,
) -> Result<Observation, EngineError> {
    let frame = match source.next_frame()? {
        Some(frame) => frame,
        None => return Ok(Observation::NoFrame),
    };

    match recognizer.identify(&frame.data, frame.width, frame.height) {
        Ok(candidates) => {
            tracing::debug!(seq = frame.sequence, count = candidates.len(), "recognized");
            Ok(Observation::Candidates(candidates))
        }
        Err(err) => Ok(Observation::RecognizerFailed(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::RecognizerError;
    use rollcall_hw::Frame;

    struct StubSource {
        frames: Vec<Option<Frame>>,
    }

    impl VideoSource for StubSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            match self.frames.pop() {
                Some(frame) => Ok(frame),
                None => Err(CameraError::CaptureFailed("exhausted".into())),
            }
        }
    }

    enum StubRecognizer {
        Always(Vec<Candidate>),
        Failing,
    }

    impl Recognizer for StubRecognizer {
        fn identify(
            &mut self,
            _frame: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<Candidate>, RecognizerError> {
            match self {
                StubRecognizer::Always(candidates) => Ok(candidates.clone()),
                StubRecognizer::Failing => Err(RecognizerError::Backend("helper died".into())),
            }
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0u8; 4],
            width: 2,
            height: 2,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    fn candidate(name: &str) -> Candidate {
        Candidate {
            identity: name.into(),
            confidence: 0.9,
            region: None,
        }
    }

    #[tokio::test]
    async fn observe_reports_candidates() {
        let engine = spawn_engine(
            Box::new(StubSource {
                frames: vec![Some(frame())],
            }),
            Box::new(StubRecognizer::Always(vec![candidate("alice")])),
        );

        match engine.observe().await.unwrap() {
            Observation::Candidates(candidates) => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].identity, "alice".into());
            }
            other => panic!("unexpected observation: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_frame_becomes_no_frame() {
        let engine = spawn_engine(
            Box::new(StubSource {
                frames: vec![None],
            }),
            Box::new(StubRecognizer::Always(vec![])),
        );

        assert!(matches!(
            engine.observe().await.unwrap(),
            Observation::NoFrame
        ));
    }

    #[tokio::test]
    async fn recognizer_error_is_contained() {
        let engine = spawn_engine(
            Box::new(StubSource {
                frames: vec![Some(frame())],
            }),
            Box::new(StubRecognizer::Failing),
        );

        match engine.observe().await.unwrap() {
            Observation::RecognizerFailed(reason) => assert!(reason.contains("helper died")),
            other => panic!("unexpected observation: {other:?}"),
        }
    }

    #[tokio::test]
    async fn camera_error_propagates() {
        let engine = spawn_engine(
            Box::new(StubSource { frames: vec![] }),
            Box::new(StubRecognizer::Always(vec![])),
        );

        assert!(matches!(
            engine.observe().await,
            Err(EngineError::Camera(_))
        ));
    }
}

//! Recognizer seam — the identity-recognition collaborator.
//!
//! Detection, embedding, and matching live outside this crate; the tracker
//! only ever sees `(identity, confidence)` candidates.

use crate::types::Identity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Image-space bounding box for a recognized face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One identity candidate reported for a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub identity: Identity,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
    pub region: Option<Region>,
}

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer backend failed: {0}")]
    Backend(String),
    #[error("malformed recognizer response: {0}")]
    Protocol(String),
}

/// Maps a grayscale frame to zero or more identity candidates.
///
/// Errors are swallowed at the driver boundary and turned into an empty
/// event batch; they must never crash the loop or reach the tracker.
pub trait Recognizer {
    fn identify(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Candidate>, RecognizerError>;
}

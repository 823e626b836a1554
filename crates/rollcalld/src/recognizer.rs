//! Helper-process recognizer.
//!
//! All detection/embedding/matching work is delegated to a long-lived
//! external helper (typically a script wrapping a third-party recognition
//! library). The protocol is one JSON line per tick in each direction:
//!
//! request:  `{"frame": "<png path>", "width": 640, "height": 480}`
//! response: `[{"identity": "alice", "confidence": 0.97, "region": null}]`
//!
//! The frame is spooled as a PNG at a fixed path, overwritten every tick,
//! so the helper never parses raw pixel data off the pipe.

use rollcall_core::{Candidate, Recognizer, RecognizerError};
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Serialize)]
struct HelperRequest<'a> {
    frame: &'a str,
    width: u32,
    height: u32,
}

/// Recognizer backed by a helper subprocess speaking JSON lines.
pub struct HelperRecognizer {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    spool: PathBuf,
}

impl HelperRecognizer {
    /// Launch the helper from a whitespace-separated command line.
    /// Fails fast if the helper cannot be spawned.
    pub fn spawn(cmdline: &str, spool: PathBuf) -> Result<Self, RecognizerError> {
        let mut parts = cmdline.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| RecognizerError::Backend("empty recognizer command".into()))?;
        let mut command = Command::new(program);
        command.args(parts);
        Self::from_command(command, spool)
    }

    /// Launch the helper from a prepared [`Command`].
    pub fn from_command(mut command: Command, spool: PathBuf) -> Result<Self, RecognizerError> {
        if let Some(parent) = spool.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RecognizerError::Backend(format!("spool dir: {e}")))?;
            }
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| RecognizerError::Backend(format!("failed to spawn helper: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognizerError::Backend("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| RecognizerError::Backend("helper stdout unavailable".into()))?;

        tracing::info!(pid = child.id(), "recognizer helper started");

        Ok(Self {
            child,
            stdin,
            stdout,
            spool,
        })
    }

    pub fn spool_path(&self) -> &Path {
        &self.spool
    }

    fn spool_frame(&self, frame: &[u8], width: u32, height: u32) -> Result<(), RecognizerError> {
        let png = image::GrayImage::from_raw(width, height, frame.to_vec()).ok_or_else(|| {
            RecognizerError::Backend(format!(
                "frame buffer too short for {width}x{height}"
            ))
        })?;
        png.save(&self.spool)
            .map_err(|e| RecognizerError::Backend(format!("frame spool write: {e}")))?;
        Ok(())
    }
}

impl Recognizer for HelperRecognizer {
    fn identify(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Candidate>, RecognizerError> {
        self.spool_frame(frame, width, height)?;

        let spool = self.spool.to_string_lossy();
        let request = HelperRequest {
            frame: spool.as_ref(),
            width,
            height,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| RecognizerError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| RecognizerError::Backend(format!("helper write: {e}")))?;

        let mut response = String::new();
        let read = self
            .stdout
            .read_line(&mut response)
            .map_err(|e| RecognizerError::Backend(format!("helper read: {e}")))?;
        if read == 0 {
            return Err(RecognizerError::Backend("helper closed its stdout".into()));
        }

        serde_json::from_str(response.trim())
            .map_err(|e| RecognizerError::Protocol(format!("{e}: {}", response.trim())))
    }
}

impl Drop for HelperRecognizer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spool(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rollcall-helper-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("{test}.png"))
    }

    fn shell_helper(script: &str) -> Command {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn empty_response_yields_no_candidates() {
        let mut recognizer = HelperRecognizer::from_command(
            shell_helper("while read -r _; do echo '[]'; done"),
            spool("empty"),
        )
        .unwrap();

        let candidates = recognizer.identify(&[0u8; 4], 2, 2).unwrap();
        assert!(candidates.is_empty());
        assert!(recognizer.spool_path().exists());
    }

    #[test]
    fn candidates_are_parsed() {
        let mut recognizer = HelperRecognizer::from_command(
            shell_helper(
                r#"while read -r _; do echo '[{"identity":"alice","confidence":0.9,"region":null}]'; done"#,
            ),
            spool("candidates"),
        )
        .unwrap();

        let candidates = recognizer.identify(&[0u8; 4], 2, 2).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identity, "alice".into());
        assert!((candidates[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn malformed_response_is_a_protocol_error() {
        let mut recognizer = HelperRecognizer::from_command(
            shell_helper("while read -r _; do echo 'not json'; done"),
            spool("malformed"),
        )
        .unwrap();

        assert!(matches!(
            recognizer.identify(&[0u8; 4], 2, 2),
            Err(RecognizerError::Protocol(_))
        ));
    }

    #[test]
    fn dead_helper_is_a_backend_error() {
        let mut recognizer =
            HelperRecognizer::from_command(shell_helper("exit 0"), spool("dead")).unwrap();

        // Give the shell a moment to exit so the pipe is closed.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(matches!(
            recognizer.identify(&[0u8; 4], 2, 2),
            Err(RecognizerError::Backend(_))
        ));
    }
}

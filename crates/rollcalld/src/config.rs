use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the attendance CSV log.
    pub csv_path: PathBuf,
    /// Where the current frame is spooled for the recognizer helper.
    pub frame_spool: PathBuf,
    /// Command line that launches the recognizer helper process.
    pub recognizer_cmd: String,
    /// Seconds an identity may go unseen before its session closes.
    pub exit_timeout_secs: u64,
    /// Recognition tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Candidates below this confidence are dropped before tracking.
    /// Unset means accept all.
    pub confidence_floor: Option<f32>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = rollcall_core::default_data_dir();

        let csv_path = std::env::var("ROLLCALL_CSV_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::ledger::default_log_path());

        let frame_spool = std::env::var("ROLLCALL_FRAME_SPOOL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("frame.png"));

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            csv_path,
            frame_spool,
            recognizer_cmd: std::env::var("ROLLCALL_RECOGNIZER_CMD")
                .unwrap_or_else(|_| "rollcall-recognizer".to_string()),
            exit_timeout_secs: env_u64("ROLLCALL_EXIT_TIMEOUT_SECS", 10),
            tick_interval_ms: env_u64("ROLLCALL_TICK_INTERVAL_MS", 1000),
            confidence_floor: env_opt_f32("ROLLCALL_CONFIDENCE_FLOOR"),
        }
    }

    pub fn exit_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.exit_timeout_secs as i64)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

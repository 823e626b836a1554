use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod driver;
mod engine;
mod recognizer;

use config::Config;
use driver::{Driver, StatusSnapshot};
use recognizer::HelperRecognizer;
use rollcall_core::{AttendanceLedger, PresenceTracker};
use rollcall_hw::Camera;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let cfg = Config::from_env();

    // Fail fast: every resource the loop depends on is opened up front.
    let ledger = AttendanceLedger::open(&cfg.csv_path)?;
    tracing::info!(path = %cfg.csv_path.display(), "attendance log opened");

    let camera = Camera::open(&cfg.camera_device)?;
    tracing::info!(
        device = %cfg.camera_device,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    let helper = HelperRecognizer::spawn(&cfg.recognizer_cmd, cfg.frame_spool.clone())?;
    let engine = engine::spawn_engine(Box::new(camera), Box::new(helper));

    let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
    let (stop_tx, stop_rx) = mpsc::channel(1);

    // A missing session bus (headless deployments) is not fatal.
    let _bus = match dbus_interface::serve(status_rx, stop_tx).await {
        Ok(connection) => Some(connection),
        Err(err) => {
            tracing::warn!(error = %err, "D-Bus unavailable; running without control interface");
            None
        }
    };

    let tracker = PresenceTracker::new(cfg.exit_timeout());
    let mut driver = Driver::new(tracker, ledger, engine, &cfg, status_tx);

    tracing::info!(
        exit_timeout_secs = cfg.exit_timeout_secs,
        tick_interval_ms = cfg.tick_interval_ms,
        "rollcalld ready"
    );

    driver.run(stop_rx).await?;

    tracing::info!("rollcalld stopped");
    Ok(())
}

use crate::driver::StatusSnapshot;
use tokio::sync::{mpsc, watch};
use zbus::interface;

/// D-Bus control surface for the attendance daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
pub struct RollcallService {
    status: watch::Receiver<StatusSnapshot>,
    stop: mpsc::Sender<()>,
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Current daemon state: open sessions and the recorded-session count,
    /// as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.status.borrow().clone();
        serde_json::to_string(&snapshot).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Request a clean shutdown. Open sessions are finalized and persisted
    /// before the daemon exits. Returns false if a stop is already pending.
    async fn stop(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop requested over D-Bus");
        Ok(self.stop.try_send(()).is_ok())
    }
}

/// Register the service on the session bus. The returned connection must be
/// kept alive for the daemon's lifetime.
pub async fn serve(
    status: watch::Receiver<StatusSnapshot>,
    stop: mpsc::Sender<()>,
) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name("org.rollcall.Rollcall1")?
        .serve_at("/org/rollcall/Rollcall1", RollcallService { status, stop })?
        .build()
        .await
}

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{PollOutcome, RoombaController};

/// Handle to a running background poller.
///
/// Dropping the handle leaves the poller running; call [`PollerHandle::stop`]
/// to end it.
#[derive(Debug)]
pub struct PollerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub(crate) fn spawn(controller: RoombaController, interval: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(controller, interval, shutdown.clone()));
        info!(interval = %humantime::format_duration(interval), "status poller started");
        Self { shutdown, task }
    }

    /// Stops the poller after any in-flight poll has closed its session.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            warn!(%error, "status poller task ended abnormally");
        }
    }
}

#[instrument(skip_all, level = "debug", fields(device = controller.config().name()))]
async fn run(controller: RoombaController, interval: Duration, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = sleep(interval) => {}
        }

        match controller.poll().await {
            Ok(PollOutcome::Refreshed(snapshot)) => debug!(
                phase = ?snapshot.phase(),
                battery = snapshot.battery_level(),
                "status refreshed"
            ),
            Ok(PollOutcome::Skipped) => debug!("tick skipped"),
            Ok(PollOutcome::Preempted) => debug!("tick pre-empted"),
            Err(error) => warn!(%error, "status poll failed"),
        }
    }
    debug!("status poller stopped");
}

use std::sync::Arc;

use tokio::sync::watch;

use crate::status::{StatusSnapshot, Telemetry};

/// Published robot status.
///
/// Only an open session writes it, once per telemetry observation; readers
/// always see a complete snapshot.
#[derive(Debug, Clone)]
pub(crate) struct StatusCache {
    sender: Arc<watch::Sender<StatusSnapshot>>,
}

impl Default for StatusCache {
    fn default() -> Self {
        let (sender, _receiver) = watch::channel(StatusSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl StatusCache {
    pub(crate) fn current(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    pub(crate) fn seed(&self, snapshot: StatusSnapshot) {
        self.sender.send_replace(snapshot);
    }

    /// Derives the next snapshot from `telemetry` and publishes it.
    pub(crate) fn publish_observation(&self, telemetry: &Telemetry) -> StatusSnapshot {
        let next = self.sender.borrow().observe(telemetry);
        self.sender.send_replace(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn subscribers_see_each_publication() {
        let cache = StatusCache::default();
        let mut receiver = cache.subscribe();

        cache.publish_observation(&Telemetry {
            bat_pct: Some(30),
            ..Telemetry::default()
        });

        receiver
            .changed()
            .await
            .expect("cache sender should still be alive");
        assert_eq!(30, receiver.borrow().battery_level());
    }
}

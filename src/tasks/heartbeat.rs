use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::presence::PresenceRegistry;
use crate::websocket::SocketCommand;

/// Background task probing connection liveness.
///
/// Sends protocol-level ping frames on an interval and evicts connections
/// whose last activity exceeds the configured timeout. This is the backstop
/// that removes presence records for clients killed without a clean close.
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<PresenceRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<PresenceRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_pings();
                }
                _ = cleanup_timer.tick() => {
                    let evicted = self.registry.evict_stale(connection_timeout);
                    if evicted > 0 {
                        tracing::info!(
                            evicted = evicted,
                            timeout_secs = connection_timeout,
                            "Evicted silent connections"
                        );
                    }
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping for every live connection. Best-effort: a full channel
    /// means the connection is already backed up and the eviction sweep will
    /// deal with it.
    fn send_pings(&self) {
        let records = self.registry.all_records();
        if records.is_empty() {
            return;
        }

        let mut sent = 0usize;
        let mut failed = 0usize;
        for record in &records {
            match record.sender.try_send(SocketCommand::Ping) {
                Ok(()) => sent += 1,
                Err(_) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %record.id,
                        "Failed to queue ping, connection may be dead"
                    );
                }
            }
        }

        tracing::debug!(
            total = records.len(),
            sent = sent,
            failed = failed,
            "Heartbeat round completed"
        );
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::{ServerMessage, SocketCommand};

/// Handle for a single live WebSocket connection.
pub struct ConnectionRecord {
    pub id: Uuid,
    pub identity: String,
    pub sender: mpsc::Sender<SocketCommand>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds), refreshed on any inbound frame.
    last_activity: AtomicI64,
}

impl ConnectionRecord {
    fn new(identity: String, sender: mpsc::Sender<SocketCommand>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identity,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }
}

/// Authoritative identity -> live connection map.
///
/// Single-connection-per-identity: registering an identity that already has a
/// record replaces it, and the replaced connection is told to close. All
/// mutations go through one mutex, and every broadcast is fanned out with
/// non-blocking sends while the lock is still held, so broadcasts reach each
/// connection's channel in mutation order and always carry the key set at the
/// moment of their mutation. The lock is never held across an await.
pub struct PresenceRegistry {
    connections: Mutex<HashMap<String, Arc<ConnectionRecord>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection for an identity and broadcast the new online set.
    ///
    /// Returns the record for the new connection. If the identity already had
    /// a live record, the old writer task receives `SocketCommand::Close`.
    pub fn register(
        &self,
        identity: String,
        sender: mpsc::Sender<SocketCommand>,
    ) -> Arc<ConnectionRecord> {
        let record = Arc::new(ConnectionRecord::new(identity.clone(), sender));

        let replaced = {
            let mut connections = self.connections.lock().expect("presence registry poisoned");
            let replaced = connections.insert(identity.clone(), record.clone());
            if let Some(ref old) = replaced {
                let _ = old.sender.try_send(SocketCommand::Message(ServerMessage::error(
                    "REPLACED",
                    "A newer connection was opened for this identity",
                )));
                let _ = old.sender.try_send(SocketCommand::Close);
            }
            Self::broadcast_locked(&connections);
            replaced
        };

        if let Some(old) = replaced {
            tracing::info!(
                identity = %identity,
                old_connection_id = %old.id,
                new_connection_id = %record.id,
                "Connection replaced by newer one for same identity"
            );
        } else {
            tracing::info!(
                identity = %identity,
                connection_id = %record.id,
                "Connection registered"
            );
        }

        record
    }

    /// Remove the record for an identity iff `connection_id` is the one
    /// currently on file, then broadcast. A close event from a replaced
    /// (stale) connection is a no-op and triggers no broadcast.
    pub fn unregister(&self, identity: &str, connection_id: Uuid) -> bool {
        let removed = {
            let mut connections = self.connections.lock().expect("presence registry poisoned");
            match connections.get(identity) {
                Some(record) if record.id == connection_id => {
                    connections.remove(identity);
                    Self::broadcast_locked(&connections);
                    true
                }
                _ => false,
            }
        };

        if removed {
            tracing::info!(
                identity = %identity,
                connection_id = %connection_id,
                "Connection unregistered"
            );
        } else {
            tracing::debug!(
                identity = %identity,
                connection_id = %connection_id,
                "Ignoring close for connection no longer on record"
            );
        }

        removed
    }

    /// Current set of online identities.
    pub fn online_set(&self) -> Vec<String> {
        let connections = self.connections.lock().expect("presence registry poisoned");
        connections.keys().cloned().collect()
    }

    /// All live records (heartbeat fan-out).
    pub fn all_records(&self) -> Vec<Arc<ConnectionRecord>> {
        let connections = self.connections.lock().expect("presence registry poisoned");
        connections.values().cloned().collect()
    }

    /// Records whose last activity is older than `timeout_secs`.
    pub fn find_stale(&self, timeout_secs: u64) -> Vec<Arc<ConnectionRecord>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(timeout_secs as i64);
        let connections = self.connections.lock().expect("presence registry poisoned");
        connections
            .values()
            .filter(|record| record.last_activity() < cutoff)
            .cloned()
            .collect()
    }

    /// Evict connections that have been silent past the timeout. Each evicted
    /// writer is told to close; eviction goes through the stale-close guard so
    /// it can never remove a record that was replaced in the meantime.
    pub fn evict_stale(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale(timeout_secs);
        let mut evicted = 0;

        for record in stale {
            if self.unregister(&record.identity, record.id) {
                tracing::info!(
                    identity = %record.identity,
                    connection_id = %record.id,
                    timeout_secs = timeout_secs,
                    "Evicted silent connection"
                );
                let _ = record.sender.try_send(SocketCommand::Close);
                evicted += 1;
            }
        }

        evicted
    }

    pub fn stats(&self) -> PresenceStats {
        let connections = self.connections.lock().expect("presence registry poisoned");
        PresenceStats {
            online: connections.len(),
        }
    }

    /// Fan the current online set out to every connection. Called with the
    /// registry lock held, so consecutive broadcasts reach each channel in
    /// mutation order. Best-effort per recipient: a slow peer with a full
    /// channel is skipped rather than awaited.
    fn broadcast_locked(connections: &HashMap<String, Arc<ConnectionRecord>>) {
        let online: Vec<String> = connections.keys().cloned().collect();
        let message = ServerMessage::presence_update(online);

        let mut delivered = 0usize;
        let mut skipped = 0usize;
        for record in connections.values() {
            match record.sender.try_send(SocketCommand::Message(message.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => skipped += 1,
            }
        }

        tracing::debug!(
            recipients = connections.len(),
            delivered = delivered,
            skipped = skipped,
            "Broadcast presence update"
        );
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PresenceStats {
    pub online: usize,
}

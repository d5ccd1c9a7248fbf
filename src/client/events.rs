/// Lifecycle state of the managed connection, published via a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why the socket left the `Connected` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We asked for the close (logout / explicit disconnect). No reconnect.
    Requested,
    /// The server sent a close frame. No reconnect.
    ServerClosed,
    /// Transport-level failure. The loop schedules one reconnect attempt.
    Error(String),
}

/// Events produced by the socket task for the application to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connected,
    Disconnected(DisconnectReason),
    PresenceUpdate(Vec<String>),
}

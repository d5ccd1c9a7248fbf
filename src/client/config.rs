use std::path::PathBuf;
use std::time::Duration;

/// Client-side configuration for the session controller and socket loop.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the auth/profile API, e.g. "http://127.0.0.1:8082"
    pub http_url: String,
    /// WebSocket endpoint, e.g. "ws://127.0.0.1:8082/ws"
    pub ws_url: String,
    /// Durable credential token location.
    pub token_path: PathBuf,
    /// Fixed delay before each reconnection attempt. Single-shot, no backoff
    /// growth, no retry ceiling: adequate for a foreground chat client only.
    pub reconnect_delay: Duration,
    /// Timeout for a single WebSocket connection attempt.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Build a config pointing at `host:port`, deriving both URLs.
    pub fn for_server(addr: &str) -> Self {
        Self {
            http_url: format!("http://{}", addr),
            ws_url: format!("ws://{}/ws", addr),
            token_path: default_token_path(),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

fn default_token_path() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    base.join(".chat-presence").join("token")
}

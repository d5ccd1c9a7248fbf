//! Client session layer: authentication state machine plus the single
//! managed WebSocket connection that carries presence pushes.

mod config;
mod events;
mod session;
mod socket;
mod token_store;

pub use config::ClientConfig;
pub use events::{ConnectionState, DisconnectReason, SocketEvent};
pub use session::{AuthState, ClientError, Session, SessionController};
pub use socket::SocketHandle;
pub use token_store::TokenStore;

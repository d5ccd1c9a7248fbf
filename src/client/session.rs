use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::api::types::{
    AuthResponse, ErrorEnvelope, LoginRequest, SignupRequest, UpdateProfileRequest,
};
use crate::users::Profile;

use super::config::ClientConfig;
use super::events::{ConnectionState, SocketEvent};
use super::socket::{self, SocketHandle};
use super::token_store::TokenStore;

const EVENT_BUFFER_SIZE: usize = 32;

/// Errors surfaced to the caller of session operations. Transport failures on
/// the presence socket never appear here; the socket loop handles those.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Validation(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Token storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

/// An authenticated session: the identity, the credential token it was
/// established with, and the current profile.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: String,
    pub token: String,
    pub profile: Profile,
}

/// Authentication dimension of the controller's state machine.
#[derive(Debug, Clone)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated(Session),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Owns authentication state and orchestrates the managed connection as a
/// function of it. Constructed once by the application's composition root;
/// all transitions go through `&mut self`, so callers serialize access by
/// ownership rather than hidden globals.
pub struct SessionController {
    config: ClientConfig,
    http: reqwest::Client,
    token_store: TokenStore,
    state: AuthState,
    /// True until the initial `check_session` completes (either way), so UI
    /// never has to infer whether authentication is still being resolved.
    checking_auth: bool,
    socket: Option<SocketHandle>,
    event_tx: mpsc::Sender<SocketEvent>,
}

impl SessionController {
    /// Returns the controller and the receiver for socket lifecycle events
    /// (`Connected`, `Disconnected(reason)`, `PresenceUpdate(set)`).
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<SocketEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let token_store = TokenStore::new(config.token_path.clone());

        let controller = Self {
            config,
            http: reqwest::Client::new(),
            token_store,
            state: AuthState::Unauthenticated,
            checking_auth: true,
            socket: None,
            event_tx,
        };

        (controller, event_rx)
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_checking_auth(&self) -> bool {
        self.checking_auth
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.socket
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Socket handle for callers that want to await connection state changes.
    pub fn socket(&self) -> Option<&SocketHandle> {
        self.socket.as_ref()
    }

    /// Validate the persisted token against the server.
    ///
    /// Completes exactly once per call and clears `checking_auth` on every
    /// path. An invalid credential silently discards the persisted token
    /// ("never logged in"); a network failure keeps it for the next start.
    pub async fn check_session(&mut self) -> Result<bool, ClientError> {
        let result = self.check_session_inner().await;
        self.checking_auth = false;
        result
    }

    async fn check_session_inner(&mut self) -> Result<bool, ClientError> {
        let Some(token) = self.token_store.load()? else {
            return Ok(false);
        };

        let url = format!("{}/api/auth/check", self.config.http_url);
        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::info!("Persisted token rejected, clearing it");
            self.token_store.clear()?;
            return Ok(false);
        }

        let response = response.error_for_status()?;
        let auth: AuthResponse = response.json().await?;

        tracing::info!(identity = %auth.identity, "Session restored from persisted token");

        self.state = AuthState::Authenticated(Session {
            identity: auth.identity,
            token,
            profile: auth.profile,
        });
        self.connect_socket();

        Ok(true)
    }

    /// Create an account and establish a session.
    pub async fn signup(&mut self, request: &SignupRequest) -> Result<Profile, ClientError> {
        let url = format!("{}/api/auth/signup", self.config.http_url);
        self.authenticate_via(&url, request).await
    }

    /// Log in and establish a session.
    pub async fn login(&mut self, request: &LoginRequest) -> Result<Profile, ClientError> {
        let url = format!("{}/api/auth/login", self.config.http_url);
        self.authenticate_via(&url, request).await
    }

    async fn authenticate_via<B: serde::Serialize>(
        &mut self,
        url: &str,
        body: &B,
    ) -> Result<Profile, ClientError> {
        self.state = AuthState::Authenticating;

        // Session operations take `&mut self`, so a logout can never
        // interleave with this await: "logout wins" holds by ordering.
        let result = self.post_auth(url, body).await;

        match result {
            Ok(auth) => {
                let token = auth
                    .token
                    .ok_or_else(|| ClientError::Auth("Server returned no token".to_string()))?;
                self.token_store.save(&token)?;

                tracing::info!(identity = %auth.identity, "Authenticated");

                let profile = auth.profile.clone();
                self.state = AuthState::Authenticated(Session {
                    identity: auth.identity,
                    token,
                    profile: auth.profile,
                });
                self.connect_socket();

                Ok(profile)
            }
            Err(e) => {
                self.state = AuthState::Unauthenticated;
                Err(e)
            }
        }
    }

    async fn post_auth<B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<AuthResponse, ClientError> {
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Surface the server's message when available, else a fallback
        let message = response
            .json::<ErrorEnvelope>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_else(|_| "Something went wrong".to_string());

        if status == StatusCode::BAD_REQUEST {
            Err(ClientError::Validation(message))
        } else {
            Err(ClientError::Auth(message))
        }
    }

    /// Tear down the session: server-side invalidation request, token
    /// discard, state reset, and unconditional socket teardown. Safe to call
    /// when already logged out.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        if let AuthState::Authenticated(session) = &self.state {
            let url = format!("{}/api/auth/logout", self.config.http_url);
            // Local teardown proceeds even if the server is unreachable
            if let Err(e) = self.http.post(&url).bearer_auth(&session.token).send().await {
                tracing::warn!(error = %e, "Logout request failed, continuing local teardown");
            }
        }

        self.token_store.clear()?;
        self.state = AuthState::Unauthenticated;
        self.disconnect_socket().await;

        tracing::info!("Logged out");

        Ok(())
    }

    /// Update profile fields. Never changes authentication or connection
    /// state; failures are local to this call.
    pub async fn update_profile(
        &mut self,
        request: &UpdateProfileRequest,
    ) -> Result<Profile, ClientError> {
        let AuthState::Authenticated(session) = &self.state else {
            return Err(ClientError::Auth("Not authenticated".to_string()));
        };

        let url = format!("{}/api/auth/profile", self.config.http_url);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&session.token)
            .json(request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "Something went wrong".to_string());
            return if status == StatusCode::BAD_REQUEST {
                Err(ClientError::Validation(message))
            } else {
                Err(ClientError::Auth(message))
            };
        }

        let profile: Profile = response.json().await?;

        if let AuthState::Authenticated(session) = &mut self.state {
            session.profile = profile.clone();
        }

        Ok(profile)
    }

    /// Open the managed connection for the current session.
    ///
    /// No-op when unauthenticated or when a live socket task already exists;
    /// that guard keeps two calls in immediate succession from opening two
    /// underlying connections. A handle whose task has finished (requested
    /// close or a server-initiated close) counts as absent and is replaced
    /// with a fresh task.
    pub fn connect_socket(&mut self) {
        let AuthState::Authenticated(session) = &self.state else {
            return;
        };
        if let Some(handle) = &self.socket {
            if !handle.is_finished() {
                return;
            }
            self.socket = None;
        }

        let handle = socket::spawn(
            self.config.ws_url.clone(),
            session.token.clone(),
            self.config.reconnect_delay,
            self.config.connect_timeout,
            self.event_tx.clone(),
        );
        self.socket = Some(handle);
    }

    /// Close the managed connection if one is live. Idempotent: a second call
    /// finds no socket and does nothing.
    pub async fn disconnect_socket(&mut self) {
        if let Some(handle) = self.socket.take() {
            handle.disconnect().await;
        }
    }
}

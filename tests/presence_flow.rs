//! End-to-end session/presence tests: a real server on an ephemeral port,
//! driven by real session controllers over real sockets.

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use chat_presence_service::api::types::{LoginRequest, SignupRequest, UpdateProfileRequest};
use chat_presence_service::client::{
    AuthState, ClientConfig, ClientError, ConnectionState, DisconnectReason, SessionController,
    SocketEvent, TokenStore,
};
use chat_presence_service::config::{JwtConfig, ServerConfig, Settings, WebSocketConfig};
use chat_presence_service::server::{create_app, AppState};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn test_settings() -> Settings {
    Settings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            issuer: None,
            token_ttl: 3600,
        },
        websocket: WebSocketConfig::default(),
    }
}

async fn start_server() -> (String, AppState) {
    start_server_with(test_settings()).await
}

async fn start_server_with(settings: Settings) -> (String, AppState) {
    let state = AppState::new(settings);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn test_client(addr: &str) -> (SessionController, mpsc::Receiver<SocketEvent>) {
    let token_path = std::env::temp_dir()
        .join(format!("presence-flow-{}", Uuid::new_v4()))
        .join("token");
    let config = ClientConfig::for_server(addr)
        .with_token_path(token_path)
        .with_reconnect_delay(Duration::from_millis(200));
    SessionController::new(config)
}

fn identity_of(controller: &SessionController) -> String {
    match controller.auth_state() {
        AuthState::Authenticated(session) => session.identity.clone(),
        other => panic!("expected authenticated state, got {:?}", other),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for socket event")
        .expect("event channel closed")
}

/// Consume events until a presence update matching `expected` arrives.
async fn wait_for_presence(rx: &mut mpsc::Receiver<SocketEvent>, expected: &[String]) {
    let mut expected: Vec<String> = expected.to_vec();
    expected.sort();
    loop {
        if let SocketEvent::PresenceUpdate(mut online) = next_event(rx).await {
            online.sort();
            if online == expected {
                return;
            }
        }
    }
}

/// Consume events until `Connected` arrives.
async fn wait_for_connected(rx: &mut mpsc::Receiver<SocketEvent>) {
    loop {
        if matches!(next_event(rx).await, SocketEvent::Connected) {
            return;
        }
    }
}

/// Consume events until a `Disconnected` with a transport error arrives.
async fn wait_for_transport_error(rx: &mut mpsc::Receiver<SocketEvent>) {
    loop {
        if let SocketEvent::Disconnected(reason) = next_event(rx).await {
            assert!(
                matches!(reason, DisconnectReason::Error(_)),
                "expected transport error, got {:?}",
                reason
            );
            return;
        }
    }
}

/// Poll until `condition` holds or the timeout elapses.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met before timeout"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn signup_connects_and_broadcasts_presence() {
    let (addr, state) = start_server().await;
    let (mut client, mut events) = test_client(&addr);

    client
        .signup(&SignupRequest {
            username: "alice".to_string(),
            password: "secret1".to_string(),
            display_name: "Alice".to_string(),
        })
        .await
        .unwrap();

    let identity = identity_of(&client);
    wait_for_connected(&mut events).await;
    wait_for_presence(&mut events, &[identity.clone()]).await;

    assert_eq!(state.registry.online_set(), vec![identity]);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn two_clients_logout_removes_record() {
    let (addr, state) = start_server().await;

    let (mut alice, mut alice_events) = test_client(&addr);
    alice
        .signup(&SignupRequest {
            username: "alice".to_string(),
            password: "secret1".to_string(),
            display_name: "Alice".to_string(),
        })
        .await
        .unwrap();
    let alice_id = identity_of(&alice);
    wait_for_presence(&mut alice_events, &[alice_id.clone()]).await;

    let (mut bob, mut bob_events) = test_client(&addr);
    bob.signup(&SignupRequest {
        username: "bob".to_string(),
        password: "secret2".to_string(),
        display_name: "Bob".to_string(),
    })
    .await
    .unwrap();
    let bob_id = identity_of(&bob);

    // Both sides observe [alice, bob]
    wait_for_presence(&mut bob_events, &[alice_id.clone(), bob_id.clone()]).await;
    wait_for_presence(&mut alice_events, &[alice_id.clone(), bob_id.clone()]).await;

    // Alice logs out: her record disappears and bob sees [bob]
    alice.logout().await.unwrap();

    assert!(matches!(alice.auth_state(), AuthState::Unauthenticated));
    assert_eq!(alice.connection_state(), ConnectionState::Disconnected);

    wait_for_presence(&mut bob_events, &[bob_id.clone()]).await;
    let registry = state.registry.clone();
    wait_until(move || registry.online_set() == vec![bob_id.clone()]).await;
}

#[tokio::test]
async fn check_session_with_invalid_token_clears_it() {
    let (addr, state) = start_server().await;

    // Plant a garbage token where the controller will look for it
    let token_path = std::env::temp_dir()
        .join(format!("presence-flow-{}", Uuid::new_v4()))
        .join("token");
    let store = TokenStore::new(token_path.clone());
    store.save("not-a-valid-token").unwrap();

    let config = ClientConfig::for_server(&addr).with_token_path(token_path);
    let (mut client, _events) = SessionController::new(config);
    assert!(client.is_checking_auth());

    let restored = client.check_session().await.unwrap();

    assert!(!restored);
    assert!(!client.is_checking_auth());
    assert!(matches!(client.auth_state(), AuthState::Unauthenticated));
    // Token was discarded and no connection was attempted
    assert_eq!(store.load().unwrap(), None);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(state.registry.online_set().is_empty());
}

#[tokio::test]
async fn check_session_restores_persisted_session() {
    let (addr, _state) = start_server().await;
    let token_path = std::env::temp_dir()
        .join(format!("presence-flow-{}", Uuid::new_v4()))
        .join("token");

    let config = ClientConfig::for_server(&addr)
        .with_token_path(token_path.clone())
        .with_reconnect_delay(Duration::from_millis(200));
    let (mut client, mut events) = SessionController::new(config);
    client
        .signup(&SignupRequest {
            username: "carol".to_string(),
            password: "secret3".to_string(),
            display_name: "Carol".to_string(),
        })
        .await
        .unwrap();
    let identity = identity_of(&client);
    wait_for_presence(&mut events, &[identity.clone()]).await;
    client.disconnect_socket().await;

    // A fresh controller with the same token file restores the session and
    // re-establishes the connection without new credentials
    let config = ClientConfig::for_server(&addr)
        .with_token_path(token_path)
        .with_reconnect_delay(Duration::from_millis(200));
    let (mut restored, mut restored_events) = SessionController::new(config);

    assert!(restored.check_session().await.unwrap());
    assert!(!restored.is_checking_auth());
    assert_eq!(identity_of(&restored), identity);

    wait_for_connected(&mut restored_events).await;
    wait_for_presence(&mut restored_events, &[identity]).await;
}

#[tokio::test]
async fn failed_login_surfaces_error_and_stays_disconnected() {
    let (addr, state) = start_server().await;
    let (mut client, _events) = test_client(&addr);

    let err = client
        .login(&LoginRequest {
            username: "nobody".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Auth(_)));
    assert!(matches!(client.auth_state(), AuthState::Unauthenticated));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(state.registry.online_set().is_empty());
}

#[tokio::test]
async fn duplicate_signup_is_validation_error() {
    let (addr, _state) = start_server().await;

    let (mut first, mut first_events) = test_client(&addr);
    first
        .signup(&SignupRequest {
            username: "dave".to_string(),
            password: "secret4".to_string(),
            display_name: "Dave".to_string(),
        })
        .await
        .unwrap();
    wait_for_connected(&mut first_events).await;

    let (mut second, _events) = test_client(&addr);
    let err = second
        .signup(&SignupRequest {
            username: "dave".to_string(),
            password: "secret5".to_string(),
            display_name: "Dave 2".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(second.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_socket_is_idempotent() {
    let (addr, state) = start_server().await;
    let (mut client, mut events) = test_client(&addr);

    client
        .signup(&SignupRequest {
            username: "erin".to_string(),
            password: "secret6".to_string(),
            display_name: "Erin".to_string(),
        })
        .await
        .unwrap();
    let identity = identity_of(&client);
    wait_for_presence(&mut events, &[identity]).await;

    client.disconnect_socket().await;
    client.disconnect_socket().await;

    // One requested disconnect observed, then nothing further
    loop {
        match next_event(&mut events).await {
            SocketEvent::Disconnected(DisconnectReason::Requested) => break,
            SocketEvent::PresenceUpdate(_) => continue,
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let registry = state.registry.clone();
    wait_until(move || registry.online_set().is_empty()).await;

    // Still authenticated: losing the socket is not losing the identity
    assert!(client.auth_state().is_authenticated());
}

#[tokio::test]
async fn connect_socket_twice_keeps_single_connection() {
    let (addr, state) = start_server().await;
    let (mut client, mut events) = test_client(&addr);

    client
        .signup(&SignupRequest {
            username: "frank".to_string(),
            password: "secret7".to_string(),
            display_name: "Frank".to_string(),
        })
        .await
        .unwrap();
    let identity = identity_of(&client);
    wait_for_presence(&mut events, &[identity.clone()]).await;

    // Guard: a second call while connected must not open another socket
    client.connect_socket();
    client.connect_socket();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.registry.online_set(), vec![identity]);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    // No reconnect churn observed
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn connect_socket_reopens_after_server_close() {
    let (addr, state) = start_server().await;
    let (mut client, mut events) = test_client(&addr);

    client
        .signup(&SignupRequest {
            username: "ivan".to_string(),
            password: "secret10".to_string(),
            display_name: "Ivan".to_string(),
        })
        .await
        .unwrap();
    let identity = identity_of(&client);
    wait_for_connected(&mut events).await;
    wait_for_presence(&mut events, &[identity.clone()]).await;

    // A second connection with the same token replaces this one server-side,
    // so the managed socket ends with a server-initiated close
    let token = match client.auth_state() {
        AuthState::Authenticated(session) => session.token.clone(),
        other => panic!("expected authenticated state, got {:?}", other),
    };
    let replacement_url = format!("ws://{}/ws?token={}", addr, token);
    let (replacement, _) = tokio_tungstenite::connect_async(&replacement_url)
        .await
        .unwrap();

    loop {
        if let SocketEvent::Disconnected(reason) = next_event(&mut events).await {
            assert_eq!(reason, DisconnectReason::ServerClosed);
            break;
        }
    }

    // The finished handle counts as absent: this call must open a new
    // connection, not silently no-op while the session is still authenticated
    assert!(client.auth_state().is_authenticated());
    client.connect_socket();

    wait_for_connected(&mut events).await;
    wait_for_presence(&mut events, &[identity.clone()]).await;
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    drop(replacement);
    let registry = state.registry.clone();
    wait_until(move || registry.online_set() == vec![identity.clone()]).await;
}

#[tokio::test]
async fn cors_reflects_configured_origins() {
    let mut settings = test_settings();
    settings.server.cors_origins = vec!["http://allowed.example".to_string()];
    let (addr, _state) = start_server_with(settings).await;

    let http = reqwest::Client::new();

    let allowed = http
        .get(format!("http://{}/health", addr))
        .header("Origin", "http://allowed.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://allowed.example")
    );

    let denied = http
        .get(format!("http://{}/health", addr))
        .header("Origin", "http://other.example")
        .send()
        .await
        .unwrap();
    assert!(denied
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}

#[tokio::test]
async fn update_profile_leaves_connection_alone() {
    let (addr, _state) = start_server().await;
    let (mut client, mut events) = test_client(&addr);

    client
        .signup(&SignupRequest {
            username: "grace".to_string(),
            password: "secret8".to_string(),
            display_name: "Grace".to_string(),
        })
        .await
        .unwrap();
    let identity = identity_of(&client);
    wait_for_presence(&mut events, &[identity]).await;

    let profile = client
        .update_profile(&UpdateProfileRequest {
            display_name: Some("Grace H".to_string()),
            avatar_url: None,
        })
        .await
        .unwrap();

    assert_eq!(profile.display_name, "Grace H");
    assert!(client.auth_state().is_authenticated());
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn transport_error_schedules_reconnect() {
    // Reserve a port so the server can be restarted on the same address
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = reserved.local_addr().unwrap().to_string();
    drop(reserved);

    // First server instance runs on its own runtime so it can be torn down
    // hard, dropping established sockets mid-connection
    let server_rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    {
        let addr = addr.clone();
        server_rt.spawn(async move {
            let state = AppState::new(test_settings());
            let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
            axum::serve(listener, create_app(state)).await.unwrap();
        });
    }

    // Wait for the first instance to accept connections
    wait_until(|| std::net::TcpStream::connect(&addr).is_ok()).await;

    let (mut client, mut events) = test_client(&addr);
    client
        .signup(&SignupRequest {
            username: "heidi".to_string(),
            password: "secret9".to_string(),
            display_name: "Heidi".to_string(),
        })
        .await
        .unwrap();
    let identity = identity_of(&client);
    wait_for_connected(&mut events).await;
    wait_for_presence(&mut events, &[identity.clone()]).await;

    // Kill the server runtime: the client sees a transport error, not a close
    tokio::task::spawn_blocking(move || drop(server_rt))
        .await
        .unwrap();
    wait_for_transport_error(&mut events).await;

    // Identity survives connectivity loss
    assert!(client.auth_state().is_authenticated());

    // Restart on the same address with the same JWT secret; the reconnect
    // loop re-registers and a fresh broadcast arrives
    let state = AppState::new(test_settings());
    let registry = state.registry.clone();
    let app = create_app(state);
    let listener = loop {
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => break l,
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    };
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    wait_for_connected(&mut events).await;
    wait_for_presence(&mut events, &[identity.clone()]).await;
    wait_until(move || registry.online_set() == vec![identity.clone()]).await;
}

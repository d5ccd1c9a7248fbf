//! Headless presence watcher: signs up or logs in against a running server,
//! then prints presence updates as they arrive.
//!
//! Usage:
//!   presence-cli <host:port> signup <username> <password> [display-name]
//!   presence-cli <host:port> login <username> <password>

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chat_presence_service::api::types::{LoginRequest, SignupRequest};
use chat_presence_service::client::{ClientConfig, SessionController, SocketEvent};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [addr, command, rest @ ..] = args.as_slice() else {
        bail!("usage: presence-cli <host:port> <signup|login> <username> <password> [display-name]");
    };

    let config = ClientConfig::for_server(addr);
    let (mut controller, mut events) = SessionController::new(config);

    // Try the persisted token first; fall back to the requested operation
    let restored = controller
        .check_session()
        .await
        .context("session check failed")?;

    if !restored {
        match (command.as_str(), rest) {
            ("signup", [username, password, display @ ..]) => {
                let profile = controller
                    .signup(&SignupRequest {
                        username: username.clone(),
                        password: password.clone(),
                        display_name: display.first().cloned().unwrap_or_default(),
                    })
                    .await?;
                println!("Signed up as {}", profile.display_name);
            }
            ("login", [username, password]) => {
                let profile = controller
                    .login(&LoginRequest {
                        username: username.clone(),
                        password: password.clone(),
                    })
                    .await?;
                println!("Logged in as {}", profile.display_name);
            }
            _ => bail!("usage: presence-cli <host:port> <signup|login> <username> <password> [display-name]"),
        }
    }

    println!("Watching presence (Ctrl+C to exit)");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SocketEvent::Connected) => println!("* connected"),
                Some(SocketEvent::Disconnected(reason)) => println!("* disconnected: {:?}", reason),
                Some(SocketEvent::PresenceUpdate(online)) => {
                    println!("online ({}): {}", online.len(), online.join(", "));
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Logging out");
                controller.logout().await?;
                break;
            }
        }
    }

    Ok(())
}

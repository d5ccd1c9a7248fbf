// Infrastructure
pub mod config;
pub mod error;

// Domain
pub mod auth;
pub mod presence;
pub mod users;

// Application
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;

// Client side (session controller + socket loop)
pub mod client;

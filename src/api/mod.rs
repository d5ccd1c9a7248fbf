mod auth;
mod health;
mod routes;
pub mod types;

pub use routes::api_routes;

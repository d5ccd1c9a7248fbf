mod claims;
mod jwt;
pub mod password;

pub use claims::Claims;
pub use jwt::JwtKeys;

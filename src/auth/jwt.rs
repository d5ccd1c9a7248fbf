use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::Claims;

/// Issues and validates the credential tokens handed out at signup/login
/// and presented again at session check and WebSocket connect.
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    token_ttl: i64,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            token_ttl: config.token_ttl,
        }
    }

    pub fn issue(&self, identity: &str) -> Result<String, AppError> {
        let claims = Claims::new(identity, self.token_ttl).with_issuer(self.issuer.clone());
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to issue token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}

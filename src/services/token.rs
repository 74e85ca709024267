//! JWT access and refresh tokens
//!
//! Tokens are HS256-signed. Both kinds carry the same claims and differ in
//! `type` and lifetime; each is rejected where the other is expected.

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{User, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64> {
        self.sub
            .parse()
            .map_err(|e| anyhow!("Invalid user id in claims: {e}"))
    }
}

/// Issued pair returned by login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_minutes: i64,
    refresh_days: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_minutes: config.access_token_minutes,
            refresh_days: config.refresh_token_days,
        }
    }

    fn issue(&self, user: &User, token_type: TokenType, lifetime: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            token_type,
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode token: {e}"))
    }

    pub fn access_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Access, Duration::minutes(self.access_minutes))
    }

    pub fn refresh_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Refresh, Duration::days(self.refresh_days))
    }

    pub fn token_pair(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.access_token(user)?,
            refresh: self.refresh_token(user)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_lifetime_secs(),
        })
    }

    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_minutes * 60
    }

    /// Decode and check signature, expiry and token type
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Invalid token: {e}"))?;

        if data.claims.token_type != expected {
            return Err(anyhow!("Wrong token type"));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig::default())
    }

    fn user() -> User {
        let mut user = User::new(
            "ada@example.com".to_string(),
            "Ada".to_string(),
            "L".to_string(),
            String::new(),
            UserRole::Teacher,
        );
        user.id = 42;
        user
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service();
        let token = service.access_token(&user()).unwrap();
        let claims = service.verify(&token, TokenType::Access).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, UserRole::Teacher);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let service = service();
        let pair = service.token_pair(&user()).unwrap();

        assert!(service.verify(&pair.refresh, TokenType::Access).is_err());
        assert!(service.verify(&pair.access, TokenType::Refresh).is_err());
        assert!(service.verify(&pair.refresh, TokenType::Refresh).is_ok());
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);
    }

    #[test]
    fn test_rejects_foreign_signature_and_expired_tokens() {
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret".to_string(),
            ..AuthConfig::default()
        });
        let token = other.access_token(&user()).unwrap();
        assert!(service().verify(&token, TokenType::Access).is_err());

        let expired = TokenService::new(&AuthConfig {
            access_token_minutes: -5,
            ..AuthConfig::default()
        });
        let token = expired.access_token(&user()).unwrap();
        assert!(expired.verify(&token, TokenType::Access).is_err());
        assert!(service().verify("not.a.jwt", TokenType::Access).is_err());
    }
}

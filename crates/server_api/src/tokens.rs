use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{domain::UserId, protocol::AuthTokens};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub kind: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok().map(UserId)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("expected {expected:?} token, got {actual:?}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },
}

pub fn mint_token(
    cfg: &AuthConfig,
    user_id: UserId,
    email: &str,
    kind: TokenKind,
) -> Result<String, jsonwebtoken::errors::Error> {
    let ttl = match kind {
        TokenKind::Access => cfg.access_ttl_seconds,
        TokenKind::Refresh => cfg.refresh_ttl_seconds,
    };
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.0.to_string(),
        email: email.to_string(),
        kind,
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
}

pub fn issue_tokens(
    cfg: &AuthConfig,
    user_id: UserId,
    email: &str,
) -> Result<AuthTokens, jsonwebtoken::errors::Error> {
    Ok(AuthTokens {
        access_token: mint_token(cfg, user_id, email, TokenKind::Access)?,
        refresh_token: mint_token(cfg, user_id, email, TokenKind::Refresh)?,
    })
}

pub fn verify_token(
    cfg: &AuthConfig,
    token: &str,
    expected: TokenKind,
) -> Result<Claims, TokenError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )?;
    if data.claims.kind != expected {
        return Err(TokenError::WrongKind {
            expected,
            actual: data.claims.kind,
        });
    }
    Ok(data.claims)
}

#[cfg(test)]
#[path = "tests/tokens_tests.rs"]
mod tests;

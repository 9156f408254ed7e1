use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::{Principal, UserId};
use thiserror::Error;

use crate::ChatError;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("token lifetime out of range")]
    LifetimeOutOfRange,
    #[error(transparent)]
    Encode(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id, as a decimal string.
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Verifies HS256 bearer tokens issued by the identity provider.
#[derive(Clone)]
pub struct JwtIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Principal, ChatError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| ChatError::Authentication(format!("invalid token: {e}")))?;
        let claims = data.claims;
        let account_id = claims
            .sub
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ChatError::Authentication("invalid token subject".into()))?;
        Ok(Principal {
            account_id: UserId(account_id),
            username: claims.username,
            firstname: claims.firstname,
            lastname: claims.lastname,
            is_admin: claims.is_admin,
        })
    }

    /// Verifies the value of an `Authorization` header.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<Principal, ChatError> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ChatError::Authentication("missing bearer token".into()))?;
        self.verify(token)
    }

    pub fn issue(
        &self,
        principal: &Principal,
        ttl: Duration,
    ) -> Result<String, IssueError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(ttl)
            .ok_or(IssueError::LifetimeOutOfRange)?;
        let claims = Claims {
            sub: principal.account_id.to_string(),
            username: principal.username.clone(),
            firstname: principal.firstname.clone(),
            lastname: principal.lastname.clone(),
            is_admin: principal.is_admin,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Claims carried by a session bearer token. Issuance is out of scope for the
/// delivery core (an external auth service mints these); the core only validates
/// them at socket admission. `mint` exists so tests and local bootstrap have a
/// real token to present.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(user_id: &str, lifespan_hours: i64) -> Self {
        let now = chrono::Utc::now();
        SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(lifespan_hours)).timestamp(),
        }
    }
}

pub fn mint(user_id: &str, secret: &str, lifespan_hours: i64) -> Result<String, AppError> {
    let claims = SessionClaims::new(user_id, lifespan_hours);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Fatal(e.to_string()))
}

/// Decodes a signed session token into a user id. This is the syntactic half of
/// admission; membership/role checks happen afterward against the authoritative store.
pub fn validate(token: &str, secret: &str) -> Result<String, AppError> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_validate_round_trip() {
        let token = mint("user-1", "secret", 1).unwrap();
        let user_id = validate(&token, "secret").unwrap();
        assert_eq!(user_id, "user-1");
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = mint("user-1", "secret", 1).unwrap();
        let err = validate(&token, "other-secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let token = mint("user-1", "secret", -1).unwrap();
        let err = validate(&token, "secret").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}

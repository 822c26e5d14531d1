use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lumina_model::User;

use crate::config::AuthConfig;
use crate::error::{CoreError, Result};

/// Access token claims. `sub` carries the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// HMAC-SHA-256 signed access tokens plus opaque refresh tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.len() < 32 {
            return Err(CoreError::Validation(
                "jwt secret must be at least 32 bytes".into(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: Duration::minutes(config.access_ttl_mins),
        })
    }

    /// Service keyed with fresh random bytes. Useful when no secret is
    /// configured; issued tokens do not survive a restart.
    pub fn ephemeral() -> Result<Self> {
        let mut secret = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| CoreError::Internal(format!("entropy source failed: {e}")))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
            issuer: "lumina".to_string(),
            audience: "lumina-clients".to_string(),
            access_ttl: Duration::minutes(30),
        })
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::Internal(format!("token signing failed: {e}")))
    }

    /// Validate signature, issuer, audience, and lifetime with zero clock
    /// skew.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| CoreError::Validation(format!("invalid access token: {e}")))
    }

    /// 32 random bytes from the OS entropy source, base64-encoded.
    pub fn new_refresh_token(&self) -> Result<String> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CoreError::Internal(format!("entropy source failed: {e}")))?;
        Ok(BASE64_STANDARD.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumina_model::UserRole;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            issuer: "lumina".into(),
            audience: "lumina-clients".into(),
            access_ttl_mins: 30,
            refresh_ttl_days: 30,
        })
        .unwrap()
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "reader".into(),
            email: "reader@example.com".into(),
            password_hash: String::new(),
            role: UserRole::User,
            is_active: true,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_validate() {
        let service = service();
        let user = user();
        let token = service.issue_access_token(&user).unwrap();
        let claims = service.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "reader");
        assert_eq!(claims.role, "user");
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let service = service();
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            issuer: "someone-else".into(),
            audience: "lumina-clients".into(),
            access_ttl_mins: 30,
            refresh_ttl_days: 30,
        })
        .unwrap();
        let token = other.issue_access_token(&user()).unwrap();
        assert!(service.validate_access_token(&token).is_err());
    }

    #[test]
    fn short_secrets_are_rejected() {
        assert!(TokenService::new(&AuthConfig {
            jwt_secret: "short".into(),
            ..AuthConfig::default()
        })
        .is_err());
    }

    #[test]
    fn refresh_tokens_decode_to_32_bytes() {
        let service = service();
        let token = service.new_refresh_token().unwrap();
        let bytes = BASE64_STANDARD.decode(token).unwrap();
        assert_eq!(bytes.len(), 32);
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Role;

/// Signs and verifies access and refresh tokens.
///
/// The two token classes use independent HMAC secrets so a token of one class
/// never verifies as the other.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub org_id: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub org_id: String,
    /// Refresh-token version this token was issued at
    pub ver: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Self {
        let access = config.access_secret.expose_secret().as_bytes();
        let refresh = config.refresh_secret.expose_secret().as_bytes();

        Self {
            access_encoding: EncodingKey::from_secret(access),
            access_decoding: DecodingKey::from_secret(access),
            refresh_encoding: EncodingKey::from_secret(refresh),
            refresh_decoding: DecodingKey::from_secret(refresh),
            access_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
        }
    }

    pub fn sign_access(
        &self,
        user_id: &str,
        org_id: &str,
        role: Role,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now().timestamp();
        self.encode_access(user_id, org_id, role, now)
    }

    pub fn sign_refresh(
        &self,
        user_id: &str,
        org_id: &str,
        version: i64,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now().timestamp();
        self.encode_refresh(user_id, org_id, version, now)
    }

    pub(crate) fn encode_access(
        &self,
        user_id: &str,
        org_id: &str,
        role: Role,
        issued_at: i64,
    ) -> Result<String, anyhow::Error> {
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            org_id: org_id.to_string(),
            role,
            iat: issued_at,
            exp: issued_at + self.access_ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    pub(crate) fn encode_refresh(
        &self,
        user_id: &str,
        org_id: &str,
        version: i64,
        issued_at: i64,
    ) -> Result<String, anyhow::Error> {
        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            org_id: org_id.to_string(),
            ver: version,
            iat: issued_at,
            exp: issued_at + self.refresh_ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    pub fn verify_access(
        &self,
        token: &str,
    ) -> Result<AccessTokenClaims, jsonwebtoken::errors::Error> {
        decode::<AccessTokenClaims>(token, &self.access_decoding, &validation())
            .map(|data| data.claims)
    }

    pub fn verify_refresh(
        &self,
        token: &str,
    ) -> Result<RefreshTokenClaims, jsonwebtoken::errors::Error> {
        decode::<RefreshTokenClaims>(token, &self.refresh_decoding, &validation())
            .map(|data| data.claims)
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn codec() -> TokenCodec {
        TokenCodec::new(&JwtConfig {
            access_secret: Secret::new("access-secret-for-unit-tests-0123456789".to_string()),
            refresh_secret: Secret::new("refresh-secret-for-unit-tests-0123456789".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        })
    }

    #[test]
    fn access_round_trip() {
        let codec = codec();
        let token = codec.sign_access("u1", "o1", Role::RiskAnalyst).unwrap();
        let claims = codec.verify_access(&token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.org_id, "o1");
        assert_eq!(claims.role, Role::RiskAnalyst);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn refresh_carries_version() {
        let codec = codec();
        let token = codec.sign_refresh("u1", "o1", 3).unwrap();
        let claims = codec.verify_refresh(&token).unwrap();

        assert_eq!(claims.ver, 3);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let codec = codec();
        let issued = Utc::now().timestamp() - 16 * 60;
        let token = codec
            .encode_access("u1", "o1", Role::Viewer, issued)
            .unwrap();

        assert!(codec.verify_access(&token).is_err());
    }

    #[test]
    fn expired_refresh_token_is_rejected() {
        let codec = codec();
        let issued = Utc::now().timestamp() - 8 * 24 * 60 * 60;
        let token = codec.encode_refresh("u1", "o1", 0, issued).unwrap();

        assert!(codec.verify_refresh(&token).is_err());
    }

    #[test]
    fn token_classes_do_not_cross_verify() {
        let codec = codec();
        let access = codec.sign_access("u1", "o1", Role::OrgAdmin).unwrap();
        let refresh = codec.sign_refresh("u1", "o1", 0).unwrap();

        assert!(codec.verify_refresh(&access).is_err());
        assert!(codec.verify_access(&refresh).is_err());
    }

    #[test]
    fn tokens_signed_in_same_second_differ() {
        let codec = codec();
        let a = codec.sign_refresh("u1", "o1", 1).unwrap();
        let b = codec.sign_refresh("u1", "o1", 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = codec();
        let viewer = codec.sign_access("u1", "o1", Role::Viewer).unwrap();
        let admin = codec.sign_access("u1", "o1", Role::OrgAdmin).unwrap();

        // admin claims with the viewer token's signature
        let admin_parts: Vec<&str> = admin.split('.').collect();
        let viewer_sig = viewer.rsplit('.').next().unwrap();
        let forged = format!("{}.{}.{}", admin_parts[0], admin_parts[1], viewer_sig);

        assert!(codec.verify_access(&forged).is_err());
    }
}

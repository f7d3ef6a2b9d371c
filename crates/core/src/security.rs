//! Token signing and password hashing.

use crate::config::JwtConfig;
use crate::error::{Error, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by the compact access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiry: Duration::hours(config.expiry_hours),
        }
    }

    pub fn sign(&self, user_id: i64, role: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            role: role.to_string(),
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal("Failed to sign token").with_details(e.to_string()))
    }

    /// Verifies signature and expiry. Failures map to 403 per the
    /// authentication contract (absence of a token is the 401 case and is
    /// handled before verification).
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| Error::forbidden("Invalid or expired token"))?;

        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::internal("Failed to hash password").with_details(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret-42".to_string(),
            expiry_hours: 24,
        })
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let jwt = service();
        let token = jwt.sign(7, "supervisor").unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.role, "supervisor");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let jwt = service();
        let token = jwt.sign(7, "user").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        let err = jwt.verify(&tampered).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let jwt = service();
        let other = JwtService::new(&JwtConfig {
            secret: "another-secret-another-secret-another-1".to_string(),
            expiry_hours: 24,
        });
        let token = other.sign(1, "admin").unwrap();
        assert!(jwt.verify(&token).is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret-pw").unwrap();
        assert!(verify_password("s3cret-pw", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}

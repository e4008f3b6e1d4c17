//! Session token issuance and validation (§4.6 step 5).

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use nestwatch_protocol::config::JwtConfig;
use nestwatch_protocol::types::{NestId, UserId, UserRole};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Access-token claims: `{userId, nestId, role, iat, exp}` per §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "nestId")]
    pub nest_id: NestId,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// An issued session: a signed short-lived access token plus an opaque
/// long-lived refresh token the caller persists server-side.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: i64,
}

pub struct TokenIssuer {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: JwtConfig, signing_secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_secret),
            decoding_key: DecodingKey::from_secret(signing_secret),
            config,
        }
    }

    pub fn issue_session(&self, user_id: &str, nest_id: &str, role: UserRole) -> Result<Session> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            nest_id: nest_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: now.timestamp() + self.config.access_ttl_secs,
            iss: self.config.issuer.clone(),
        };
        let access_token = encode(&Header::default(), &claims, &self.encoding_key)?;
        let refresh_token = generate_opaque_token();

        Ok(Session {
            access_token,
            refresh_token,
            expires_in_secs: self.config.access_ttl_secs,
        })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[self.config.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

/// 256 bits of randomness, hex-encoded — the refresh token is opaque by
/// design; the server is the only party that needs to recognize it.
fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(JwtConfig::default(), b"test-signing-secret")
    }

    #[test]
    fn issued_token_validates_with_expected_claims() {
        let issuer = issuer();
        let session = issuer
            .issue_session("u1", "n1", UserRole::Admin)
            .unwrap();
        let claims = issuer.validate_access_token(&session.access_token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.nest_id, "n1");
    }

    #[test]
    fn tampered_token_fails_validation() {
        let issuer = issuer();
        let session = issuer
            .issue_session("u1", "n1", UserRole::Viewer)
            .unwrap();
        let mut tampered = session.access_token.clone();
        tampered.push('x');
        assert!(issuer.validate_access_token(&tampered).is_err());
    }

    #[test]
    fn refresh_tokens_are_unique_per_session() {
        let issuer = issuer();
        let a = issuer.issue_session("u1", "n1", UserRole::Owner).unwrap();
        let b = issuer.issue_session("u1", "n1", UserRole::Owner).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }
}

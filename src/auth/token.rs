//! Token codec: compact signed bearer tokens (JWT, HMAC family).
//!
//! A token carries `sub` (employee identity), `iat`, `exp` and a random
//! `jti` so two logins in the same second never produce the same string.
//! Verification is stateless; whether a token may actually be used is the
//! engine's call, which also requires a live session.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Missing in foreign tokens is possible, so it is optional on decode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(default)]
    iat: i64,
    exp: i64,
    #[serde(default)]
    jti: String,
}

/// Why a presented token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token carries no subject")]
    MissingSubject,
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A freshly signed token and its validity window.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Claims of a token whose signature and expiry checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
}

/// Signs and verifies tokens with one shared secret and one algorithm.
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: TimeDelta,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec. Only the HMAC algorithms are accepted since the
    /// deployment shares a single secret.
    pub fn new(algorithm: Algorithm, secret: &[u8], lifetime_secs: u64) -> Result<Self, TokenError> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(TokenError::InvalidKey(format!(
                "unsupported algorithm {algorithm:?} (expected HS256, HS384 or HS512)"
            )));
        }
        if secret.is_empty() {
            return Err(TokenError::InvalidKey("secret must be non-empty".to_string()));
        }
        let lifetime = i64::try_from(lifetime_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| TokenError::InvalidKey("token lifetime must be positive".to_string()))?;

        let mut validation = Validation::new(algorithm);
        // An expired token must never verify, not even within a grace window.
        validation.leeway = 0;
        validation.validate_exp = true;

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        })
    }

    pub fn lifetime(&self) -> TimeDelta {
        self.lifetime
    }

    /// Issue a token for `subject` valid from now for the configured lifetime.
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    /// Issue a token as if signed at `issued_at`.
    pub fn issue_at(&self, subject: &str, issued_at: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let issued_at = DateTime::from_timestamp(issued_at.timestamp(), 0).unwrap_or(issued_at);
        let expires_at = issued_at + self.lifetime;
        let claims = Claims {
            sub: Some(subject.to_string()),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    /// Check signature and expiry, then extract the subject.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(map_jwt_error)?;
        let subject = data
            .claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or(TokenError::MissingSubject)?;
        Ok(VerifiedToken { subject })
    }
}

/// Maps jsonwebtoken errors to our TokenError type.
fn map_jwt_error(error: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => TokenError::MissingSubject,
        _ => TokenError::Malformed,
    }
}

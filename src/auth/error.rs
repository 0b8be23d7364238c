//! Failure taxonomy for the authentication core.
//!
//! Every engine operation returns [`AuthError`]; the gateway maps each
//! variant to one stable status + message pair. Store adapters speak
//! [`StoreError`], which the engine folds into `AuthError`.

use super::token::TokenError;

/// Domain failure of an authentication operation.
///
/// `Display` is the caller-facing message. It never carries internal detail:
/// [`AuthError::Internal`] always renders as the generic message and keeps the
/// real cause in its `source()` for logging.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// An account with this email already exists.
    #[error("Email already in use")]
    DuplicateIdentity,
    /// Unknown email, wrong password, or a token payload without a subject.
    /// Deliberately a single variant so callers cannot enumerate accounts.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The presented token failed signature or format verification.
    #[error("Could not validate credentials")]
    Unverifiable(#[source] TokenError),
    /// Logout found no session for the (identity, token) pair.
    #[error("Invalid token")]
    InvalidToken,
    /// Identity resolution found no live session for the token.
    #[error("Invalid token or session expired")]
    SessionExpiredOrInvalid,
    /// Directory lookup found no account with this email.
    #[error("Employee not found")]
    NotFound,
    /// The request itself was malformed (empty fields, bad body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Unexpected store or crypto failure.
    #[error("Internal Server Error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    /// Map a token codec failure to the engine taxonomy.
    ///
    /// A verified token that names no subject is a credentials problem,
    /// everything else is a verification failure.
    pub fn from_token(error: TokenError) -> Self {
        match error {
            TokenError::MissingSubject => Self::InvalidCredentials,
            other => Self::Unverifiable(other),
        }
    }

    /// Stable machine-readable name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity => "duplicate_identity",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unverifiable(_) => "invalid_token",
            Self::InvalidToken => "invalid_token",
            Self::SessionExpiredOrInvalid => "session_expired_or_invalid",
            Self::NotFound => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation => Self::DuplicateIdentity,
            StoreError::Backend(inner) => Self::Internal(inner),
        }
    }
}

/// Failure reported by a credential or session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint (email, primary key) rejected the write.
    #[error("uniqueness constraint violated")]
    UniqueViolation,
    /// Any other backend failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Self::UniqueViolation
            }
            other => Self::Backend(other.into()),
        }
    }
}

//! Employee authentication core.
//!
//! Provides:
//! - Employee signup with email uniqueness enforced by the store
//! - Login issuing signed bearer tokens (JWT, HMAC) backed by a server-side session
//! - Logout by deleting the session, which revokes the token before its expiry
//! - Identity resolution from a token with a live session
//! - Email → employee id directory lookup
//!
//! ## Design Decisions
//! - Tokens are self-describing and verified statelessly, but a token is only
//!   honoured while its session row exists. Session rows hold the SHA-256 of
//!   the token, never the token itself.
//! - Password hashing uses PBKDF2-HMAC-SHA256 + per-account salt.
//! - Wrong password and unknown email produce the same error.

pub mod engine;
pub mod error;
pub mod password;
pub mod store;
pub mod token;

pub use engine::{AuthEngine, LoginOutcome, SignupRequest};
pub use error::{AuthError, StoreError};
pub use password::{PasswordHasher, Pbkdf2Hasher};
pub use store::{Account, AccountRecord, CredentialStore, Session, SessionStore, SqliteStore};
pub use token::{TokenCodec, TokenError};

//! Authentication engine: signup, login, logout and identity resolution.
//!
//! A token is usable only while its signature verifies, its encoded expiry
//! has not passed, and a session for the exact (employee_id, token) pair
//! still exists. Logout deletes that session, so a revoked token stops
//! resolving even though its signature stays valid until expiry.

use super::error::AuthError;
use super::password::PasswordHasher;
use super::store::{Account, AccountRecord, CredentialStore, Session, SessionStore};
use super::token::TokenCodec;
use chrono::Utc;
use std::sync::Arc;

/// Input to [`AuthEngine::signup`].
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Successful login: the display name and the bearer token.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub name: String,
    pub token: String,
}

/// Orchestrates the credential store, password hasher, token codec and
/// session store.
pub struct AuthEngine {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: TokenCodec,
}

impl AuthEngine {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: TokenCodec,
    ) -> Self {
        Self {
            credentials,
            sessions,
            hasher,
            codec,
        }
    }

    /// Register a new employee. Writes the account first, then its record.
    ///
    /// The email pre-check is only a fast path; the store's unique index is
    /// what actually settles concurrent signups for the same email.
    pub async fn signup(&self, request: SignupRequest) -> Result<(), AuthError> {
        validate_signup(&request)?;

        let existing = self
            .credentials
            .find_by_email(&request.email)
            .await
            .map_err(|e| internal("signup lookup", &request.email, e.into()))?;
        if existing.is_some() {
            tracing::warn!(email = %request.email, "Signup attempt with existing email");
            return Err(AuthError::DuplicateIdentity);
        }

        let employee_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let account = Account {
            employee_id: employee_id.clone(),
            name: request.name,
            email: request.email,
            password_hash: self.hasher.hash(&request.password),
            created_at: now,
        };

        match self.credentials.insert_account(&account).await.map_err(AuthError::from) {
            Ok(()) => {}
            Err(AuthError::DuplicateIdentity) => {
                tracing::warn!(email = %account.email, "Signup lost race on existing email");
                return Err(AuthError::DuplicateIdentity);
            }
            Err(AuthError::Internal(e)) => return Err(internal("account write", &account.email, e)),
            Err(other) => return Err(other),
        }
        tracing::info!(employee_id = %employee_id, email = %account.email, "New employee created");

        let record = AccountRecord {
            employee_id: employee_id.clone(),
            role: request.role,
            start_date: now,
        };
        // The account stays in place if this fails; it is reported, not rolled back.
        if let Err(e) = self.credentials.insert_record(&record).await {
            tracing::error!(
                employee_id = %employee_id,
                email = %account.email,
                "Employee record write failed after account write: {e}"
            );
            return Err(AuthError::Internal(anyhow::Error::new(e).context("employee record write")));
        }
        tracing::info!(employee_id = %employee_id, "Record created for employee");

        Ok(())
    }

    /// Check credentials and open a new session. Earlier sessions stay valid.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let account = self
            .credentials
            .find_by_email(email)
            .await
            .map_err(|e| internal("login lookup", email, e.into()))?;

        let account = match account {
            Some(account) if self.hasher.verify(password, &account.password_hash) => account,
            Some(_) => {
                tracing::warn!(email = %email, "Failed login attempt");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                self.hasher.dummy_verify(password);
                tracing::warn!(email = %email, "Failed login attempt");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let issued = self
            .codec
            .issue(&account.employee_id)
            .map_err(|e| internal("token issue", email, e.into()))?;
        let session = Session::new(
            &account.employee_id,
            &issued.token,
            issued.issued_at,
            issued.expires_at,
        );
        self.sessions
            .insert_session(&session)
            .await
            .map_err(|e| internal("session write", email, e.into()))?;

        tracing::info!(employee_id = %account.employee_id, "Employee logged in");
        Ok(LoginOutcome {
            name: account.name,
            token: issued.token,
        })
    }

    /// Revoke the session bound to `token`.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let employee_id = self.verify_subject(token, "logout")?;

        let deleted = self
            .sessions
            .delete_session(&employee_id, token)
            .await
            .map_err(|e| internal("session delete", &employee_id, e.into()))?;
        if !deleted {
            tracing::warn!(employee_id = %employee_id, "Logout attempt with invalid token");
            return Err(AuthError::InvalidToken);
        }

        tracing::info!(employee_id = %employee_id, "Employee logged out");
        Ok(())
    }

    /// Resolve the caller's employee id from a token with a live session.
    pub async fn resolve(&self, token: &str) -> Result<String, AuthError> {
        let employee_id = self.verify_subject(token, "resolve")?;

        let session = self
            .sessions
            .find_session(&employee_id, token, Utc::now())
            .await
            .map_err(|e| internal("session lookup", &employee_id, e.into()))?;
        if session.is_none() {
            tracing::warn!(employee_id = %employee_id, "Invalid or expired token");
            return Err(AuthError::SessionExpiredOrInvalid);
        }

        tracing::debug!(employee_id = %employee_id, "Employee ID resolved");
        Ok(employee_id)
    }

    /// Directory lookup: employee id for an email. No authentication.
    pub async fn employee_id_by_email(&self, email: &str) -> Result<String, AuthError> {
        let account = self
            .credentials
            .find_by_email(email)
            .await
            .map_err(|e| internal("directory lookup", email, e.into()))?;
        match account {
            Some(account) => {
                tracing::debug!(employee_id = %account.employee_id, email = %email, "Employee ID found by email");
                Ok(account.employee_id)
            }
            None => {
                tracing::warn!(email = %email, "Employee not found");
                Err(AuthError::NotFound)
            }
        }
    }

    /// Delete expired sessions. Returns how many were removed.
    pub async fn sweep_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions
            .purge_expired(Utc::now())
            .await
            .map_err(|e| internal("session sweep", "-", e.into()))
    }

    fn verify_subject(&self, token: &str, operation: &str) -> Result<String, AuthError> {
        self.codec.verify(token).map(|v| v.subject).map_err(|e| {
            tracing::warn!(operation, "Token verification failed: {e}");
            AuthError::from_token(e)
        })
    }
}

fn validate_signup(request: &SignupRequest) -> Result<(), AuthError> {
    let fields = [
        ("name", &request.name),
        ("email", &request.email),
        ("password", &request.password),
        ("role", &request.role),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(AuthError::InvalidRequest(format!("{field} must not be empty")));
        }
    }
    Ok(())
}

fn internal(stage: &str, subject: &str, error: anyhow::Error) -> AuthError {
    tracing::error!(subject = %subject, "Error during {stage}: {error:#}");
    AuthError::Internal(error.context(stage.to_string()))
}

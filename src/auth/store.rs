//! Credential and session persistence.
//!
//! The engine only sees the [`CredentialStore`] and [`SessionStore`] traits.
//! [`SqliteStore`] implements both over one SQLite database.
//!
//! Tables:
//! - `employees`: employee_id, name, email (UNIQUE), password_hash, created_at
//! - `employee_records`: employee_id, role, start_date
//! - `sessions`: (employee_id, token_hash), created_at, expires_at
//!
//! Timestamps are stored as whole Unix seconds, the same resolution as a
//! token's `exp`. Sub-second precision is dropped on write, so a value read
//! back equals the written one truncated to the second.

use super::error::StoreError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A registered employee account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub employee_id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Enrollment metadata written alongside an account at signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub employee_id: String,
    pub role: String,
    pub start_date: DateTime<Utc>,
}

/// A live login. The token itself is only kept as its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub employee_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        employee_id: &str,
        token: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            token_hash: hash_token(token),
            created_at,
            expires_at,
        }
    }
}

/// Account persistence. Email must be unique at the store level.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert an account. A duplicate email yields `StoreError::UniqueViolation`.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn insert_record(&self, record: &AccountRecord) -> Result<(), StoreError>;

    async fn find_record(&self, employee_id: &str) -> Result<Option<AccountRecord>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, employee_id: &str) -> Result<Option<Account>, StoreError>;
}

/// Session persistence keyed by (employee_id, token).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Find the session for exactly this (employee_id, token) pair that is
    /// still unexpired at `now`.
    async fn find_session(
        &self,
        employee_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Delete the session for exactly this pair. Returns whether a row went away.
    async fn delete_session(&self, employee_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Remove every session that expired at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// SQLite-backed credential and session store.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for tests).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(rusqlite::Connection::open_in_memory()?)
    }

    fn from_connection(conn: rusqlite::Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS employees (
                employee_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS employee_records (
                employee_id TEXT PRIMARY KEY REFERENCES employees(employee_id),
                role TEXT NOT NULL,
                start_date INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                employee_id TEXT NOT NULL REFERENCES employees(employee_id),
                token_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (employee_id, token_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);",
        )
        .context("failed to initialize schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Count registered accounts.
    pub fn account_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Count stored session rows, expired or not.
    pub fn session_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn find_account(&self, column: &str, value: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT employee_id, name, email, password_hash, created_at
             FROM employees WHERE {column} = ?1"
        );
        let row = conn.query_row(&sql, rusqlite::params![value], |row| {
            Ok(Account {
                employee_id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                created_at: epoch_column(row, 4)?,
            })
        });

        match row {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO employees (employee_id, name, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                account.employee_id,
                account.name,
                account.email,
                account.password_hash,
                account.created_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn insert_record(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO employee_records (employee_id, role, start_date) VALUES (?1, ?2, ?3)",
            rusqlite::params![record.employee_id, record.role, record.start_date.timestamp()],
        )?;
        Ok(())
    }

    async fn find_record(&self, employee_id: &str) -> Result<Option<AccountRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT employee_id, role, start_date FROM employee_records WHERE employee_id = ?1",
            rusqlite::params![employee_id],
            |row| {
                Ok(AccountRecord {
                    employee_id: row.get(0)?,
                    role: row.get(1)?,
                    start_date: epoch_column(row, 2)?,
                })
            },
        );

        match row {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.find_account("email", email)
    }

    async fn find_by_id(&self, employee_id: &str) -> Result<Option<Account>, StoreError> {
        self.find_account("employee_id", employee_id)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (employee_id, token_hash, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                session.employee_id,
                session.token_hash,
                session.created_at.timestamp(),
                session.expires_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    async fn find_session(
        &self,
        employee_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let token_hash = hash_token(token);
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT employee_id, token_hash, created_at, expires_at
             FROM sessions
             WHERE employee_id = ?1 AND token_hash = ?2 AND expires_at > ?3",
            rusqlite::params![employee_id, token_hash, now.timestamp()],
            |row| {
                Ok(Session {
                    employee_id: row.get(0)?,
                    token_hash: row.get(1)?,
                    created_at: epoch_column(row, 2)?,
                    expires_at: epoch_column(row, 3)?,
                })
            },
        );

        match row {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_session(&self, employee_id: &str, token: &str) -> Result<bool, StoreError> {
        let token_hash = hash_token(token);
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE employee_id = ?1 AND token_hash = ?2",
            rusqlite::params![employee_id, token_hash],
        )?;
        Ok(deleted > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            rusqlite::params![now.timestamp()],
        )?;
        Ok(deleted as u64)
    }
}

/// Hash a session token (SHA-256, single pass — tokens are already high-entropy).
pub fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

/// Read a Unix-seconds column. Values outside chrono's range are a read error.
fn epoch_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("auth.db");
        let store = SqliteStore::open(&db_path).unwrap();
        (tmp, store)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    /// Current time truncated to the store's one-second resolution.
    fn now_secs() -> DateTime<Utc> {
        at(Utc::now().timestamp())
    }

    fn account(id: &str, email: &str) -> Account {
        Account {
            employee_id: id.to_string(),
            name: "Ann".to_string(),
            email: email.to_string(),
            password_hash: "salt$digest".to_string(),
            created_at: at(1_700_000_000),
        }
    }

    #[tokio::test]
    async fn insert_and_find_account() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "ann@x.com")).await.unwrap();

        let by_email = store.find_by_email("ann@x.com").await.unwrap().unwrap();
        assert_eq!(by_email, account("e1", "ann@x.com"));

        let by_id = store.find_by_id("e1").await.unwrap().unwrap();
        assert_eq!(by_id.email, "ann@x.com");

        assert!(store.find_by_email("nobody@x.com").await.unwrap().is_none());
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_unique_violation() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "ann@x.com")).await.unwrap();
        let err = store
            .insert_account(&account("e2", "ann@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));
        assert_eq!(store.account_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn email_match_is_case_sensitive() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "ann@x.com")).await.unwrap();
        assert!(store.find_by_email("ANN@x.com").await.unwrap().is_none());
        store.insert_account(&account("e2", "ANN@x.com")).await.unwrap();
        assert_eq!(store.account_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn record_requires_existing_account() {
        let (_tmp, store) = test_store();
        let record = AccountRecord {
            employee_id: "ghost".into(),
            role: "engineer".into(),
            start_date: Utc::now(),
        };
        assert!(store.insert_record(&record).await.is_err());

        store.insert_account(&account("ghost", "g@x.com")).await.unwrap();
        store.insert_record(&record).await.unwrap();
    }

    #[tokio::test]
    async fn session_lookup_requires_exact_pair() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        store.insert_account(&account("e2", "b@x.com")).await.unwrap();
        let now = now_secs();
        let session = Session::new("e1", "tok-1", now, now + TimeDelta::minutes(30));
        store.insert_session(&session).await.unwrap();

        let found = store.find_session("e1", "tok-1", now).await.unwrap();
        assert_eq!(found, Some(session));
        assert!(store.find_session("e2", "tok-1", now).await.unwrap().is_none());
        assert!(store.find_session("e1", "tok-2", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_round_trips() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        assert!(store.find_record("e1").await.unwrap().is_none());

        let record = AccountRecord {
            employee_id: "e1".into(),
            role: "engineer".into(),
            start_date: at(1_700_000_123),
        };
        store.insert_record(&record).await.unwrap();
        assert_eq!(store.find_record("e1").await.unwrap(), Some(record));
        assert!(store.find_record("e2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timestamps_are_truncated_to_seconds() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        let precise = at(1_700_000_000) + TimeDelta::milliseconds(750);
        let later = now_secs() + TimeDelta::hours(1);
        store
            .insert_session(&Session::new("e1", "tok", precise, later))
            .await
            .unwrap();

        let found = store.find_session("e1", "tok", now_secs()).await.unwrap().unwrap();
        assert_eq!(found.created_at, at(1_700_000_000));
        assert_eq!(found.expires_at, later);
    }

    #[tokio::test]
    async fn out_of_range_timestamp_is_read_error() {
        let (_tmp, store) = test_store();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO employees (employee_id, name, email, password_hash, created_at)
                 VALUES ('e1', 'Ann', 'a@x.com', 'h', ?1)",
                rusqlite::params![i64::MAX],
            )
            .unwrap();
        assert!(matches!(
            store.find_by_email("a@x.com").await,
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn raw_token_is_not_stored() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        let now = Utc::now();
        let session = Session::new("e1", "plain-token", now, now + TimeDelta::minutes(30));
        assert_ne!(session.token_hash, "plain-token");
        assert_eq!(session.token_hash, hash_token("plain-token"));
        store.insert_session(&session).await.unwrap();
    }

    #[tokio::test]
    async fn expired_session_is_not_found() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        let now = Utc::now();
        let session = Session::new(
            "e1",
            "tok",
            now - TimeDelta::hours(2),
            now - TimeDelta::hours(1),
        );
        store.insert_session(&session).await.unwrap();

        assert!(store.find_session("e1", "tok", now).await.unwrap().is_none());
        assert_eq!(store.session_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_session_reports_removal() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .insert_session(&Session::new("e1", "tok", now, now + TimeDelta::minutes(5)))
            .await
            .unwrap();

        assert!(!store.delete_session("e2", "tok").await.unwrap());
        assert!(store.delete_session("e1", "tok").await.unwrap());
        assert!(!store.delete_session("e1", "tok").await.unwrap());
    }

    #[tokio::test]
    async fn multiple_sessions_per_employee() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        let now = Utc::now();
        let later = now + TimeDelta::minutes(5);
        store.insert_session(&Session::new("e1", "t1", now, later)).await.unwrap();
        store.insert_session(&Session::new("e1", "t2", now, later)).await.unwrap();

        assert!(store.delete_session("e1", "t1").await.unwrap());
        assert!(store.find_session("e1", "t2", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let (_tmp, store) = test_store();
        store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .insert_session(&Session::new("e1", "old", now - TimeDelta::hours(2), now - TimeDelta::hours(1)))
            .await
            .unwrap();
        store
            .insert_session(&Session::new("e1", "new", now, now + TimeDelta::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.session_count().unwrap(), 1);
        assert!(store.find_session("e1", "new", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("auth.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.insert_account(&account("e1", "a@x.com")).await.unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        assert!(store.find_by_email("a@x.com").await.unwrap().is_some());
    }

    #[test]
    fn in_memory_store_starts_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.account_count().unwrap(), 0);
        assert_eq!(store.session_count().unwrap(), 0);
    }
}

#![warn(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod auth;
pub mod config;
pub mod gateway;

use auth::{AuthEngine, Pbkdf2Hasher, SqliteStore, TokenCodec};
use config::Config;
use std::sync::Arc;

/// Open the store named in `config` and wire the engine on top of it.
pub fn build_engine(config: &Config) -> anyhow::Result<(Arc<AuthEngine>, Arc<SqliteStore>)> {
    let db_path = &config.storage.db_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteStore::open(db_path)?);

    let codec = TokenCodec::new(
        config.jwt_algorithm()?,
        config.auth.jwt_secret.as_bytes(),
        config.auth.token_ttl_secs,
    )?;
    tracing::info!(
        db = %db_path.display(),
        token_ttl_secs = codec.lifetime().num_seconds(),
        "Store opened"
    );
    let hasher = Arc::new(Pbkdf2Hasher::new(config.auth.password_hash_iterations));
    let engine = AuthEngine::new(store.clone(), store.clone(), hasher, codec);

    Ok((Arc::new(engine), store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_engine_creates_database_and_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.auth.jwt_secret = "s3cret".into();
        config.auth.password_hash_iterations = 10;
        config.storage.db_path = tmp.path().join("nested").join("auth.db");

        let (engine, store) = build_engine(&config).unwrap();
        assert!(config.storage.db_path.exists());
        assert_eq!(store.account_count().unwrap(), 0);
        assert_eq!(engine.sweep_expired_sessions().await.unwrap(), 0);
    }

    #[test]
    fn build_engine_rejects_unusable_secret() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.db_path = tmp.path().join("auth.db");
        assert!(build_engine(&config).is_err());
    }
}

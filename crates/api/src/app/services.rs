//! Service wiring: subject store, authorization engine, credentials, passwords.

use std::sync::Arc;

use chrono::Utc;

use musicflow_auth::{Hs256TokenCodec, PasswordError, PasswordHasher, Subject, TokenCodec, TokenError};
use musicflow_infra::{AppConfig, InMemorySubjectStore, PostgresSubjectStore, SubjectStore};

use crate::authz::AuthzEngine;

/// Shared state for all handlers.
pub struct AppServices {
    pub store: Arc<dyn SubjectStore>,
    pub engine: Arc<AuthzEngine>,
    tokens: Arc<dyn TokenCodec>,
    passwords: PasswordHasher,
}

impl AppServices {
    pub fn new(store: Arc<dyn SubjectStore>, config: &AppConfig) -> Result<Self, PasswordError> {
        let tokens: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(config.jwt_secret.as_bytes()));
        let passwords = PasswordHasher::with_cost(
            config.password_pepper.as_bytes(),
            config.argon2_memory_kib,
            config.argon2_iterations,
        )?;
        let engine = Arc::new(AuthzEngine::new(store.clone(), tokens.clone()));

        Ok(Self {
            store,
            engine,
            tokens,
            passwords,
        })
    }

    pub fn issue_token(&self, subject: &Subject) -> Result<String, TokenError> {
        self.tokens.issue(subject, Utc::now())
    }

    /// Hashing runs on the blocking pool.
    pub async fn hash_password(&self, password: String) -> anyhow::Result<String> {
        let hasher = self.passwords.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;
        Ok(hash)
    }

    pub async fn verify_password(&self, password: String, stored_hash: String) -> anyhow::Result<bool> {
        let hasher = self.passwords.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash)).await??;
        Ok(ok)
    }
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("engine", &self.engine)
            .field("passwords", &self.passwords)
            .finish_non_exhaustive()
    }
}

/// Pick the subject store: Postgres when `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn SubjectStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("using postgres subject store");
            Arc::new(PostgresSubjectStore::connect(url).await?)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory subject store");
            Arc::new(InMemorySubjectStore::new())
        }
    };

    Ok(AppServices::new(store, config)?)
}

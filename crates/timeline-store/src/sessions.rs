//! Password checks and session ids.
//!
//! Session records live in the session database as `session:<id>` holding
//! the owning pid. OAuth scratch data sits beside them and expires after ten
//! minutes.

use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use rand::Rng;
use timeline_core::{Pid, keys};

use crate::anomaly::Anomaly;
use crate::error::{StoreError, StoreResult};
use crate::profiles::PASSWORD_FIELD;
use crate::store::Store;

/// Lifetime of OAuth scratch data.
pub const OAUTH_SESSION_TTL: Duration = Duration::from_secs(600);

/// Session operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct Sessions<'a> {
    store: &'a Store,
}

impl<'a> Sessions<'a> {
    /// Create a new sessions instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Checks `password` against the stored argon2 hash.
    ///
    /// Fails with `ProfileNotFound` for unknown profiles; a profile without a
    /// stored hash never verifies.
    pub async fn verify_password(&self, pid: &Pid, password: &str) -> StoreResult<bool> {
        let key = keys::profile_key(pid);
        let db = &self.store.dbs().profile;
        if !db.exists(&key).await? {
            return Err(StoreError::ProfileNotFound(pid.clone()));
        }
        let Some(stored) = db.hget(&key, PASSWORD_FIELD).await? else {
            return Ok(false);
        };

        let parsed = PasswordHash::new(&stored)
            .map_err(|e| StoreError::Password(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Issues a new session id for `pid`.
    pub async fn new_session(&self, pid: &Pid) -> StoreResult<i64> {
        let session_id = rand::thread_rng().gen_range(1..=i64::MAX);
        self.store
            .dbs()
            .session
            .set(&keys::session_key(session_id), pid.as_str())
            .await?;
        tracing::info!(pid = %pid, "Session issued");
        Ok(session_id)
    }

    /// True if `session_id` was issued to `pid`.
    pub async fn valid_session(&self, pid: &Pid, session_id: i64) -> StoreResult<bool> {
        let owner = self
            .store
            .dbs()
            .session
            .get(&keys::session_key(session_id))
            .await?;
        Ok(owner.is_some_and(|owner| Pid::new(owner) == *pid))
    }

    /// Stores OAuth scratch data under `key` for [`OAUTH_SESSION_TTL`].
    pub async fn set_oauth_session_data(&self, key: &str, data: &str) -> StoreResult<()> {
        let db = &self.store.dbs().session;
        let key = keys::oauth_session_key(key);
        db.set(&key, data).await?;
        if !db.expire(&key, OAUTH_SESSION_TTL).await? {
            self.store.report(Anomaly::ExpiryFailed { key });
        }
        Ok(())
    }

    pub async fn oauth_session_data(&self, key: &str) -> StoreResult<Option<String>> {
        self.store
            .dbs()
            .session
            .get(&keys::oauth_session_key(key))
            .await
    }
}

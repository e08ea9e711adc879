//! Lock manager: temporary narrowing of the policy to one resource
//!
//! Locking snapshots the allow set so unlocking can restore it exactly. The
//! snapshot is taken only on the unlocked-to-locked transition; a lock
//! request while a lock is already active is refused, because overwriting
//! the snapshot with the narrowed single-domain set would make the original
//! policy unrecoverable.

use crate::engine::evaluator::normalize_host;
use crate::engine::store::{LockState, PolicyStore};
use crate::engine::{EngineError, EngineResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Drives lock transitions on the policy store
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<PolicyStore>,
}

impl LockManager {
    /// Create a lock manager over the shared store
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    /// Lock the policy to a single domain.
    ///
    /// Fails with `AlreadyLocked` when a lock is active and with
    /// `InvalidTarget` on an empty domain.
    pub fn lock_domain(&self, domain: &str) -> EngineResult<LockState> {
        let domain = normalize_host(domain.trim());
        if domain.is_empty() {
            return Err(EngineError::invalid_target("empty domain"));
        }
        self.install(None, domain)
    }

    /// Lock the policy to a single URL; the locked domain is derived from
    /// the URL host.
    pub fn lock_url(&self, url: &str) -> EngineResult<LockState> {
        let parsed =
            Url::parse(url).map_err(|e| EngineError::url_parse(url, e))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| EngineError::invalid_target(format!("no host in '{}'", url)))?;
        self.install(Some(url.to_string()), normalize_host(host))
    }

    /// Release the lock, restoring the pre-lock allow set.
    ///
    /// Unlocking while unlocked is a no-op; callers race the storage watcher
    /// and a spurious unlock is harmless.
    pub fn unlock(&self) -> EngineResult<Option<LockState>> {
        let released = self.store.release_lock();
        match released {
            Some(ref state) => {
                info!(domain = %state.locked_domain, "Lock released, allow set restored");
            }
            None => {
                warn!("Unlock requested but no lock is active");
            }
        }
        Ok(released)
    }

    /// Whether a lock is currently active
    pub fn is_locked(&self) -> bool {
        self.store.snapshot().lock.is_some()
    }

    fn install(&self, locked_url: Option<String>, locked_domain: String) -> EngineResult<LockState> {
        let snapshot = self.store.snapshot();
        if let Some(existing) = snapshot.lock {
            warn!(
                active = %existing.locked_domain,
                requested = %locked_domain,
                "Refusing lock while another lock is active"
            );
            return Err(EngineError::AlreadyLocked {
                locked_domain: existing.locked_domain,
            });
        }

        let lock = LockState {
            locked_url,
            locked_domain: locked_domain.clone(),
            previous_allow: snapshot.allow_set,
            locked_at: Utc::now(),
        };
        self.store.install_lock(lock.clone());
        info!(domain = %locked_domain, url = ?lock.locked_url, "Lock installed");
        Ok(lock)
    }
}

//! Policy store: the single source of truth for the current ruleset and lock

use crate::engine::ActionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::RwLock;

/// An active lock narrowing the policy to one resource.
///
/// `previous_allow` is the allow-set snapshot taken at lock time; unlocking
/// restores exactly that set. The two are set and cleared together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    /// Exact URL the policy is locked to, when locked via `lock-url`
    pub locked_url: Option<String>,

    /// Domain the policy is locked to
    pub locked_domain: String,

    /// Allow set to restore on unlock
    pub previous_allow: BTreeSet<String>,

    /// When the lock was taken
    pub locked_at: DateTime<Utc>,
}

/// A complete, immutable view of the policy at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Domains (apex or subdomain match) that are permitted
    #[serde(default)]
    pub allow_set: BTreeSet<String>,

    /// Domains that are denied; evaluated before the allow set
    #[serde(default)]
    pub block_set: BTreeSet<String>,

    /// When false the evaluator allows everything
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// What to do with a denied tab
    #[serde(default)]
    pub action_mode: ActionMode,

    /// Destination for `ActionMode::Redirect`
    #[serde(default)]
    pub redirect_target: Option<String>,

    /// When set, every allowed navigation must contain this keyword
    #[serde(default)]
    pub required_keyword: Option<String>,

    /// Keywords that force Deny on YouTube-family destinations
    #[serde(default)]
    pub disallowed_keywords: Vec<String>,

    /// Active lock, if any
    #[serde(default)]
    pub lock: Option<LockState>,

    /// Endpoint polled periodically to refresh allow/block sets
    #[serde(default)]
    pub remote_rules_endpoint: Option<String>,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            allow_set: BTreeSet::new(),
            block_set: BTreeSet::new(),
            enabled: true,
            action_mode: ActionMode::Close,
            redirect_target: None,
            required_keyword: None,
            disallowed_keywords: Vec::new(),
            lock: None,
            remote_rules_endpoint: None,
        }
    }
}

/// A partial policy update: only fields present overwrite the store.
///
/// The lock is deliberately absent; lock state changes only through the lock
/// manager so the `lock`/`previous_allow` pairing cannot be broken by a merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_set: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_set: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_mode: Option<ActionMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_keyword: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallowed_keywords: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_rules_endpoint: Option<Option<String>>,
}

impl PolicyUpdate {
    /// Whether this update carries no changes at all
    pub fn is_empty(&self) -> bool {
        self.allow_set.is_none()
            && self.block_set.is_none()
            && self.enabled.is_none()
            && self.action_mode.is_none()
            && self.redirect_target.is_none()
            && self.required_keyword.is_none()
            && self.disallowed_keywords.is_none()
            && self.remote_rules_endpoint.is_none()
    }
}

/// Process-wide policy store.
///
/// A single instance lives for the life of the process. Reads take an atomic
/// snapshot; writes go through one merge entry point so field updates are
/// never interleaved with reads.
#[derive(Debug)]
pub struct PolicyStore {
    inner: RwLock<PolicySnapshot>,
}

impl PolicyStore {
    /// Create a store with built-in defaults
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PolicySnapshot::default()),
        }
    }

    /// Create a store from a hydrated snapshot
    pub fn with_snapshot(snapshot: PolicySnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Atomic read of the full policy
    pub fn snapshot(&self) -> PolicySnapshot {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the full policy, used when hydrating from durable storage
    pub fn replace(&self, snapshot: PolicySnapshot) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Atomic merge: only fields present in `update` overwrite the store
    pub fn apply_update(&self, update: PolicyUpdate) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(allow) = update.allow_set {
            guard.allow_set = allow;
        }
        if let Some(block) = update.block_set {
            guard.block_set = block;
        }
        if let Some(enabled) = update.enabled {
            guard.enabled = enabled;
        }
        if let Some(mode) = update.action_mode {
            guard.action_mode = mode;
        }
        if let Some(target) = update.redirect_target {
            guard.redirect_target = target;
        }
        if let Some(keyword) = update.required_keyword {
            guard.required_keyword = keyword;
        }
        if let Some(keywords) = update.disallowed_keywords {
            guard.disallowed_keywords = keywords;
        }
        if let Some(endpoint) = update.remote_rules_endpoint {
            guard.remote_rules_endpoint = endpoint;
        }
    }

    /// Replace allow/block sets only, as one atomic write.
    ///
    /// Used by the remote poller; never touches the lock or other fields.
    pub fn apply_remote_rules(&self, allow: BTreeSet<String>, block: BTreeSet<String>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.allow_set = allow;
        guard.block_set = block;
    }

    /// Install a lock, narrowing the allow set to the locked domain.
    ///
    /// Lock and allow set change under the same write guard so no reader can
    /// observe one without the other.
    pub(crate) fn install_lock(&self, lock: LockState) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut narrowed = BTreeSet::new();
        narrowed.insert(lock.locked_domain.clone());
        guard.allow_set = narrowed;
        guard.lock = Some(lock);
    }

    /// Remove the lock, restoring the snapshotted allow set if one exists
    pub(crate) fn release_lock(&self) -> Option<LockState> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let lock = guard.lock.take();
        if let Some(ref state) = lock {
            guard.allow_set = state.previous_allow.clone();
        }
        lock
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn default_true() -> bool {
    true
}

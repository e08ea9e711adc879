//! Control message interface
//!
//! The options UI and the companion web page drive the engine through a
//! small set of messages. Every message gets an acknowledgement; successful
//! mutations persist the policy and trigger an enforcement sweep.

use crate::engine::lock::LockManager;
use crate::engine::store::{PolicyStore, PolicyUpdate};
use crate::engine::storage::PolicyStorage;
use crate::engine::types::{EngineEvent, SweepStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Messages accepted from the control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Merge a partial policy update into the store
    UpdateRules {
        #[serde(flatten)]
        update: PolicyUpdate,
    },

    /// Lock navigation to one domain
    LockDomain { domain: String },

    /// Lock navigation to one exact URL
    LockUrl { url: String },

    /// Release the active lock, restoring the prior allow set
    UnlockDomain,

    /// Report the current policy and enforcement counters
    Status,
}

/// Acknowledgement returned for every control message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

impl Ack {
    /// A bare success acknowledgement
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
            locked_domain: None,
            status: None,
        }
    }

    /// A failure acknowledgement carrying the error message
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            locked_domain: None,
            status: None,
        }
    }
}

/// Routes control messages to the store, lock manager and storage
#[derive(Clone)]
pub struct ControlDispatcher {
    store: Arc<PolicyStore>,
    lock: LockManager,
    storage: PolicyStorage,
    events: mpsc::Sender<EngineEvent>,
    stats: Arc<dyn Fn() -> SweepStats + Send + Sync>,
}

impl ControlDispatcher {
    /// Create a dispatcher.
    ///
    /// `stats` supplies the engine's current counters for status replies.
    pub fn new(
        store: Arc<PolicyStore>,
        storage: PolicyStorage,
        events: mpsc::Sender<EngineEvent>,
        stats: Arc<dyn Fn() -> SweepStats + Send + Sync>,
    ) -> Self {
        let lock = LockManager::new(store.clone());
        Self {
            store,
            lock,
            storage,
            events,
            stats,
        }
    }

    /// Handle one control message and return its acknowledgement
    pub async fn handle(&self, message: ControlMessage) -> Ack {
        match message {
            ControlMessage::UpdateRules { update } => {
                if update.is_empty() {
                    return Ack::err("update carries no fields");
                }
                self.store.apply_update(update);
                info!("Policy rules updated");
                self.commit().await
            }
            ControlMessage::LockDomain { domain } => match self.lock.lock_domain(&domain) {
                Ok(state) => {
                    let mut ack = self.commit().await;
                    ack.locked_domain = Some(state.locked_domain);
                    ack
                }
                Err(e) => Ack::err(e.to_string()),
            },
            ControlMessage::LockUrl { url } => match self.lock.lock_url(&url) {
                Ok(state) => {
                    let mut ack = self.commit().await;
                    ack.locked_domain = Some(state.locked_domain);
                    ack
                }
                Err(e) => Ack::err(e.to_string()),
            },
            ControlMessage::UnlockDomain => match self.lock.unlock() {
                Ok(_) => self.commit().await,
                Err(e) => Ack::err(e.to_string()),
            },
            ControlMessage::Status => {
                let snapshot = self.store.snapshot();
                let stats = (self.stats)();
                let status = serde_json::json!({
                    "policy": snapshot,
                    "stats": stats,
                });
                let mut ack = Ack::ok();
                ack.status = Some(status);
                ack
            }
        }
    }

    /// Persist the current policy and trigger a sweep.
    ///
    /// A persistence failure is reported in the ack but the in-memory
    /// policy stays applied; enforcement keeps running on it.
    async fn commit(&self) -> Ack {
        let snapshot = self.store.snapshot();
        let ack = match self.storage.save(&snapshot) {
            Ok(()) => Ack::ok(),
            Err(e) => {
                warn!(error = %e, "Could not persist policy");
                Ack::err(format!("applied but not persisted: {}", e))
            }
        };
        let _ = self.events.send(EngineEvent::PolicyChanged).await;
        ack
    }
}

//! Focus enforcement engine
//!
//! Watches browser tabs and decides, per navigation, whether the
//! destination is permitted under the configured study policy, then closes
//! or redirects tabs that violate it. The policy store is the single source
//! of truth; the evaluator is a pure precedence-ordered decision function
//! over it; the lock manager temporarily narrows the policy to one resource
//! and restores it exactly on release; the enforcement engine turns events
//! into corrective actions.

pub mod config;
pub mod enforcer;
pub mod errors;
pub mod evaluator;
pub mod lock;
pub mod messages;
pub mod remote;
pub mod storage;
pub mod store;
pub mod tabs;
pub mod types;

// Re-export commonly used types
pub use self::config::EngineConfig;
pub use self::enforcer::EnforcementEngine;
pub use self::errors::{EngineError, EngineResult};
pub use self::evaluator::{domain_matches, evaluate, normalize_host, video_identity};
pub use self::lock::LockManager;
pub use self::messages::{Ack, ControlDispatcher, ControlMessage};
pub use self::remote::{apply_remote_rules, spawn_poller, RemoteRuleSource, RemoteRules};
pub use self::storage::{PolicyStorage, PolicyWatcher};
pub use self::store::{LockState, PolicySnapshot, PolicyStore, PolicyUpdate};
pub use self::tabs::TabPlatform;
pub use self::types::{
    ActionMode, DenyReason, EngineEvent, SweepStats, TabEvent, TabInfo, Verdict,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        Ack, ActionMode, ControlDispatcher, ControlMessage, DenyReason, EnforcementEngine,
        EngineError, EngineEvent, EngineResult, LockManager, LockState, PolicySnapshot,
        PolicyStorage, PolicyStore, PolicyUpdate, PolicyWatcher, SweepStats, TabEvent, TabInfo,
        TabPlatform, Verdict,
    };
}

//! Durable storage for the policy, plus change notifications
//!
//! The policy persists as a single JSON document. External writers (the
//! options UI, a companion process) may replace the file; a filesystem
//! watcher rehydrates the store and triggers an enforcement sweep when
//! that happens.

use crate::engine::store::{PolicySnapshot, PolicyStore};
use crate::engine::types::EngineEvent;
use crate::engine::{EngineError, EngineResult};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// JSON-file persistence for the policy
#[derive(Debug, Clone)]
pub struct PolicyStorage {
    path: PathBuf,
}

impl PolicyStorage {
    /// Create storage backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted policy; a missing file yields built-in defaults
    pub fn load(&self) -> EngineResult<PolicySnapshot> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted policy, using defaults");
                Ok(PolicySnapshot::default())
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    /// Persist the policy atomically (temp file + rename)
    pub fn save(&self, snapshot: &PolicySnapshot) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Policy persisted");
        Ok(())
    }
}

/// Watches the policy file and rehydrates the store on external changes
pub struct PolicyWatcher {
    // Dropping the watcher stops the subscription
    _watcher: notify::RecommendedWatcher,
}

impl PolicyWatcher {
    /// Minimum interval between reloads, absorbing editor write bursts
    const MIN_RELOAD_INTERVAL: Duration = Duration::from_millis(500);

    /// Start watching the storage file for the life of the process.
    ///
    /// On a relevant change the file is reloaded, the store replaced, and a
    /// `PolicyChanged` event emitted so the engine sweeps. Reload failures
    /// keep the in-memory policy untouched.
    pub fn spawn(
        storage: PolicyStorage,
        store: Arc<PolicyStore>,
        events: mpsc::Sender<EngineEvent>,
    ) -> EngineResult<Self> {
        let watch_dir = storage
            .path()
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| EngineError::invalid_config("policy path has no parent directory"))?;
        fs::create_dir_all(&watch_dir)?;

        let policy_path = storage.path().to_path_buf();
        let last_reload: Mutex<Option<Instant>> = Mutex::new(None);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Policy watcher error");
                    return;
                }
            };

            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            if !event.paths.iter().any(|p| p == &policy_path) {
                return;
            }

            {
                let mut last = last_reload.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(at) = *last {
                    if at.elapsed() < Self::MIN_RELOAD_INTERVAL {
                        return;
                    }
                }
                *last = Some(Instant::now());
            }

            match storage.load() {
                Ok(snapshot) => {
                    debug!("Policy file changed, rehydrating store");
                    store.replace(snapshot);
                    let _ = events.blocking_send(EngineEvent::PolicyChanged);
                }
                Err(e) => {
                    warn!(error = %e, "Could not reload policy file, keeping current policy");
                }
            }
        })
        .map_err(|e| EngineError::custom(format!("failed to start policy watcher: {}", e)))?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| EngineError::custom(format!("failed to watch {}: {}", watch_dir.display(), e)))?;

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::PolicyUpdate;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let storage = PolicyStorage::new(dir.path().join("policy.json"));
        let snapshot = storage.load().unwrap();
        assert!(snapshot.enabled);
        assert!(snapshot.allow_set.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = PolicyStorage::new(dir.path().join("policy.json"));

        let store = PolicyStore::new();
        store.apply_update(PolicyUpdate {
            allow_set: Some(
                ["wikipedia.org", "youtube.com"]
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<BTreeSet<_>>(),
            ),
            required_keyword: Some(Some("thermodynamics".to_string())),
            ..Default::default()
        });

        let saved = store.snapshot();
        storage.save(&saved).unwrap();
        let loaded = storage.load().unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        fs::write(&path, "{ not json").unwrap();

        let storage = PolicyStorage::new(path);
        assert!(matches!(
            storage.load(),
            Err(EngineError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_watcher_rehydrates_on_external_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        let storage = PolicyStorage::new(path.clone());
        storage.save(&PolicySnapshot::default()).unwrap();

        let store = Arc::new(PolicyStore::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _watcher = PolicyWatcher::spawn(storage.clone(), store.clone(), tx).unwrap();

        // Give the watcher time to register
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut external = PolicySnapshot::default();
        external.allow_set.insert("arxiv.org".to_string());
        storage.save(&external).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should emit within the timeout")
            .expect("channel open");
        assert!(matches!(event, EngineEvent::PolicyChanged));
        assert!(store.snapshot().allow_set.contains("arxiv.org"));
    }
}

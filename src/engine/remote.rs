//! Remote rules endpoint polling
//!
//! When a remote endpoint is configured, the allow/block sets are refreshed
//! from it on a fixed interval. The endpoint is authoritative for rules
//! only; a refresh never touches the lock, keywords or any other field.
//! Fetch or parse failures keep the previous ruleset unchanged.

use crate::engine::store::PolicyStore;
use crate::engine::types::EngineEvent;
use crate::engine::{EngineError, EngineResult};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Rules payload returned by the remote endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRules {
    #[serde(default)]
    pub allow: Vec<String>,

    #[serde(default)]
    pub block: Vec<String>,
}

/// HTTP client for the remote rules endpoint
#[derive(Debug, Clone)]
pub struct RemoteRuleSource {
    client: reqwest::Client,
}

impl RemoteRuleSource {
    /// Create a source with a request timeout well under the poll interval
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// GET the endpoint and parse `{allow: [...], block: [...]}`
    pub async fn fetch(&self, endpoint: &str) -> EngineResult<RemoteRules> {
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| EngineError::remote_fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::remote_fetch(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<RemoteRules>()
            .await
            .map_err(|e| EngineError::remote_fetch(e.to_string()))
    }
}

impl Default for RemoteRuleSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply fetched rules to the store and report whether anything changed.
///
/// Skipped while a lock is active so a poll cannot widen a locked-down
/// allow set.
pub fn apply_remote_rules(store: &PolicyStore, rules: RemoteRules) -> bool {
    let snapshot = store.snapshot();
    if snapshot.lock.is_some() {
        debug!("Lock active, deferring remote rules");
        return false;
    }

    let allow: BTreeSet<String> = rules.allow.into_iter().collect();
    let block: BTreeSet<String> = rules.block.into_iter().collect();
    if allow == snapshot.allow_set && block == snapshot.block_set {
        return false;
    }

    store.apply_remote_rules(allow, block);
    true
}

/// Spawn the fixed-interval polling task.
///
/// The task runs independently of all other activity and never blocks tab
/// enforcement. It re-reads the endpoint from the store on every tick so a
/// policy update can repoint or disable polling without a restart.
pub fn spawn_poller(
    store: Arc<PolicyStore>,
    events: mpsc::Sender<EngineEvent>,
    interval: Duration,
) -> JoinHandle<()> {
    let source = RemoteRuleSource::new();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup hydration
        // settles before the first poll
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let endpoint = match store.snapshot().remote_rules_endpoint {
                Some(endpoint) if !endpoint.is_empty() => endpoint,
                _ => continue,
            };

            match source.fetch(&endpoint).await {
                Ok(rules) => {
                    if apply_remote_rules(&store, rules) {
                        info!(%endpoint, "Remote rules applied");
                        if events.send(EngineEvent::PolicyChanged).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "Remote rules fetch failed, keeping previous ruleset");
                }
            }
        }
    })
}

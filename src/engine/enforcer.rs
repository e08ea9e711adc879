//! Enforcement engine
//!
//! Consumes browser tab events and policy-change notifications from one
//! channel, evaluates the affected tabs against the latest policy snapshot
//! and applies the configured corrective action to denied tabs. Full sweeps
//! act on all open tabs concurrently; per-tab failures are logged and
//! discarded so one vanished tab never aborts the rest of a sweep.

use crate::engine::evaluator::evaluate;
use crate::engine::store::PolicyStore;
use crate::engine::tabs::TabPlatform;
use crate::engine::types::{
    ActionMode, EngineEvent, SweepStats, TabEvent, TabInfo, Verdict,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Default settling delay before evaluating a freshly created tab; its
/// navigation target is not always known synchronously at creation.
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// The event-driven enforcement loop
#[derive(Clone)]
pub struct EnforcementEngine {
    store: Arc<PolicyStore>,
    platform: Arc<dyn TabPlatform>,
    settle_delay: Duration,
    stats: Arc<Mutex<SweepStats>>,
}

impl EnforcementEngine {
    /// Create an engine over the shared store and tab platform
    pub fn new(store: Arc<PolicyStore>, platform: Arc<dyn TabPlatform>) -> Self {
        Self {
            store,
            platform,
            settle_delay: DEFAULT_SETTLE_DELAY,
            stats: Arc::new(Mutex::new(SweepStats::default())),
        }
    }

    /// Override the tab-creation settling delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Current enforcement counters
    pub fn stats(&self) -> SweepStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Run the event loop until the channel closes or `Shutdown` arrives.
    ///
    /// Sweeps and settling delays run on spawned tasks; the loop itself
    /// never blocks on tab actions, and overlapping sweeps are acceptable
    /// because each evaluation reads the latest snapshot and actions are
    /// idempotent per tab.
    pub async fn run(self, mut events: mpsc::Receiver<EngineEvent>) {
        info!("Enforcement engine started");
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Tab(tab_event) => self.handle_tab_event(tab_event),
                EngineEvent::PolicyChanged => {
                    let engine = self.clone();
                    tokio::spawn(async move {
                        engine.sweep().await;
                    });
                }
                EngineEvent::Shutdown => break,
            }
        }
        info!("Enforcement engine stopped");
    }

    fn handle_tab_event(&self, event: TabEvent) {
        let engine = self.clone();
        tokio::spawn(async move {
            match event {
                TabEvent::Updated { tab_id, url, title } => {
                    engine
                        .enforce_observation(tab_id, url.as_deref(), title.as_deref())
                        .await;
                }
                TabEvent::Activated { tab_id } => {
                    engine.enforce_tab_by_id(tab_id).await;
                }
                TabEvent::Created { tab_id } => {
                    tokio::time::sleep(engine.settle_delay).await;
                    engine.enforce_tab_by_id(tab_id).await;
                }
                TabEvent::WindowFocused => {
                    engine.enforce_active_tabs().await;
                }
            }
        });
    }

    /// Evaluate and enforce every open tab.
    ///
    /// Returns the number of corrective actions issued.
    pub async fn sweep(&self) -> usize {
        let sweep_id = Uuid::new_v4();
        let tabs = match self.platform.list_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                debug!(%sweep_id, error = %e, "Could not list tabs, skipping sweep");
                return 0;
            }
        };

        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_sweep();
        debug!(%sweep_id, tabs = tabs.len(), "Starting enforcement sweep");

        let actions = futures::future::join_all(
            tabs.iter().map(|tab| {
                self.enforce_observation(tab.tab_id, tab.url.as_deref(), tab.title.as_deref())
            }),
        )
        .await
        .into_iter()
        .filter(|acted| *acted)
        .count();

        info!(%sweep_id, tabs = tabs.len(), actions, "Sweep complete");
        actions
    }

    /// Evaluate one observation and act on a denial.
    ///
    /// Returns whether a corrective action was issued. Re-evaluating an
    /// already-compliant tab is a no-op.
    pub async fn enforce_observation(
        &self,
        tab_id: i64,
        url: Option<&str>,
        title: Option<&str>,
    ) -> bool {
        let url = match url {
            Some(url) => url,
            None => return false,
        };

        // Only web navigations are subject to evaluation; internal pages,
        // local files and extension pages are exempt by construction
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return false;
        }

        let policy = self.store.snapshot();
        let verdict = evaluate(&policy, url, title.unwrap_or(""));
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_verdict(&verdict);

        let reason = match verdict {
            Verdict::Allow => return false,
            Verdict::Deny(reason) => reason,
        };

        let redirect_to = match (policy.action_mode, policy.redirect_target) {
            (ActionMode::Redirect, Some(target)) if !target.is_empty() => Some(target),
            _ => None,
        };

        match redirect_to {
            // A tab already sitting on the redirect target is left alone to
            // avoid a redirect loop
            Some(target) if url == target => false,
            Some(target) => {
                debug!(tab_id, url, %reason, %target, "Redirecting denied tab");
                self.apply(self.platform.update_tab(tab_id, &target).await, tab_id)
            }
            None => {
                debug!(tab_id, url, %reason, "Closing denied tab");
                self.apply(self.platform.close_tab(tab_id).await, tab_id)
            }
        }
    }

    async fn enforce_tab_by_id(&self, tab_id: i64) {
        match self.platform.list_tabs().await {
            Ok(tabs) => {
                if let Some(tab) = tabs.into_iter().find(|t| t.tab_id == tab_id) {
                    self.enforce_observation(tab.tab_id, tab.url.as_deref(), tab.title.as_deref())
                        .await;
                }
            }
            Err(e) => debug!(tab_id, error = %e, "Could not look up tab"),
        }
    }

    async fn enforce_active_tabs(&self) {
        match self.platform.list_tabs().await {
            Ok(tabs) => {
                let active: Vec<TabInfo> = tabs.into_iter().filter(|t| t.active).collect();
                futures::future::join_all(active.iter().map(|tab| {
                    self.enforce_observation(tab.tab_id, tab.url.as_deref(), tab.title.as_deref())
                }))
                .await;
            }
            Err(e) => debug!(error = %e, "Could not list tabs on focus change"),
        }
    }

    /// Record an action result; failures are discarded, never retried and
    /// never propagated into the surrounding sweep.
    fn apply(&self, result: crate::engine::EngineResult<()>, tab_id: i64) -> bool {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        match result {
            Ok(()) => {
                stats.record_action();
                true
            }
            Err(e) => {
                stats.record_action_failure();
                debug!(tab_id, error = %e, "Tab action failed, ignoring");
                false
            }
        }
    }
}

//! Core types for the enforcement engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of evaluating a single navigation against the current policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// The navigation is permitted
    Allow,

    /// The navigation violates the policy
    Deny(DenyReason),
}

impl Verdict {
    /// Whether this verdict permits the navigation
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Why a navigation was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// A lock is active and the destination is not the locked resource
    LockViolation,

    /// The host matches the block set
    Blocked,

    /// The required keyword was absent from title and URL
    MissingRequiredKeyword,

    /// A disallowed keyword matched on a YouTube-family destination
    DisallowedKeyword,

    /// `youtube.com` is allow-listed but the educational heuristic failed
    NotEducational,

    /// The host matched no allow-set entry
    NotAllowed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LockViolation => "lock violation",
            Self::Blocked => "host is block-listed",
            Self::MissingRequiredKeyword => "required keyword missing",
            Self::DisallowedKeyword => "disallowed keyword present",
            Self::NotEducational => "youtube content is not educational",
            Self::NotAllowed => "host is not allow-listed",
        };
        write!(f, "{}", s)
    }
}

/// Corrective action taken against a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    /// Close the offending tab
    Close,

    /// Navigate the offending tab to the configured redirect target
    Redirect,
}

impl Default for ActionMode {
    fn default() -> Self {
        Self::Close
    }
}

/// A tab as reported by the browser platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabInfo {
    /// Platform-assigned tab identifier
    pub tab_id: i64,

    /// Current URL, absent until the first navigation commits
    #[serde(default)]
    pub url: Option<String>,

    /// Current title, often empty while loading
    #[serde(default)]
    pub title: Option<String>,

    /// Whether the tab is the active tab of a focused window
    #[serde(default)]
    pub active: bool,
}

/// Browser tab lifecycle events the engine reacts to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TabEvent {
    /// A tab's URL changed or finished loading
    Updated {
        tab_id: i64,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },

    /// A tab became the active tab in its window
    Activated { tab_id: i64 },

    /// A new tab was created; its navigation target may not be known yet
    Created { tab_id: i64 },

    /// A browser window gained focus
    WindowFocused,
}

/// Events consumed by the engine's single event loop
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A browser tab lifecycle event
    Tab(TabEvent),

    /// The policy store was mutated; re-evaluate every open tab
    PolicyChanged,

    /// Shut the event loop down
    Shutdown,
}

/// Counters for sweeps and per-tab enforcement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepStats {
    /// Number of full sweeps run
    pub sweeps: u64,

    /// Total navigations evaluated
    pub evaluations: u64,

    /// Tabs allowed
    pub allowed: u64,

    /// Corrective actions issued
    pub actions: u64,

    /// Per-tab action failures (tab gone, platform error)
    pub action_failures: u64,

    /// Last completed sweep
    pub last_sweep: Option<DateTime<Utc>>,
}

impl SweepStats {
    /// Record the start of a sweep
    pub fn record_sweep(&mut self) {
        self.sweeps += 1;
        self.last_sweep = Some(Utc::now());
    }

    /// Record a single evaluation outcome
    pub fn record_verdict(&mut self, verdict: &Verdict) {
        self.evaluations += 1;
        if verdict.is_allow() {
            self.allowed += 1;
        }
    }

    /// Record an issued action
    pub fn record_action(&mut self) {
        self.actions += 1;
    }

    /// Record a failed action
    pub fn record_action_failure(&mut self) {
        self.action_failures += 1;
    }
}

/// Keywords that mark an allow-listed `youtube.com` navigation as educational
pub const EDUCATIONAL_KEYWORDS: [&str; 21] = [
    "lecture",
    "tutorial",
    "course",
    "class",
    "chapter",
    "gate",
    "jee",
    "neet",
    "upsc",
    "physics",
    "chemistry",
    "math",
    "maths",
    "biology",
    "history",
    "geography",
    "notes",
    "learn",
    "educational",
    "education",
    "study",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_is_allow() {
        assert!(Verdict::Allow.is_allow());
        assert!(!Verdict::Deny(DenyReason::Blocked).is_allow());
    }

    #[test]
    fn test_deny_reason_display() {
        assert_eq!(DenyReason::Blocked.to_string(), "host is block-listed");
        assert_eq!(DenyReason::LockViolation.to_string(), "lock violation");
    }

    #[test]
    fn test_tab_event_deserialization() {
        let event: TabEvent = serde_json::from_str(
            r#"{"event":"updated","tab_id":7,"url":"https://example.com","title":"Example"}"#,
        )
        .unwrap();
        match event {
            TabEvent::Updated { tab_id, url, .. } => {
                assert_eq!(tab_id, 7);
                assert_eq!(url.as_deref(), Some("https://example.com"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let event: TabEvent = serde_json::from_str(r#"{"event":"window-focused"}"#).unwrap();
        assert!(matches!(event, TabEvent::WindowFocused));
    }

    #[test]
    fn test_sweep_stats() {
        let mut stats = SweepStats::default();

        stats.record_sweep();
        stats.record_verdict(&Verdict::Allow);
        stats.record_verdict(&Verdict::Deny(DenyReason::NotAllowed));
        stats.record_action();

        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.allowed, 1);
        assert_eq!(stats.actions, 1);
        assert_eq!(stats.action_failures, 0);
        assert!(stats.last_sweep.is_some());
    }
}

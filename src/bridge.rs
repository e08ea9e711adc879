//! NDJSON stdio bridge to the browser side
//!
//! The browser extension talks to the engine over newline-delimited JSON:
//! tab events, tab-list snapshots and control messages come in on stdin;
//! enforcement commands and acknowledgements go out on stdout. The bridge
//! keeps a registry of open tabs fed by the incoming events, which backs
//! the engine's view of "all open tabs" during sweeps.

use crate::engine::{
    Ack, ControlDispatcher, ControlMessage, EngineError, EngineEvent, EngineResult, TabEvent,
    TabInfo, TabPlatform,
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines read from the browser side
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Incoming {
    /// Control message (discriminated by `type`)
    Control(ControlMessage),

    /// Tab lifecycle event (discriminated by `event`)
    Event(TabEvent),

    /// Full tab-list snapshot; replaces the registry. The stdio host cannot
    /// query the browser synchronously, so the extension pushes the list.
    Snapshot { tabs: Vec<TabInfo> },
}

/// Lines written to the browser side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum Outgoing {
    /// Close a tab
    Close { tab_id: i64 },

    /// Navigate a tab to a new URL
    Redirect { tab_id: i64, url: String },

    /// Acknowledgement for a control message
    Ack {
        #[serde(flatten)]
        ack: Ack,
    },
}

/// Registry of open tabs, maintained from incoming events.
///
/// Implements [`TabPlatform`] by emitting commands on the outgoing channel;
/// the browser applies them and reports back through ordinary tab events.
pub struct TabRegistry {
    tabs: DashMap<i64, TabInfo>,
    out: mpsc::Sender<Outgoing>,
}

impl TabRegistry {
    /// Create a registry writing commands to `out`
    pub fn new(out: mpsc::Sender<Outgoing>) -> Self {
        Self {
            tabs: DashMap::new(),
            out,
        }
    }

    /// Fold a tab event into the registry
    pub fn apply_event(&self, event: &TabEvent) {
        match event {
            TabEvent::Updated { tab_id, url, title } => {
                let mut entry = self.tabs.entry(*tab_id).or_insert_with(|| TabInfo {
                    tab_id: *tab_id,
                    url: None,
                    title: None,
                    active: false,
                });
                if url.is_some() {
                    entry.url = url.clone();
                }
                if title.is_some() {
                    entry.title = title.clone();
                }
            }
            TabEvent::Activated { tab_id } => {
                for mut tab in self.tabs.iter_mut() {
                    tab.active = tab.tab_id == *tab_id;
                }
                self.tabs.entry(*tab_id).or_insert_with(|| TabInfo {
                    tab_id: *tab_id,
                    url: None,
                    title: None,
                    active: true,
                });
            }
            TabEvent::Created { tab_id } => {
                self.tabs.entry(*tab_id).or_insert_with(|| TabInfo {
                    tab_id: *tab_id,
                    url: None,
                    title: None,
                    active: false,
                });
            }
            TabEvent::WindowFocused => {}
        }
    }

    /// Replace the registry with a full snapshot
    pub fn replace(&self, tabs: Vec<TabInfo>) {
        self.tabs.clear();
        for tab in tabs {
            self.tabs.insert(tab.tab_id, tab);
        }
    }

    /// Number of known tabs
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Whether no tabs are known
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    async fn send(&self, command: Outgoing) -> EngineResult<()> {
        self.out
            .send(command)
            .await
            .map_err(|_| EngineError::custom("outgoing channel closed"))
    }
}

#[async_trait]
impl TabPlatform for TabRegistry {
    async fn list_tabs(&self) -> EngineResult<Vec<TabInfo>> {
        Ok(self.tabs.iter().map(|t| t.clone()).collect())
    }

    async fn update_tab(&self, tab_id: i64, url: &str) -> EngineResult<()> {
        let mut entry = self
            .tabs
            .get_mut(&tab_id)
            .ok_or_else(|| EngineError::action_failed(tab_id, "tab not in registry"))?;
        entry.url = Some(url.to_string());
        drop(entry);
        self.send(Outgoing::Redirect {
            tab_id,
            url: url.to_string(),
        })
        .await
    }

    async fn close_tab(&self, tab_id: i64) -> EngineResult<()> {
        if self.tabs.remove(&tab_id).is_none() {
            return Err(EngineError::action_failed(tab_id, "tab not in registry"));
        }
        self.send(Outgoing::Close { tab_id }).await
    }
}

/// The stdin-side loop of the bridge
pub struct StdioBridge {
    registry: std::sync::Arc<TabRegistry>,
    dispatcher: ControlDispatcher,
    events: mpsc::Sender<EngineEvent>,
    out: mpsc::Sender<Outgoing>,
}

impl StdioBridge {
    /// Create a bridge routing to the given dispatcher and engine channel
    pub fn new(
        registry: std::sync::Arc<TabRegistry>,
        dispatcher: ControlDispatcher,
        events: mpsc::Sender<EngineEvent>,
        out: mpsc::Sender<Outgoing>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            events,
            out,
        }
    }

    /// Consume newline-delimited JSON from `input` until EOF.
    ///
    /// Malformed lines are logged and skipped; they never stop the loop.
    pub async fn run<R>(self, input: R)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(input).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.handle_line(line).await;
        }
        debug!("Bridge input closed");
    }

    async fn handle_line(&self, line: &str) {
        match serde_json::from_str::<Incoming>(line) {
            Ok(Incoming::Control(message)) => {
                let ack = self.dispatcher.handle(message).await;
                let _ = self.out.send(Outgoing::Ack { ack }).await;
            }
            Ok(Incoming::Event(event)) => {
                self.registry.apply_event(&event);
                let _ = self.events.send(EngineEvent::Tab(event)).await;
            }
            Ok(Incoming::Snapshot { tabs }) => {
                debug!(tabs = tabs.len(), "Tab snapshot received");
                self.registry.replace(tabs);
                // Catch up on tabs that were open before we connected
                let _ = self.events.send(EngineEvent::PolicyChanged).await;
            }
            Err(e) => {
                warn!(error = %e, line, "Unparsable bridge line, skipping");
            }
        }
    }
}

/// Drain outgoing commands onto a writer, one JSON object per line
pub async fn write_outgoing<W>(mut rx: mpsc::Receiver<Outgoing>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        let mut line = match serde_json::to_string(&command) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Could not serialize outgoing command");
                continue;
            }
        };
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        let _ = writer.flush().await;
    }
}

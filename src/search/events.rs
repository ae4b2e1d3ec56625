use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Mutex;

/// Event name consumers subscribe to
pub const REINDEX_EVENT: &str = "tags:reindex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexKind {
    Full,
    Update,
    Remove,
    Rename,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    pub file_count: usize,
    pub tag_count: usize,
    /// Milliseconds since the Unix epoch; 0 means never indexed
    pub last_indexed: i64,
}

/// Payload emitted once per mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexEvent {
    #[serde(rename = "type")]
    pub kind: ReindexKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_added: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_removed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags_added: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags_removed: Option<Vec<String>>,
    pub meta: IndexMeta,
}

impl ReindexEvent {
    pub fn new(kind: ReindexKind, meta: IndexMeta) -> Self {
        Self {
            kind,
            files_added: None,
            files_removed: None,
            tags_added: None,
            tags_removed: None,
            meta,
        }
    }

    pub fn files_added(mut self, files: Vec<String>) -> Self {
        self.files_added = non_empty(files);
        self
    }

    pub fn files_removed(mut self, files: Vec<String>) -> Self {
        self.files_removed = non_empty(files);
        self
    }

    pub fn tags_added(mut self, tags: Vec<String>) -> Self {
        self.tags_added = non_empty(tags);
        self
    }

    pub fn tags_removed(mut self, tags: Vec<String>) -> Self {
        self.tags_removed = non_empty(tags);
        self
    }
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Fire-and-forget sink for reindex events
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &ReindexEvent);
}

pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify(&self, _event: &ReindexEvent) {}
}

/// Forwards events over an mpsc channel (e.g. to a UI bridge thread)
pub struct ChannelNotifier {
    tx: Mutex<mpsc::Sender<ReindexEvent>>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::Receiver<ReindexEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl EventNotifier for ChannelNotifier {
    fn notify(&self, event: &ReindexEvent) {
        let sent = self
            .tx
            .lock()
            .map(|tx| tx.send(event.clone()).is_ok())
            .unwrap_or(false);
        if !sent {
            log::debug!("[{}] No receiver for {:?} event", REINDEX_EVENT, event.kind);
        }
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_HISTORY_ITEMS: usize = 50;
pub const DEDUP_WINDOW: usize = 3;
pub const MIN_IMAGE_BYTES: usize = 500;
pub const MIN_TEXT_CHARS: usize = 1;
pub const HISTORY_KEY: &str = "clipboard-history";
pub const WELCOME_TEXT: &str =
    "Welcome to QuickClip! Your copied items will appear here.";

pub type TimestampMs = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Image,
}

/// One captured clipboard value.
///
/// Serializes to the persisted layout `{"type","content","timestamp"}` shared
/// by every context that touches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub content: String,
    #[serde(rename = "timestamp")]
    pub captured_at: TimestampMs,
}

impl HistoryItem {
    pub fn new(
        kind: ItemKind,
        content: impl Into<String>,
        captured_at: TimestampMs,
    ) -> Result<Self, CoreError> {
        let content = content.into();
        if content.is_empty() {
            return Err(CoreError::EmptyContent);
        }
        Ok(Self {
            kind,
            content,
            captured_at,
        })
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("history item content must not be empty")]
    EmptyContent,
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Accept/reject policy for a new candidate against a log snapshot.
///
/// Rejects only when the candidate matches one of the first [`DEDUP_WINDOW`]
/// entries; equal content further back is accepted and handled as a
/// move-to-front by [`HistoryLog::insert`]. Pure: the snapshot is never
/// modified here.
pub fn evaluate_candidate(snapshot: &[HistoryItem], content: &str) -> Decision {
    if snapshot
        .iter()
        .take(DEDUP_WINDOW)
        .any(|item| item.content == content)
    {
        Decision::Reject
    } else {
        Decision::Accept
    }
}

/// The shared history: ordered newest-first, capped at [`MAX_HISTORY_ITEMS`],
/// never holding two entries with equal content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct HistoryLog {
    items: Vec<HistoryItem>,
}

impl HistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored items, enforcing the capacity bound on the
    /// way in. Items beyond the cap (from an oversized or hand-edited stored
    /// value) are dropped from the tail.
    #[must_use]
    pub fn from_items(mut items: Vec<HistoryItem>) -> Self {
        items.truncate(MAX_HISTORY_ITEMS);
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryItem> {
        self.items.iter()
    }

    /// Prepend an item, removing any equal-content entry anywhere in the log
    /// first, then truncate to capacity. O(n) in log length.
    pub fn insert(&mut self, item: HistoryItem) {
        self.items
            .retain(|existing| existing.content != item.content);
        self.items.insert(0, item);
        self.items.truncate(MAX_HISTORY_ITEMS);
    }

    /// Remove every entry whose `captured_at` equals the given timestamp and
    /// return how many were removed.
    ///
    /// Capture timestamps are millisecond-resolution; two near-simultaneous
    /// captures written outside the arbiter can collide and both disappear
    /// here. Callers wanting one-entry deletes must go through timestamps
    /// assigned by the arbiter, which are unique.
    pub fn remove_at(&mut self, captured_at: TimestampMs) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.captured_at != captured_at);
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// List filter used by the popup: text entries match on case-insensitive
    /// substring, image entries only when the query is empty.
    #[must_use]
    pub fn filter(&self, query: &str) -> Vec<&HistoryItem> {
        let needle = query.to_lowercase();
        self.items
            .iter()
            .filter(|item| match item.kind {
                ItemKind::Text => item.content.to_lowercase().contains(&needle),
                ItemKind::Image => query.is_empty(),
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a HistoryItem;
    type IntoIter = std::slice::Iter<'a, HistoryItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

pub fn encode_history(log: &HistoryLog) -> Result<String, CoreError> {
    serde_json::to_string(log).map_err(|err| CoreError::Serialization(err.to_string()))
}

pub fn decode_history(payload: &str) -> Result<HistoryLog, CoreError> {
    let items: Vec<HistoryItem> =
        serde_json::from_str(payload).map_err(|err| CoreError::Serialization(err.to_string()))?;
    Ok(HistoryLog::from_items(items))
}

/// The single entry a context seeds when the stored log is absent or empty.
#[must_use]
pub fn welcome_item(now_ms: TimestampMs) -> HistoryItem {
    HistoryItem {
        kind: ItemKind::Text,
        content: WELCOME_TEXT.to_owned(),
        captured_at: now_ms,
    }
}

/// Next capture timestamp: wall-clock time, bumped past the previously
/// assigned value so serialized writes never collide on a millisecond.
#[must_use]
pub fn next_capture_timestamp(last_assigned: TimestampMs, now_ms: TimestampMs) -> TimestampMs {
    now_ms.max(last_assigned.saturating_add(1))
}

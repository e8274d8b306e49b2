use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use quickclip_core::{HISTORY_KEY, HistoryLog, ItemKind};
use quickclip_store::{
    ArbiterHandle, CaptureEvent, ClipboardReader, CopyEvent, CopyPayload, MemoryStore,
    PersistentStore, SessionState, StoreError, UiSession, run_capture_pipeline, spawn_arbiter,
};
use tokio::sync::mpsc;

#[tokio::test]
async fn image_plus_caption_copy_yields_a_single_image_entry() {
    let (store, _arbiter, events) = start_pipeline(FakeClipboard::empty());

    events
        .send(CaptureEvent::Copy(CopyEvent {
            selection: Some("the caption under the image".to_owned()),
            editable_selection: None,
            payloads: vec![payload("image/png", 2_048)],
        }))
        .expect("send copy event");

    let log = wait_for_entries(&store, 1).await;
    assert_eq!(log.items()[0].kind, ItemKind::Image);
    assert!(log.items()[0].content.starts_with("data:image/png;base64,"));

    // The delayed text capture must stay suppressed.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(stored_log(&store).await.len(), 1);
}

#[tokio::test]
async fn undersized_image_does_not_claim_and_the_caption_is_captured() {
    let (store, _arbiter, events) = start_pipeline(FakeClipboard::empty());

    events
        .send(CaptureEvent::Copy(CopyEvent {
            selection: Some("caption text".to_owned()),
            editable_selection: None,
            payloads: vec![payload("image/gif", 400)],
        }))
        .expect("send copy event");

    let log = wait_for_entries(&store, 1).await;
    assert_eq!(log.items()[0].kind, ItemKind::Text);
    assert_eq!(log.items()[0].content, "caption text");
}

#[tokio::test]
async fn undersized_image_alone_leaves_the_log_untouched() {
    let (store, arbiter, events) = start_pipeline(FakeClipboard::empty());
    arbiter.append("pre-existing", ItemKind::Text).await;

    events
        .send(CaptureEvent::Copy(CopyEvent {
            selection: None,
            editable_selection: None,
            payloads: vec![payload("image/png", 400)],
        }))
        .expect("send copy event");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let log = stored_log(&store).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log.items()[0].content, "pre-existing");
}

#[tokio::test]
async fn focus_gain_reads_the_system_clipboard() {
    let clipboard = FakeClipboard::with_texts(&["copied in the address bar"]);
    let (store, _arbiter, events) = start_pipeline(clipboard);

    events
        .send(CaptureEvent::FocusGained)
        .expect("send focus event");

    let log = wait_for_entries(&store, 1).await;
    assert_eq!(log.items()[0].content, "copied in the address bar");
}

#[tokio::test]
async fn refused_clipboard_read_produces_nothing() {
    let (store, _arbiter, events) = start_pipeline(FakeClipboard::denied());

    events
        .send(CaptureEvent::FocusGained)
        .expect("send focus event");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(stored_log(&store).await.is_empty());
}

#[tokio::test]
async fn manual_add_bypasses_event_capture() {
    let (store, _arbiter, events) = start_pipeline(FakeClipboard::empty());

    events
        .send(CaptureEvent::Manual {
            content: "https://example.com/current-page".to_owned(),
        })
        .expect("send manual event");

    let log = wait_for_entries(&store, 1).await;
    assert_eq!(log.items()[0].kind, ItemKind::Text);
    assert_eq!(log.items()[0].content, "https://example.com/current-page");
}

#[tokio::test]
async fn session_open_reads_the_clipboard_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let arbiter = spawn_arbiter(store.clone());
    let reads = Arc::new(AtomicUsize::new(0));
    let clipboard = FakeClipboard::with_texts(&["from the clipboard"]).counting(reads.clone());

    let mut session = UiSession::new("popup", arbiter, clipboard);
    assert_eq!(session.state(), SessionState::Closed);

    assert!(session.open().await);
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(stored_log(&store).await.items()[0].content, "from the clipboard");

    // Opening an already-open session must not read again.
    assert!(!session.open().await);
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    assert!(session.close());
    assert!(!session.close());

    // The keyboard shortcut reopens and triggers one more read.
    session.toggle().await;
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

struct FakeClipboard {
    responses: Vec<Result<String, StoreError>>,
    reads: Option<Arc<AtomicUsize>>,
}

impl FakeClipboard {
    fn empty() -> Self {
        Self {
            responses: Vec::new(),
            reads: None,
        }
    }

    fn denied() -> Self {
        Self {
            responses: vec![Err(StoreError::PermissionDenied)],
            reads: None,
        }
    }

    fn with_texts(texts: &[&str]) -> Self {
        Self {
            responses: texts.iter().map(|text| Ok((*text).to_owned())).collect(),
            reads: None,
        }
    }

    fn counting(mut self, reads: Arc<AtomicUsize>) -> Self {
        self.reads = Some(reads);
        self
    }
}

impl ClipboardReader for FakeClipboard {
    fn read_text(&mut self) -> Result<String, StoreError> {
        if let Some(reads) = &self.reads {
            reads.fetch_add(1, Ordering::SeqCst);
        }
        if self.responses.is_empty() {
            return Err(StoreError::PermissionDenied);
        }
        self.responses.remove(0)
    }
}

fn payload(mime: &str, size: usize) -> CopyPayload {
    CopyPayload {
        mime: mime.to_owned(),
        bytes: vec![0xCD; size],
    }
}

fn start_pipeline(
    clipboard: FakeClipboard,
) -> (
    Arc<MemoryStore>,
    ArbiterHandle,
    mpsc::UnboundedSender<CaptureEvent>,
) {
    let store = Arc::new(MemoryStore::new());
    let arbiter = spawn_arbiter(store.clone());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_capture_pipeline(events_rx, arbiter.clone(), clipboard));
    (store, arbiter, events_tx)
}

async fn stored_log(store: &MemoryStore) -> HistoryLog {
    store
        .get(HISTORY_KEY)
        .await
        .expect("store read")
        .unwrap_or_default()
}

async fn wait_for_entries(store: &MemoryStore, expected: usize) -> HistoryLog {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let log = stored_log(store).await;
        if log.len() >= expected {
            return log;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} entries, have {}",
            log.len()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

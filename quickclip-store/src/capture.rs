use std::time::Duration;

use base64::Engine;
use quickclip_core::{ItemKind, MIN_IMAGE_BYTES, MIN_TEXT_CHARS};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{arbiter::ArbiterHandle, coordinator::AppendOutcome, error::StoreError};

/// Delay between a copy event and finalizing its text capture, so an image
/// payload on the same event can claim it first and an image-plus-caption
/// copy does not land as two entries.
pub const TEXT_CAPTURE_DELAY: Duration = Duration::from_millis(100);

/// Delay before reading the clipboard when a UI session opens; the read fails
/// spuriously while focus is still moving.
pub const FOCUS_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// One entry of a copy event's clipboard payload.
#[derive(Debug, Clone)]
pub struct CopyPayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// A copy event observed in a page context: the current selection, the
/// selected substring of a focused editable element, and the raw payloads the
/// event carried.
#[derive(Debug, Clone, Default)]
pub struct CopyEvent {
    pub selection: Option<String>,
    pub editable_selection: Option<String>,
    pub payloads: Vec<CopyPayload>,
}

/// The single logical ingress channel: every capture source, in any context,
/// feeds one of these into the pipeline.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A copy fired in a page; dispatched to image-then-selection capture.
    Copy(CopyEvent),
    /// A context gained focus; the system clipboard is read directly because
    /// copies made outside the page never raise a copy event.
    FocusGained,
    /// Explicit user action (add selection, add URL); bypasses event capture.
    Manual { content: String },
}

/// Direct system-clipboard text access. Real contexts wrap the platform
/// clipboard; tests substitute a scripted reader.
pub trait ClipboardReader: Send + 'static {
    fn read_text(&mut self) -> Result<String, StoreError>;
}

/// Drain the ingress channel, dispatching each event to its capture variant.
/// Copy events are handled on their own task so the text-capture delay never
/// stalls the channel; the loop ends when every sender is gone.
pub async fn run_capture_pipeline<R: ClipboardReader>(
    mut events: mpsc::UnboundedReceiver<CaptureEvent>,
    arbiter: ArbiterHandle,
    mut clipboard: R,
) {
    while let Some(event) = events.recv().await {
        match event {
            CaptureEvent::Copy(copy) => {
                tokio::spawn(handle_copy_event(arbiter.clone(), copy));
            }
            CaptureEvent::FocusGained => {
                sync_clipboard(&arbiter, &mut clipboard, Duration::ZERO).await;
            }
            CaptureEvent::Manual { content } => {
                if content.is_empty() {
                    continue;
                }
                let outcome = arbiter.append(content, ItemKind::Text).await;
                debug!(?outcome, "manual add processed");
            }
        }
    }
    info!("capture pipeline stopped");
}

/// ImageCapture then SelectionCapture for one copy event. At most one image
/// is captured per event, and a claimed image suppresses the text capture.
async fn handle_copy_event(arbiter: ArbiterHandle, event: CopyEvent) {
    if let Some(payload) = first_image_candidate(&event.payloads) {
        let content = encode_image_data_uri(&payload.mime, &payload.bytes);
        let outcome = arbiter.append(content, ItemKind::Image).await;
        debug!(mime = %payload.mime, ?outcome, "image capture processed");
        return;
    }

    tokio::time::sleep(TEXT_CAPTURE_DELAY).await;

    if let Some(text) = selection_text(&event) {
        let outcome = arbiter.append(text, ItemKind::Text).await;
        debug!(?outcome, "selection capture processed");
    }
}

/// The first payload that claims the event: an image media type whose decoded
/// size clears the floor. Smaller images (placeholders, tracking pixels) are
/// passed over without claiming, leaving the text capture free to proceed.
fn first_image_candidate(payloads: &[CopyPayload]) -> Option<&CopyPayload> {
    payloads
        .iter()
        .find(|payload| is_image_mime(&payload.mime) && payload.bytes.len() > MIN_IMAGE_BYTES)
}

fn is_image_mime(mime: &str) -> bool {
    mime.trim().starts_with("image/")
}

fn encode_image_data_uri(mime: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", mime.trim(), encoded)
}

/// SelectionCapture content rule: the trimmed page selection, else the
/// selected substring of the focused editable element; single characters are
/// not worth keeping.
fn selection_text(event: &CopyEvent) -> Option<String> {
    let raw = match event.selection.as_deref().map(str::trim) {
        Some(selection) if !selection.is_empty() => selection,
        _ => event.editable_selection.as_deref().map(str::trim)?,
    };

    if raw.chars().count() > MIN_TEXT_CHARS {
        Some(raw.to_owned())
    } else {
        None
    }
}

/// ClipboardReadCapture: read the system clipboard's text and append it. A
/// refused read (permission not granted, focus not yet stable) produces
/// nothing beyond a debug note.
pub(crate) async fn sync_clipboard<R: ClipboardReader>(
    arbiter: &ArbiterHandle,
    clipboard: &mut R,
    settle: Duration,
) -> AppendOutcome {
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }

    match clipboard.read_text() {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                return AppendOutcome::Dropped;
            }
            arbiter.append(text, ItemKind::Text).await
        }
        Err(err) => {
            debug!("clipboard sync skipped: {err}");
            AppendOutcome::Dropped
        }
    }
}

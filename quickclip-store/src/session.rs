use tracing::debug;

use crate::{
    arbiter::ArbiterHandle,
    capture::{ClipboardReader, FOCUS_SETTLE_DELAY, sync_clipboard},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
}

/// One UI-bearing context (popup, overlay). The only transitions are
/// `Closed → Open → Closed`; entering Open performs exactly one direct
/// clipboard read, after a short settle delay, to pick up copies made
/// outside any page.
#[derive(Debug)]
pub struct UiSession<R> {
    label: String,
    state: SessionState,
    arbiter: ArbiterHandle,
    clipboard: R,
}

impl<R: ClipboardReader> UiSession<R> {
    pub fn new(label: impl Into<String>, arbiter: ArbiterHandle, clipboard: R) -> Self {
        Self {
            label: label.into(),
            state: SessionState::Closed,
            arbiter,
            clipboard,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Open the session. Returns false (and reads nothing) when already open.
    pub async fn open(&mut self) -> bool {
        if self.state == SessionState::Open {
            return false;
        }
        self.state = SessionState::Open;
        debug!(session = %self.label, "session opened, syncing clipboard");
        sync_clipboard(&self.arbiter, &mut self.clipboard, FOCUS_SETTLE_DELAY).await;
        true
    }

    /// Close the session. Returns false when already closed.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        debug!(session = %self.label, "session closed");
        true
    }

    /// Keyboard-shortcut entry point: flip between Open and Closed.
    pub async fn toggle(&mut self) {
        match self.state {
            SessionState::Closed => {
                self.open().await;
            }
            SessionState::Open => {
                self.close();
            }
        }
    }
}

pub mod arbiter;
pub mod capture;
pub mod coordinator;
pub mod error;
pub mod session;
pub mod store;

pub use arbiter::{ArbiterHandle, spawn_arbiter};
pub use capture::{
    CaptureEvent, ClipboardReader, CopyEvent, CopyPayload, FOCUS_SETTLE_DELAY, TEXT_CAPTURE_DELAY,
    run_capture_pipeline,
};
pub use coordinator::{AppendOutcome, ContextHandle, SyncCoordinator};
pub use error::StoreError;
pub use session::{SessionState, UiSession};
pub use store::{FileStore, MAX_STORE_BYTES, MemoryStore, PersistentStore};

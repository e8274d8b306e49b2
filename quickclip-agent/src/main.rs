use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::Parser;
use quickclip_core::HistoryLog;
use quickclip_store::{
    CaptureEvent, ClipboardReader, FileStore, PersistentStore, StoreError, run_capture_pipeline,
    spawn_arbiter,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use tracing_subscriber::fmt::MakeWriter;

const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Parser, Debug, Clone)]
#[command(name = "quickclip-agent")]
struct AgentArgs {
    /// History document location; defaults to the per-user data directory.
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// How often to re-read the system clipboard, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    poll_interval_ms: u64,

    /// Optional byte quota for the persisted document.
    #[arg(long)]
    quota_bytes: Option<usize>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Clone)]
struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct FileWriterGuard {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.flush()
    }
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriterGuard {
            file: Arc::clone(&self.file),
        }
    }
}

fn init_tracing(log_file: Option<&Path>) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|err| {
                    eprintln!("cannot open log file {}: {err}", path.display());
                    std::process::exit(1);
                });
            builder
                .with_ansi(false)
                .with_writer(FileMakeWriter {
                    file: Arc::new(Mutex::new(file)),
                })
                .init();
        }
        None => builder.init(),
    }
}

/// System clipboard access for the agent's ClipboardReadCapture. The
/// underlying handle is created lazily; on a headless session or a refused
/// read, the capture is skipped like any other denied clipboard access.
struct SystemClipboard {
    clipboard: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    fn new() -> Self {
        Self { clipboard: None }
    }
}

impl ClipboardReader for SystemClipboard {
    fn read_text(&mut self) -> Result<String, StoreError> {
        if self.clipboard.is_none() {
            self.clipboard = arboard::Clipboard::new().ok();
        }
        let Some(clipboard) = self.clipboard.as_mut() else {
            return Err(StoreError::PermissionDenied);
        };
        clipboard
            .get_text()
            .map_err(|_| StoreError::PermissionDenied)
    }
}

fn default_store_path() -> PathBuf {
    let base = std::env::var_os("LOCALAPPDATA")
        .or_else(|| std::env::var_os("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("QuickClip").join("history.json")
}

fn effective_poll_interval(poll_interval_ms: u64) -> Duration {
    Duration::from_millis(poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
}

#[tokio::main]
async fn main() {
    let args = AgentArgs::parse();
    init_tracing(args.log_file.as_deref());

    let store_path = args.store_path.clone().unwrap_or_else(default_store_path);
    info!(
        store_path = %store_path.display(),
        poll_interval_ms = args.poll_interval_ms,
        "agent starting"
    );

    let store = Arc::new(match args.quota_bytes {
        Some(quota) => FileStore::with_quota(&store_path, quota),
        None => FileStore::new(&store_path),
    });
    let updates = store.subscribe();
    let arbiter = spawn_arbiter(store);

    if arbiter.seed_welcome().await {
        info!("welcome entry seeded into an empty history");
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_capture_pipeline(
        events_rx,
        arbiter.clone(),
        SystemClipboard::new(),
    ));
    tokio::spawn(log_history_changes(updates));

    // The agent has no page to listen in: it only ever sees the clipboard
    // itself, so it re-reads on an interval the way a page context re-reads
    // on focus gain.
    let mut poll = tokio::time::interval(effective_poll_interval(args.poll_interval_ms));
    loop {
        poll.tick().await;
        if events_tx.send(CaptureEvent::FocusGained).is_err() {
            error!("capture pipeline is gone, shutting down");
            break;
        }
    }
}

async fn log_history_changes(mut updates: watch::Receiver<HistoryLog>) {
    while updates.changed().await.is_ok() {
        let entries = updates.borrow_and_update().len();
        debug!(entries, "history document changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults() {
        let args = AgentArgs::try_parse_from(["quickclip-agent"]).unwrap();
        assert_eq!(args.poll_interval_ms, 1_000);
        assert!(args.store_path.is_none());
        assert!(args.quota_bytes.is_none());
        assert!(args.log_file.is_none());
    }

    #[test]
    fn poll_interval_has_a_floor() {
        assert_eq!(effective_poll_interval(0), Duration::from_millis(100));
        assert_eq!(effective_poll_interval(50), Duration::from_millis(100));
        assert_eq!(effective_poll_interval(2_000), Duration::from_millis(2_000));
    }

    #[test]
    fn default_store_path_ends_in_history_document() {
        let path = default_store_path();
        assert!(path.ends_with(Path::new("QuickClip/history.json")));
    }
}

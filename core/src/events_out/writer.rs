use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::config::EventsOutConfig;
use crate::notify::NotificationSink;
use crate::state::ExecutionEvent;

fn audit_preview(s: &str) -> String {
    const MAX: usize = 120;
    if s.len() <= MAX {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .take_while(|(i, _)| *i < MAX)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let mut out = s[..end].to_string();
    out.push('…');
    out
}

#[derive(Clone)]
pub struct EventsOutTx {
    tx: mpsc::Sender<String>,
    overflow: Arc<Mutex<VecDeque<String>>>,
    overflow_limit: usize,
    dropped: Arc<AtomicU64>,
}

impl EventsOutTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Never waits. Lines that do not fit the channel queue up in a bounded
    /// overflow, empty when `drop_when_full` is set, and are written after
    /// everything already in the channel. Lines past both bounds are dropped.
    pub fn send_line(&self, line: String) {
        let Ok(mut overflow) = self.overflow.lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        // While anything waits in the overflow, the channel must not overtake it.
        let line = if overflow.is_empty() {
            match self.tx.try_send(line) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(line)) => line,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        } else {
            line
        };
        if overflow.len() < self.overflow_limit {
            overflow.push_back(line);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Next line in send order: channel first, then the overflow. Waits on the
/// channel only when both are empty.
async fn next_line(
    rx: &mut mpsc::Receiver<String>,
    overflow: &Mutex<VecDeque<String>>,
) -> Option<String> {
    loop {
        match rx.try_recv() {
            Ok(line) => return Some(line),
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => {
                return overflow.lock().ok().and_then(|mut q| q.pop_front());
            }
        }
        let queued = overflow.lock().ok().and_then(|mut q| q.pop_front());
        if queued.is_some() {
            return queued;
        }
        let line = rx.recv().await;
        if line.is_some() {
            return line;
        }
    }
}

pub async fn start_events_out(cfg: &EventsOutConfig) -> Result<Option<EventsOutTx>, String> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }

    let capacity = cfg.channel_capacity.max(1);
    let (tx, mut rx) = mpsc::channel::<String>(capacity);
    let overflow = Arc::new(Mutex::new(VecDeque::new()));
    let overflow_limit = if cfg.drop_when_full { 0 } else { capacity };
    let dropped = Arc::new(AtomicU64::new(0));
    let path = cfg.path.clone();

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("create events_out dir failed: {e}"))?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("open events_out file failed: {e}"))?;
        Box::new(file)
    };

    let pending = overflow.clone();
    tokio::spawn(async move {
        while let Some(mut line) = next_line(&mut rx, &pending).await {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            if path == "stdout:" {
                tracing::debug!(
                    target: "opsbook.stdout_audit",
                    kind = "events_out",
                    bytes = line.len(),
                    preview = %audit_preview(line.trim_end())
                );
            }
            if writer.write_all(line.as_bytes()).await.is_err() {
                return;
            }
            // Keep the file tail-able while executions are running.
            let _ = writer.flush().await;
        }

        let _ = writer.flush().await;
    });

    Ok(Some(EventsOutTx {
        tx,
        overflow,
        overflow_limit,
        dropped,
    }))
}

/// [`NotificationSink`] that serialises each event as one JSON line.
#[derive(Clone)]
pub struct EventsOutSink {
    out: EventsOutTx,
}

impl EventsOutSink {
    pub fn new(out: EventsOutTx) -> Self {
        Self { out }
    }

    pub fn dropped_count(&self) -> u64 {
        self.out.dropped_count()
    }
}

impl NotificationSink for EventsOutSink {
    fn name(&self) -> &str {
        "events_out"
    }

    fn notify(&self, event: &ExecutionEvent) {
        match serde_json::to_string(event) {
            Ok(line) => self.out.send_line(line),
            Err(e) => tracing::warn!(error = %e, "events_out serialization failed"),
        }
    }
}

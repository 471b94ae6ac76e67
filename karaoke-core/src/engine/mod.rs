//! `KaraokeEngine`: runs processing passes and reports on them.
//!
//! ## Lifecycle
//!
//! ```text
//! KaraokeEngine::new(config)
//!     └─► process(buffer)        → status = Processing
//!             ├─► Ok(output)     → status = Completed
//!             ├─► cancel()       → Err(Cancelled), status = Cancelled
//!             └─► Err(e)         → status = Error
//! ```
//!
//! One pass at a time: `process()` on a busy engine returns
//! `AlreadyRunning`. `process_async()` runs the same pass on Tokio's blocking
//! pool so async hosts stay responsive.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::AudioBuffer,
    config::PipelineConfig,
    error::{KaraokeError, Result},
    events::{EngineStatus, EngineStatusEvent, Notice, ProgressEvent},
};

pub use pipeline::{DiagnosticsSnapshot, KaraokeOutput, ProcessingReport};

/// Broadcast channel capacity for slow consumers.
const BROADCAST_CAP: usize = 256;

/// The top-level engine handle.
///
/// `KaraokeEngine` is `Send + Sync`; wrap it in `Arc` to cancel from another
/// thread or to call `process_async`.
pub struct KaraokeEngine {
    config: PipelineConfig,
    /// `true` while a pass is running.
    running: Arc<AtomicBool>,
    /// Raised by `cancel()`, cleared at the start of every pass.
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    notice_tx: broadcast::Sender<Notice>,
    /// Monotonically increasing progress sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl KaraokeEngine {
    pub fn new(config: PipelineConfig) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (progress_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (notice_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            status_tx,
            progress_tx,
            notice_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one blocking pass over `buffer`.
    ///
    /// # Errors
    /// - `AlreadyRunning` if another pass is in progress.
    /// - `InvalidAudio` for a malformed buffer (nothing is processed).
    /// - `Cancelled` if `cancel()` was called before the last chunk started.
    pub fn process(&self, buffer: AudioBuffer) -> Result<KaraokeOutput> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KaraokeError::AlreadyRunning);
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.diagnostics.reset();
        self.set_status(EngineStatus::Processing, None);

        let ctx = pipeline::PipelineContext {
            config: self.config.clone(),
            cancel: Arc::clone(&self.cancel),
            diagnostics: Arc::clone(&self.diagnostics),
            progress_tx: Some(self.progress_tx.clone()),
            notice_tx: Some(self.notice_tx.clone()),
            seq: Arc::clone(&self.seq),
        };
        let result = pipeline::run(&ctx, buffer);

        match &result {
            Ok(out) => {
                self.set_status(
                    EngineStatus::Completed,
                    Some(format!("{} cues", out.cues.len())),
                );
            }
            Err(e @ KaraokeError::Cancelled { .. }) => {
                self.set_status(EngineStatus::Cancelled, Some(e.to_string()));
            }
            Err(e) => {
                warn!("processing failed: {e}");
                self.set_status(EngineStatus::Error, Some(e.to_string()));
            }
        }
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Run `process` on Tokio's blocking thread pool.
    pub async fn process_async(self: Arc<Self>, buffer: AudioBuffer) -> Result<KaraokeOutput> {
        match tokio::task::spawn_blocking(move || self.process(buffer)).await {
            Ok(result) => result,
            Err(e) => Err(KaraokeError::Other(anyhow::anyhow!(
                "processing task failed: {e}"
            ))),
        }
    }

    /// Ask the running pass to stop before its next chunk. Returns `false`
    /// when nothing is running.
    pub fn cancel(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.cancel.store(true, Ordering::SeqCst);
        info!("cancel requested");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// One event per committed chunk.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Counters of the current (or last) pass.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

//! One blocking processing pass over a whole input.
//!
//! ## Stages (per chunk)
//!
//! ```text
//! 1. ChunkScheduler yields the next chunk (native audio + 16 kHz mono)
//! 2. Vocal removal on the native audio (strategy from config)
//! 3. Energy detection on the mono derivative, gated by the removal guide
//! 4. Commit in chunk order:
//!    a. OutputAssembler trims / cross-fades the overlap
//!    b. SubtitleTimelineBuilder deduplicates seam segments
//!    c. Notices and progress are recorded and broadcast
//! ```
//!
//! Stages 2-3 run on a scoped worker pool when every stage is
//! chunk-independent; results are reordered by chunk index before step 4.
//! `AdaptiveFilter`, `Combined` and running-max detection carry state from
//! one chunk to the next and run on the calling thread instead.
//!
//! Cancellation is checked before each chunk is dispatched, never mid-chunk.

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use crossbeam_channel::bounded;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn};

use crate::{
    audio::AudioBuffer,
    buffering::{AudioChunk, ChunkScheduler, ChunkSpan, OutputAssembler},
    config::{DisplayOptions, PipelineConfig},
    error::{KaraokeError, Result},
    events::{Notice, ProgressEvent},
    removal::{
        apply_remover, remover_for, AdaptiveState, RemovalInput, RemovalResult, RemovalStrategy,
        VocalRemover,
    },
    subtitles::{SubtitleCue, SubtitleTimelineBuilder},
    vad::{EnergyDetector, VocalSegment, VoiceActivityDetector},
};

pub struct PipelineDiagnostics {
    pub chunks_total: AtomicUsize,
    pub chunks_processed: AtomicUsize,
    pub frames_in: AtomicUsize,
    pub detection_frames: AtomicUsize,
    pub segments_detected: AtomicUsize,
    pub fallbacks: AtomicUsize,
    pub clipped_samples: AtomicUsize,
    pub adaptive_resets: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            chunks_total: AtomicUsize::new(0),
            chunks_processed: AtomicUsize::new(0),
            frames_in: AtomicUsize::new(0),
            detection_frames: AtomicUsize::new(0),
            segments_detected: AtomicUsize::new(0),
            fallbacks: AtomicUsize::new(0),
            clipped_samples: AtomicUsize::new(0),
            adaptive_resets: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_total.store(0, Ordering::Relaxed);
        self.chunks_processed.store(0, Ordering::Relaxed);
        self.frames_in.store(0, Ordering::Relaxed);
        self.detection_frames.store(0, Ordering::Relaxed);
        self.segments_detected.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.clipped_samples.store(0, Ordering::Relaxed);
        self.adaptive_resets.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            detection_frames: self.detection_frames.load(Ordering::Relaxed),
            segments_detected: self.segments_detected.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            clipped_samples: self.clipped_samples.load(Ordering::Relaxed),
            adaptive_resets: self.adaptive_resets.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub frames_in: usize,
    pub detection_frames: usize,
    pub segments_detected: usize,
    pub fallbacks: usize,
    pub clipped_samples: usize,
    pub adaptive_resets: usize,
}

/// All context the pipeline needs, passed as one struct.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub cancel: Arc<AtomicBool>,
    pub diagnostics: Arc<PipelineDiagnostics>,
    pub progress_tx: Option<broadcast::Sender<ProgressEvent>>,
    pub notice_tx: Option<broadcast::Sender<Notice>>,
    pub seq: Arc<AtomicU64>,
}

impl PipelineContext {
    /// A context with no event subscribers and a fresh cancel flag.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            progress_tx: None,
            notice_tx: None,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Everything one pass produces.
#[derive(Debug, Clone)]
pub struct KaraokeOutput {
    pub instrumental: AudioBuffer,
    pub cues: Vec<SubtitleCue>,
    pub notices: Vec<Notice>,
    /// True when the cues are evenly spaced placeholders.
    pub fallback_used: bool,
    pub strategy: RemovalStrategy,
    pub diagnostics: DiagnosticsSnapshot,
    /// Copied from the config untouched.
    pub display: DisplayOptions,
}

/// Serializable summary of a pass (everything but the audio).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingReport {
    pub strategy: RemovalStrategy,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub cues: Vec<SubtitleCue>,
    pub notices: Vec<Notice>,
    pub fallback_used: bool,
    pub diagnostics: DiagnosticsSnapshot,
    pub display: DisplayOptions,
}

impl KaraokeOutput {
    pub fn report(&self) -> ProcessingReport {
        ProcessingReport {
            strategy: self.strategy,
            duration_secs: self.instrumental.duration_secs(),
            sample_rate: self.instrumental.sample_rate,
            channels: self.instrumental.channels,
            cues: self.cues.clone(),
            notices: self.notices.clone(),
            fallback_used: self.fallback_used,
            diagnostics: self.diagnostics,
            display: self.display.clone(),
        }
    }
}

/// Removal and detection results for one chunk, before commit.
struct ChunkOutcome {
    span: ChunkSpan,
    removal: RemovalResult,
    segments: Vec<VocalSegment>,
}

/// Run one pass over `buffer`.
///
/// # Errors
/// - `InvalidAudio` before any chunk is processed.
/// - `Cancelled` if `ctx.cancel` was raised before the last chunk was dispatched.
pub fn run(ctx: &PipelineContext, buffer: AudioBuffer) -> Result<KaraokeOutput> {
    let started = Instant::now();
    let config = &ctx.config;
    let duration = buffer.duration_secs();
    let (frames, channels, rate) = (buffer.frames(), buffer.channels, buffer.sample_rate);

    let scheduler = ChunkScheduler::new(buffer, config.chunking.clone())?;
    let total = scheduler.chunk_count();
    ctx.diagnostics.chunks_total.store(total, Ordering::Relaxed);

    let remover = remover_for(config.strategy, &config.removal);
    let detector = EnergyDetector::new(config.detector.clone());
    let workers = config.resolved_workers().min(total.max(1));
    let sequential =
        config.strategy.is_sequential() || config.detector.is_sequential() || workers <= 1;

    info!(
        strategy = config.strategy.as_str(),
        duration_secs = duration,
        sample_rate = rate,
        channels,
        chunks = total,
        workers = if sequential { 1 } else { workers },
        "pipeline started"
    );

    let mut commit = Committer {
        ctx,
        total,
        done: 0,
        assembler: OutputAssembler::new(frames, channels, rate, config.overlap_mode),
        timeline: SubtitleTimelineBuilder::new(config.timeline.clone(), rate),
        notices: Vec::new(),
    };

    if sequential {
        run_sequential(ctx, &scheduler, remover.as_ref(), detector, &mut commit)?;
    } else {
        run_parallel(ctx, &scheduler, remover.as_ref(), &detector, workers, &mut commit)?;
    }

    if commit.done < total {
        let chunks_done = commit.done;
        if ctx.cancel.load(Ordering::SeqCst) {
            info!(chunks_done, total, "pipeline cancelled");
            return Err(KaraokeError::Cancelled { chunks_done });
        }
        return Err(KaraokeError::Other(anyhow::anyhow!(
            "worker pool stopped after {chunks_done} of {total} chunks"
        )));
    }

    let Committer {
        assembler,
        timeline,
        mut notices,
        ..
    } = commit;
    let instrumental = assembler.finish()?;
    let timeline = timeline.finish(duration);
    if let Some(notice) = timeline.notice {
        broadcast_notice(ctx, &notice);
        notices.push(notice);
    }

    let diagnostics = ctx.diagnostics.snapshot();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        cues = timeline.cues.len(),
        notices = notices.len(),
        fallback = timeline.fallback_used,
        fallbacks = diagnostics.fallbacks,
        clipped_samples = diagnostics.clipped_samples,
        segments_detected = diagnostics.segments_detected,
        "pipeline finished"
    );

    Ok(KaraokeOutput {
        instrumental,
        cues: timeline.cues,
        notices,
        fallback_used: timeline.fallback_used,
        strategy: config.strategy,
        diagnostics,
        display: config.display.clone(),
    })
}

fn run_sequential(
    ctx: &PipelineContext,
    scheduler: &ChunkScheduler,
    remover: &dyn VocalRemover,
    mut detector: EnergyDetector,
    commit: &mut Committer<'_>,
) -> Result<()> {
    let mut state = AdaptiveState::new();
    for chunk in scheduler.chunks()? {
        if ctx.cancel.load(Ordering::SeqCst) {
            break;
        }
        let chunk = chunk?;
        if ctx.config.adaptive_reset.apply(&mut state) {
            ctx.diagnostics.adaptive_resets.fetch_add(1, Ordering::Relaxed);
            debug!(chunk = chunk.index(), "adaptive state reset");
        }
        let (outcome, next) = process_chunk(ctx, remover, &mut detector, &chunk, state);
        state = next;
        commit.commit(outcome)?;
    }
    Ok(())
}

fn run_parallel(
    ctx: &PipelineContext,
    scheduler: &ChunkScheduler,
    remover: &dyn VocalRemover,
    detector: &EnergyDetector,
    workers: usize,
    commit: &mut Committer<'_>,
) -> Result<()> {
    std::thread::scope(|s| {
        let (job_tx, job_rx) = bounded::<AudioChunk>(workers);
        let (result_tx, result_rx) = bounded::<Result<ChunkOutcome>>(workers);

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let mut detector = detector.clone();
            s.spawn(move || {
                for chunk in job_rx.iter() {
                    let (outcome, _) = process_chunk(
                        ctx,
                        remover,
                        &mut detector,
                        &chunk,
                        AdaptiveState::default(),
                    );
                    if result_tx.send(Ok(outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);

        let producer_tx = result_tx;
        s.spawn(move || {
            let chunks = match scheduler.chunks() {
                Ok(chunks) => chunks,
                Err(e) => {
                    let _ = producer_tx.send(Err(e));
                    return;
                }
            };
            for chunk in chunks {
                if ctx.cancel.load(Ordering::SeqCst) {
                    debug!("cancel requested, no further chunks dispatched");
                    break;
                }
                match chunk {
                    Ok(chunk) => {
                        if job_tx.send(chunk).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = producer_tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        let mut pending: BTreeMap<usize, ChunkOutcome> = BTreeMap::new();
        for result in result_rx.iter() {
            let outcome = result?;
            pending.insert(outcome.span.index, outcome);
            while let Some(outcome) = pending.remove(&commit.done) {
                commit.commit(outcome)?;
            }
        }
        Ok(())
    })
}

/// Removal then detection for one chunk. Never fails: strategy failures are
/// already folded into notices by `apply_remover`.
fn process_chunk(
    ctx: &PipelineContext,
    remover: &dyn VocalRemover,
    detector: &mut EnergyDetector,
    chunk: &AudioChunk,
    state: AdaptiveState,
) -> (ChunkOutcome, AdaptiveState) {
    let span = info_span!(
        "chunk",
        index = chunk.index(),
        start_secs = chunk.span.offset_secs(chunk.sample_rate),
        frames = chunk.frames(),
    );
    let _enter = span.enter();

    let input = RemovalInput::new(&chunk.samples, chunk.channels, chunk.sample_rate, chunk.index());
    let (removal, state) = apply_remover(remover, &input, state);

    let guide = if ctx.config.detector.use_vocal_guide {
        removal.vocal_energy.as_ref()
    } else {
        None
    };
    let report = detector.detect(&chunk.detection, chunk.detection_rate, guide);

    ctx.diagnostics
        .frames_in
        .fetch_add(chunk.frames(), Ordering::Relaxed);
    ctx.diagnostics
        .detection_frames
        .fetch_add(report.frames.len(), Ordering::Relaxed);
    debug!(
        segments = report.segments.len(),
        notices = removal.notices.len(),
        "chunk processed"
    );

    (
        ChunkOutcome {
            span: chunk.span,
            removal,
            segments: report.segments,
        },
        state,
    )
}

/// In-order sink for chunk outcomes.
struct Committer<'a> {
    ctx: &'a PipelineContext,
    total: usize,
    done: usize,
    assembler: OutputAssembler,
    timeline: SubtitleTimelineBuilder,
    notices: Vec<Notice>,
}

impl Committer<'_> {
    fn commit(&mut self, outcome: ChunkOutcome) -> Result<()> {
        let ChunkOutcome {
            span,
            removal,
            segments,
        } = outcome;

        self.assembler.push(&span, &removal.instrumental)?;
        self.timeline.push(&span, &segments)?;

        let diagnostics = &self.ctx.diagnostics;
        diagnostics
            .segments_detected
            .fetch_add(segments.len(), Ordering::Relaxed);
        for notice in removal.notices {
            match &notice {
                Notice::FallbackApplied { reason, .. } => {
                    diagnostics.fallbacks.fetch_add(1, Ordering::Relaxed);
                    warn!(chunk = span.index, %reason, "fallback applied");
                }
                Notice::ClippingOccurred {
                    clipped_samples, ..
                } => {
                    diagnostics
                        .clipped_samples
                        .fetch_add(*clipped_samples, Ordering::Relaxed);
                }
                Notice::DetectorLowConfidence { .. } => {}
            }
            broadcast_notice(self.ctx, &notice);
            self.notices.push(notice);
        }

        self.done += 1;
        diagnostics.chunks_processed.store(self.done, Ordering::Relaxed);

        if let Some(tx) = &self.ctx.progress_tx {
            let _ = tx.send(ProgressEvent {
                seq: self.ctx.seq.fetch_add(1, Ordering::Relaxed),
                chunks_done: self.done,
                chunks_total: self.total,
                percent: 100.0 * self.done as f32 / self.total.max(1) as f32,
            });
        }
        Ok(())
    }
}

fn broadcast_notice(ctx: &PipelineContext, notice: &Notice) {
    if let Some(tx) = &ctx.notice_tx {
        let _ = tx.send(notice.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::ChunkConfig;
    use std::f32::consts::PI;

    fn short_chunks() -> ChunkConfig {
        ChunkConfig {
            chunk_duration_secs: 1.0,
            overlap_ms: 50.0,
            ..ChunkConfig::default()
        }
    }

    fn stereo_tone(secs: f32, rate: u32) -> AudioBuffer {
        let frames = (secs * rate as f32) as usize;
        let samples = (0..frames)
            .flat_map(|i| {
                let t = i as f32 / rate as f32;
                let c = 0.3 * (2.0 * PI * 440.0 * t).sin();
                let side = 0.2 * (2.0 * PI * 110.0 * t).sin();
                [c + side, c]
            })
            .collect();
        AudioBuffer::new(samples, 2, rate)
    }

    fn config(strategy: RemovalStrategy, workers: usize) -> PipelineConfig {
        PipelineConfig {
            strategy,
            workers,
            chunking: short_chunks(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn output_matches_input_shape() {
        let input = stereo_tone(3.5, 16_000);
        let ctx = PipelineContext::new(config(RemovalStrategy::CenterChannelCancellation, 1));
        let out = run(&ctx, input.clone()).unwrap();
        assert_eq!(out.instrumental.frames(), input.frames());
        assert_eq!(out.instrumental.channels, 2);
        assert_eq!(out.instrumental.sample_rate, 16_000);
        assert_eq!(out.diagnostics.chunks_processed, 4);
        assert_eq!(out.diagnostics.chunks_total, 4);
    }

    #[test]
    fn invalid_audio_fails_before_any_chunk() {
        let ctx = PipelineContext::new(PipelineConfig::default());
        let err = run(&ctx, AudioBuffer::new(Vec::new(), 2, 44_100)).unwrap_err();
        assert!(matches!(err, KaraokeError::InvalidAudio(_)));
        assert_eq!(ctx.diagnostics.snapshot().chunks_processed, 0);
    }

    #[test]
    fn cancel_before_start_processes_nothing() {
        for workers in [1, 3] {
            let ctx = PipelineContext::new(config(RemovalStrategy::SpectralSubtraction, workers));
            ctx.cancel.store(true, Ordering::SeqCst);
            let err = run(&ctx, stereo_tone(3.0, 16_000)).unwrap_err();
            assert!(matches!(err, KaraokeError::Cancelled { chunks_done: 0 }));
        }
    }

    #[test]
    fn progress_and_notices_are_broadcast() {
        let (progress_tx, mut progress_rx) = broadcast::channel(64);
        let (notice_tx, mut notice_rx) = broadcast::channel(64);
        let mut ctx = PipelineContext::new(config(RemovalStrategy::CenterChannelCancellation, 1));
        ctx.progress_tx = Some(progress_tx);
        ctx.notice_tx = Some(notice_tx);

        let mono = AudioBuffer::new(vec![0.0; 16_000 * 2], 1, 16_000);
        let out = run(&ctx, mono).unwrap();

        let mut last = None;
        while let Ok(ev) = progress_rx.try_recv() {
            last = Some(ev);
        }
        let last = last.unwrap();
        assert_eq!(last.chunks_done, 2);
        assert_eq!(last.percent, 100.0);

        // Two mono fallbacks and one low-confidence notice.
        let mut received = Vec::new();
        while let Ok(n) = notice_rx.try_recv() {
            received.push(n);
        }
        assert_eq!(received, out.notices);
        assert_eq!(received.len(), 3);
        assert!(out.fallback_used);
        assert_eq!(out.diagnostics.fallbacks, 2);
    }

    #[test]
    fn adaptive_reset_policy_is_applied_between_chunks() {
        let mut cfg = config(RemovalStrategy::AdaptiveFilter, 1);
        cfg.adaptive_reset = crate::removal::AdaptiveReset::EveryChunks(2);
        let ctx = PipelineContext::new(cfg);
        let out = run(&ctx, stereo_tone(5.0, 16_000)).unwrap();
        // Resets before chunks 2 and 4.
        assert_eq!(out.diagnostics.adaptive_resets, 2);
    }
}

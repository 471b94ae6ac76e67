use std::f32::consts::PI;
use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use karaoke_core::buffering::{ChunkConfig, OverlapMode};
use karaoke_core::engine::pipeline::{self, PipelineContext};
use karaoke_core::removal::RemovalParams;
use karaoke_core::subtitles::TimelineConfig;
use karaoke_core::{
    AudioBuffer, EngineStatus, KaraokeEngine, KaraokeError, Notice, PipelineConfig,
    RemovalStrategy,
};

fn chunks(secs: f32) -> ChunkConfig {
    ChunkConfig {
        chunk_duration_secs: secs,
        overlap_ms: 50.0,
        ..ChunkConfig::default()
    }
}

fn config(strategy: RemovalStrategy, chunk_secs: f32, workers: usize) -> PipelineConfig {
    PipelineConfig {
        strategy,
        chunking: chunks(chunk_secs),
        workers,
        ..PipelineConfig::default()
    }
}

/// Round-trip through 16-bit PCM, as a decoded 16-bit file would arrive.
fn quantize16(x: f32) -> f32 {
    (x * 32_767.0).round() / 32_767.0
}

/// Amplitude of the `freq` component of `signal` (single-bin DFT).
fn tone_amplitude(signal: &[f32], freq: f32, rate: u32) -> f32 {
    let (mut re, mut im) = (0.0f64, 0.0f64);
    for (n, &x) in signal.iter().enumerate() {
        let phase = 2.0 * std::f64::consts::PI * freq as f64 * n as f64 / rate as f64;
        re += x as f64 * phase.cos();
        im -= x as f64 * phase.sin();
    }
    (2.0 * (re * re + im * im).sqrt() / signal.len() as f64) as f32
}

fn channel(interleaved: &[f32], ch: usize) -> Vec<f32> {
    interleaved.chunks_exact(2).map(|f| f[ch]).collect()
}

fn mono_burst(total_secs: f32, from: f32, to: f32, rate: u32) -> AudioBuffer {
    let n = (total_secs * rate as f32) as usize;
    let samples = (0..n)
        .map(|i| {
            let t = i as f32 / rate as f32;
            if t >= from && t < to {
                0.5 * (2.0 * PI * 440.0 * t).sin()
            } else {
                0.0
            }
        })
        .collect();
    AudioBuffer::new(samples, 1, rate)
}

#[test]
fn ten_second_stereo_center_tone_is_cancelled_side_tone_survives() {
    let rate = 44_100u32;
    let frames = 10 * rate as usize;
    let samples: Vec<f32> = (0..frames)
        .flat_map(|i| {
            let t = i as f32 / rate as f32;
            let center = 0.3 * (2.0 * PI * 440.0 * t).sin();
            let side = 0.2 * (2.0 * PI * 150.0 * t).sin();
            [quantize16(center + side), quantize16(center)]
        })
        .collect();
    let input = AudioBuffer::new(samples, 2, rate);
    let left_in = channel(&input.samples, 0);

    let out = pipeline::run(
        &PipelineContext::new(config(RemovalStrategy::CenterChannelCancellation, 3.0, 2)),
        input,
    )
    .unwrap();
    assert_eq!(out.instrumental.frames(), frames);
    assert!(out.notices.iter().all(|n| !matches!(n, Notice::FallbackApplied { .. })));

    let left = channel(&out.instrumental.samples, 0);
    let right = channel(&out.instrumental.samples, 1);

    assert_abs_diff_eq!(tone_amplitude(&left_in, 440.0, rate), 0.3, epsilon = 0.005);
    assert!(tone_amplitude(&left, 440.0, rate) < 0.003);
    assert!(tone_amplitude(&right, 440.0, rate) < 0.003);

    // α = 1 leaves L' = side and R' = -side.
    assert_abs_diff_eq!(tone_amplitude(&left, 150.0, rate), 0.2, epsilon = 0.004);
    assert_abs_diff_eq!(tone_amplitude(&right, 150.0, rate), 0.2, epsilon = 0.004);
}

#[test]
fn zero_beta_spectral_pass_reproduces_input_across_seams() {
    let rate = 16_000u32;
    let samples: Vec<f32> = (0..rate as usize * 7)
        .flat_map(|i| {
            let t = i as f32 / rate as f32;
            let a = 0.4 * (2.0 * PI * 523.0 * t).sin();
            let b = 0.3 * (2.0 * PI * 97.0 * t).cos();
            [a + b, a - b]
        })
        .collect();
    let input = AudioBuffer::new(samples, 2, rate);

    for mode in [OverlapMode::Trim, OverlapMode::Crossfade] {
        let cfg = PipelineConfig {
            removal: RemovalParams {
                beta: 0.0,
                ..RemovalParams::default()
            },
            overlap_mode: mode,
            ..config(RemovalStrategy::SpectralSubtraction, 2.0, 1)
        };
        let out = pipeline::run(&PipelineContext::new(cfg), input.clone()).unwrap();
        assert_eq!(out.instrumental.samples.len(), input.samples.len());
        for (a, b) in input.samples.iter().zip(&out.instrumental.samples) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }
}

#[test]
fn parallel_and_sequential_passes_agree() {
    let rate = 22_050u32;
    let samples: Vec<f32> = (0..rate as usize * 9)
        .flat_map(|i| {
            let t = i as f32 / rate as f32;
            let vocal = if (t % 2.0) < 1.2 {
                0.35 * (2.0 * PI * 660.0 * t).sin()
            } else {
                0.0
            };
            let bass = 0.2 * (2.0 * PI * 70.0 * t).sin();
            [vocal + bass, vocal - 0.5 * bass]
        })
        .collect();
    let input = AudioBuffer::new(samples, 2, rate);

    for strategy in [
        RemovalStrategy::CenterChannelCancellation,
        RemovalStrategy::SpectralSubtraction,
    ] {
        let seq = pipeline::run(&PipelineContext::new(config(strategy, 2.0, 1)), input.clone())
            .unwrap();
        let par = pipeline::run(&PipelineContext::new(config(strategy, 2.0, 4)), input.clone())
            .unwrap();
        assert_eq!(seq.instrumental, par.instrumental, "{strategy:?}");
        assert_eq!(seq.cues, par.cues, "{strategy:?}");
        assert_eq!(seq.notices, par.notices, "{strategy:?}");
    }
}

#[test]
fn vocal_run_across_a_seam_yields_one_cue() {
    let input = mono_burst(6.0, 1.5, 2.8, 16_000);
    let out = pipeline::run(
        &PipelineContext::new(config(RemovalStrategy::SpectralSubtraction, 2.0, 2)),
        input,
    )
    .unwrap();

    assert!(!out.fallback_used);
    assert_eq!(out.cues.len(), 1, "{:?}", out.cues);
    assert_abs_diff_eq!(out.cues[0].start, 1.5, epsilon = 0.02);
    assert_abs_diff_eq!(out.cues[0].end, 2.8, epsilon = 0.02);
}

#[test]
fn silent_input_gets_evenly_spaced_placeholder_cues() {
    let input = AudioBuffer::new(vec![0.0; 16_000 * 10 * 2], 2, 16_000);
    let cfg = PipelineConfig {
        timeline: TimelineConfig {
            placeholder_interval_secs: 3.0,
            ..TimelineConfig::default()
        },
        ..config(RemovalStrategy::Combined, 4.0, 1)
    };
    let out = pipeline::run(&PipelineContext::new(cfg), input).unwrap();

    assert!(out.fallback_used);
    let bounds: Vec<(f64, f64)> = out.cues.iter().map(|c| (c.start, c.end)).collect();
    assert_eq!(bounds, vec![(0.0, 3.0), (3.0, 6.0), (6.0, 9.0), (9.0, 10.0)]);
    assert!(out
        .notices
        .iter()
        .any(|n| matches!(n, Notice::DetectorLowConfidence { placeholder_cues: 4, .. })));
}

#[test]
fn combined_strategy_output_is_bounded_and_cues_are_ordered() {
    let rate = 16_000u32;
    let samples: Vec<f32> = (0..rate as usize * 12)
        .flat_map(|i| {
            let t = i as f32 / rate as f32;
            let gate = if (t % 3.0) < 1.5 { 1.0 } else { 0.0 };
            let vocal = gate * 0.6 * (2.0 * PI * 880.0 * t).sin();
            let guitar = 0.3 * (2.0 * PI * 196.0 * t).sin();
            [vocal + guitar, vocal + 0.4 * guitar]
        })
        .collect();
    let input = AudioBuffer::new(samples, 2, rate);
    let out = pipeline::run(
        &PipelineContext::new(config(RemovalStrategy::Combined, 5.0, 4)),
        input,
    )
    .unwrap();

    assert!(out
        .instrumental
        .samples
        .iter()
        .all(|s| s.is_finite() && s.abs() <= 1.0));
    assert!(!out.cues.is_empty());
    for pair in out.cues.windows(2) {
        assert!(pair[0].start < pair[1].start);
        assert!(pair[0].end <= pair[1].start);
    }
}

#[test]
fn mono_input_records_center_fallback_per_chunk() {
    let input = mono_burst(5.0, 1.0, 3.0, 16_000);
    let out = pipeline::run(
        &PipelineContext::new(config(RemovalStrategy::CenterChannelCancellation, 2.0, 1)),
        input.clone(),
    )
    .unwrap();
    let fallbacks: Vec<usize> = out
        .notices
        .iter()
        .filter_map(|n| match n {
            Notice::FallbackApplied { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        })
        .collect();
    assert_eq!(fallbacks, vec![0, 1, 2]);
    assert_eq!(out.instrumental.samples, input.samples);
}

#[test]
fn cancel_from_another_thread_stops_between_chunks() {
    let engine = Arc::new(KaraokeEngine::new(config(RemovalStrategy::Combined, 0.5, 1)));
    let mut progress = engine.subscribe_progress();

    let canceller = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            if progress.blocking_recv().is_ok() {
                engine.cancel();
            }
        })
    };

    let input = AudioBuffer::new(vec![0.1; 16_000 * 60 * 2], 2, 16_000);
    let result = engine.process(input);
    canceller.join().unwrap();

    match result {
        Err(KaraokeError::Cancelled { chunks_done }) => {
            assert!(chunks_done >= 1 && chunks_done < 120, "chunks_done={chunks_done}");
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(engine.status(), EngineStatus::Cancelled);
    assert!(!engine.is_running());
}

#[tokio::test]
async fn async_entry_point_runs_on_blocking_pool() {
    let engine = Arc::new(KaraokeEngine::new(config(
        RemovalStrategy::SpectralSubtraction,
        2.0,
        2,
    )));
    let mut status = engine.subscribe_status();

    let out = Arc::clone(&engine)
        .process_async(mono_burst(4.0, 0.5, 2.5, 16_000))
        .await
        .unwrap();

    assert_eq!(out.cues.len(), 1);
    assert_eq!(status.recv().await.unwrap().status, EngineStatus::Processing);
    assert_eq!(status.recv().await.unwrap().status, EngineStatus::Completed);

    let report = serde_json::to_value(out.report()).unwrap();
    assert_eq!(report["strategy"], "spectralSubtraction");
    assert_eq!(report["display"]["fontSize"], 24);
    assert!(report["cues"][0]["start"].is_number());
    assert_eq!(report["diagnostics"]["chunksProcessed"], 2);
}

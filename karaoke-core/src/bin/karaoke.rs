use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use karaoke_core::{
    audio::wav::{read_wav, write_wav},
    buffering::OverlapMode,
    subtitles::write_subtitles,
    KaraokeEngine, PipelineConfig, RemovalStrategy,
};
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("karaoke=info,karaoke_core=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("karaoke failed: {e:#}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    subtitles: PathBuf,
    report: Option<PathBuf>,
    config: Option<PathBuf>,
    strategy: Option<RemovalStrategy>,
    workers: Option<usize>,
    crossfade: bool,
}

const USAGE: &str = "Usage: karaoke <input.wav> [--out <instrumental.wav>] [--subs <lyrics.srt|.vtt>]
               [--strategy center|spectral|adaptive|combined] [--config <pipeline.json>]
               [--workers <n>] [--crossfade] [--report <report.json>]";

fn parse_args() -> anyhow::Result<Args> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut subtitles: Option<PathBuf> = None;
    let mut report: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut strategy: Option<RemovalStrategy> = None;
    let mut workers: Option<usize> = None;
    let mut crossfade = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--out" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --out");
                };
                output = Some(PathBuf::from(v));
            }
            "--subs" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --subs");
                };
                subtitles = Some(PathBuf::from(v));
            }
            "--report" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --report");
                };
                report = Some(PathBuf::from(v));
            }
            "--config" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --config");
                };
                config = Some(PathBuf::from(v));
            }
            "--strategy" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --strategy");
                };
                strategy = Some(v.parse::<RemovalStrategy>().map_err(anyhow::Error::msg)?);
            }
            "--workers" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --workers");
                };
                workers = Some(
                    v.parse::<usize>()
                        .map_err(|_| anyhow::anyhow!("invalid value for --workers"))?,
                );
            }
            "--crossfade" => crossfade = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown argument: {other}\n{USAGE}"),
            other => {
                if input.is_some() {
                    bail!("unexpected extra input: {other}");
                }
                input = Some(PathBuf::from(other));
            }
        }
    }

    let Some(input) = input else {
        bail!("missing input file\n{USAGE}");
    };
    let output = output.unwrap_or_else(|| sibling(&input, "_instrumental.wav"));
    let subtitles = subtitles.unwrap_or_else(|| sibling(&input, ".srt"));
    Ok(Args {
        input,
        output,
        subtitles,
        report,
        config,
        strategy,
        workers,
        crossfade,
    })
}

/// `<dir>/<stem><suffix>` next to `input`.
fn sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{stem}{suffix}"))
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let started = Instant::now();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.crossfade {
        config.overlap_mode = OverlapMode::Crossfade;
    }
    config.normalize();

    let audio = read_wav(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let engine = KaraokeEngine::new(config);
    let output = engine.process(audio)?;

    write_wav(&args.output, &output.instrumental)
        .with_context(|| format!("writing {}", args.output.display()))?;
    write_subtitles(&args.subtitles, &output.cues)
        .with_context(|| format!("writing {}", args.subtitles.display()))?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&output.report())?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    for notice in &output.notices {
        let json = serde_json::to_string(notice)?;
        match notice.chunk_index() {
            Some(chunk) => eprintln!("notice [chunk {chunk}]: {json}"),
            None => eprintln!("notice: {json}"),
        }
    }
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        cues = output.cues.len(),
        fallback = output.fallback_used,
        "done"
    );
    Ok(())
}

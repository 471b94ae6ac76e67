//! Pipeline configuration (JSON, camelCase, every field optional).

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::buffering::{ChunkConfig, OverlapMode};
use crate::error::Result;
use crate::removal::{AdaptiveReset, RemovalParams, RemovalStrategy};
use crate::subtitles::TimelineConfig;
use crate::vad::DetectorConfig;

const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PipelineConfig {
    pub strategy: RemovalStrategy,
    pub removal: RemovalParams,
    pub chunking: ChunkConfig,
    pub detector: DetectorConfig,
    pub timeline: TimelineConfig,
    pub overlap_mode: OverlapMode,
    pub adaptive_reset: AdaptiveReset,
    /// Worker threads for chunk-independent stages; 0 = one per core.
    pub workers: usize,
    pub display: DisplayOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: RemovalStrategy::default(),
            removal: RemovalParams::default(),
            chunking: ChunkConfig::default(),
            detector: DetectorConfig::default(),
            timeline: TimelineConfig::default(),
            overlap_mode: OverlapMode::default(),
            adaptive_reset: AdaptiveReset::default(),
            workers: 0,
            display: DisplayOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn normalize(&mut self) {
        self.removal.normalize();
        self.chunking.normalize();
        self.detector.normalize();
        self.timeline.normalize();
        self.workers = self.workers.min(MAX_WORKERS);
        if let AdaptiveReset::EveryChunks(n) = self.adaptive_reset {
            self.adaptive_reset = AdaptiveReset::EveryChunks(n.max(1));
        }
    }

    /// Read and normalize a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Worker count actually used: the configured value (or the core count
    /// when 0), capped by `KARAOKE_WORKERS` when set.
    pub fn resolved_workers(&self) -> usize {
        let configured = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        };
        let capped = match env_worker_cap() {
            Some(cap) => configured.min(cap),
            None => configured,
        };
        capped.clamp(1, MAX_WORKERS)
    }
}

fn env_worker_cap() -> Option<usize> {
    static WORKER_CAP: OnceLock<Option<usize>> = OnceLock::new();
    *WORKER_CAP.get_or_init(|| {
        std::env::var("KARAOKE_WORKERS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|v| v.clamp(1, MAX_WORKERS))
    })
}

/// Rendering hints for whatever burns the subtitles in. Not interpreted here;
/// copied verbatim into the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct DisplayOptions {
    pub font_size: u32,
    pub font_name: Option<String>,
    pub primary_colour: Option<String>,
    /// Unrecognised keys, kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            font_size: 24,
            font_name: None,
            primary_colour: None,
            extra: serde_json::Map::new(),
        }
    }
}

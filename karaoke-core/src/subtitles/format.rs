//! SRT and WebVTT rendering.

use std::path::Path;

use tracing::info;

use super::SubtitleCue;
use crate::error::Result;

/// Render cues as SubRip: 1-based index, `HH:MM:SS,mmm --> HH:MM:SS,mmm`, text.
pub fn to_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();
    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            timestamp(cue.start, ','),
            timestamp(cue.end, ','),
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }
    output
}

/// Render cues as WebVTT.
pub fn to_vtt(cues: &[SubtitleCue]) -> String {
    let mut output = String::from("WEBVTT\n\n");
    for cue in cues {
        output.push_str(&format!(
            "{} --> {}\n",
            timestamp(cue.start, '.'),
            timestamp(cue.end, '.'),
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }
    output
}

/// Write cues to `path`; `.vtt` gets WebVTT, anything else SRT.
pub fn write_subtitles(path: &Path, cues: &[SubtitleCue]) -> Result<()> {
    let vtt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("vtt"));
    let content = if vtt { to_vtt(cues) } else { to_srt(cues) };
    std::fs::write(path, content)?;
    info!(path = %path.display(), cues = cues.len(), vtt, "subtitles written");
    Ok(())
}

/// `HH:MM:SS<sep>mmm`, rounded to the nearest millisecond.
fn timestamp(secs: f64, sep: char) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}{sep}{millis:03}")
}

//! WAV read/write via `hound`.
//!
//! Stands in for the external decoder/encoder when the core is driven from the
//! `karaoke` binary. Integer PCM is scaled to [-1.0, 1.0] on read; output is
//! always 16-bit PCM.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::info;

use crate::audio::AudioBuffer;
use crate::error::{KaraokeError, Result};

/// Read a PCM or float WAV file into an interleaved [`AudioBuffer`].
///
/// # Errors
/// `Wav` for unreadable files, `InvalidAudio` for unsupported bit depths.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(KaraokeError::InvalidAudio(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    info!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "read audio"
    );

    Ok(AudioBuffer::new(samples, spec.channels, spec.sample_rate))
}

/// Write `audio` as 16-bit PCM WAV, clamping to the representable range.
pub fn write_wav<P: AsRef<Path>>(path: P, audio: &AudioBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for sample in &audio.samples {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    info!(
        path = %path.as_ref().display(),
        frames = audio.frames(),
        "wrote instrumental audio"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit_round_trip_within_quantization() {
        let dir = std::env::temp_dir().join(format!("karaoke-wav-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.wav");

        let original = AudioBuffer::new(vec![0.0, 0.5, -0.5, 0.25, 1.0, -1.0], 2, 22_050);
        write_wav(&path, &original).unwrap();
        let back = read_wav(&path).unwrap();

        assert_eq!(back.channels, 2);
        assert_eq!(back.sample_rate, 22_050);
        assert_eq!(back.samples.len(), original.samples.len());
        for (a, b) in original.samples.iter().zip(&back.samples) {
            assert!((a - b).abs() < 1.0 / 16_000.0, "{a} vs {b}");
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}

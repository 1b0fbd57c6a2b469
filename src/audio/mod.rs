//! Audio decoding and the shared normalization applied before feature extraction
//!
//! Enrollment and verification features are only comparable when both sides go
//! through [`normalize`]: mono downmix, resampling to 44.1 kHz, then scaling
//! into the signed 16-bit range.

use anyhow::{bail, Context, Result};
use rubato::{FftFixedIn, Resampler};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Fixed analysis sample rate for all feature extraction (44.1 kHz)
pub const ANALYSIS_SAMPLE_RATE: u32 = 44_100;

/// Scale factor from unit float samples to the i16 range
const I16_SCALE: f32 = 32768.0;

/// Resampler input chunk size (frames)
const RESAMPLE_CHUNK: usize = 1024;

/// Raw decoded audio: interleaved float samples in [-1.0, 1.0]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Duration in milliseconds (rough: frames / rate * 1000)
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Normalized signal handed to capabilities: mono i16 at [`ANALYSIS_SAMPLE_RATE`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Pcm {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a WAV file from disk
pub fn decode_wav(path: &Path) -> Result<RawAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    decode_wav_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to decode WAV: {}", path.display()))
}

/// Decode WAV data from any reader (integer PCM or 32-bit float)
pub fn decode_wav_reader<R: Read>(reader: R) -> Result<RawAudio> {
    let mut wav = hound::WavReader::new(reader).context("Invalid WAV header")?;
    let spec = wav.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                bail!("Unsupported bit depth: {}", spec.bits_per_sample);
            }
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            wav.samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read integer samples")?
        }
    };

    log::debug!(
        "Decoded WAV: {} Hz, {} ch, {} bits, {} samples",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        samples.len()
    );

    Ok(RawAudio::new(samples, spec.sample_rate, spec.channels))
}

/// Normalize raw audio for feature extraction
pub fn normalize(raw: &RawAudio) -> Result<Pcm> {
    if raw.channels == 0 {
        bail!("Audio has zero channels");
    }
    if raw.sample_rate == 0 {
        bail!("Audio has zero sample rate");
    }

    let mono = downmix(&raw.samples, raw.channels as usize);

    let resampled = if raw.sample_rate == ANALYSIS_SAMPLE_RATE || mono.is_empty() {
        mono
    } else {
        resample(&mono, raw.sample_rate, ANALYSIS_SAMPLE_RATE)?
    };

    Ok(Pcm {
        samples: to_i16(&resampled),
        sample_rate: ANALYSIS_SAMPLE_RATE,
    })
}

/// Average interleaved channels into mono
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Resample a mono signal with an FFT resampler
fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>> {
    let mut resampler =
        FftFixedIn::<f32>::new(from_hz as usize, to_hz as usize, RESAMPLE_CHUNK, 2, 1)
            .context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let expected = samples.len() * to_hz as usize / from_hz as usize;
    let mut output = Vec::with_capacity(delay + expected + RESAMPLE_CHUNK);
    let mut pos = 0;

    while samples.len() - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: [&[f32]; 1] = [&samples[pos..pos + needed]];
        let block = resampler
            .process(&chunk[..], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&block[0]);
        pos += needed;
    }

    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let block = resampler
            .process_partial(Some(&tail[..]), None)
            .context("Resampling final block failed")?;
        output.extend_from_slice(&block[0]);
    }

    // Flush the filter so the last input samples reach the output
    while output.len() < delay + expected {
        let block = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .context("Resampling flush failed")?;
        output.extend_from_slice(&block[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    log::debug!(
        "Resampled {} Hz -> {} Hz: {} -> {} samples",
        from_hz,
        to_hz,
        samples.len(),
        output.len()
    );

    Ok(output)
}

/// Scale unit floats into i16, clipping out-of-range values
fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * I16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sine(freq: f32, rate: u32, ms: u32) -> Vec<f32> {
        let n = (rate * ms / 1000) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_normalize_scales_to_i16() {
        let raw = RawAudio::mono(vec![0.0, 0.5, -0.5, 1.0, -1.0], ANALYSIS_SAMPLE_RATE);
        let pcm = normalize(&raw).unwrap();

        assert_eq!(pcm.sample_rate, ANALYSIS_SAMPLE_RATE);
        assert_eq!(pcm.samples, vec![0, 16384, -16384, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_normalize_downmixes_stereo() {
        let raw = RawAudio::new(vec![0.5, 0.0, -0.25, -0.25], ANALYSIS_SAMPLE_RATE, 2);
        let pcm = normalize(&raw).unwrap();
        assert_eq!(pcm.samples, vec![8192, -8192]);
    }

    #[test]
    fn test_normalize_resamples_to_analysis_rate() {
        let raw = RawAudio::mono(sine(440.0, 16000, 500), 16000);
        let pcm = normalize(&raw).unwrap();

        assert_eq!(pcm.sample_rate, ANALYSIS_SAMPLE_RATE);
        // 500ms at 44.1kHz
        assert_eq!(pcm.samples.len(), 22050);
    }

    #[test]
    fn test_resample_drops_filter_delay() {
        // Silence then a step: the step must not be pushed later by the filter delay
        let mut input = vec![0.0f32; 8000];
        input.extend(std::iter::repeat(0.5f32).take(8000));
        let output = resample(&input, 16000, 44100).unwrap();

        assert_eq!(output.len(), 44100);
        let onset = output.iter().position(|&s| s > 0.25).unwrap();
        let step_at = 22050;
        assert!(
            onset.abs_diff(step_at) < 128,
            "step at {} landed at {}",
            step_at,
            onset
        );
        assert!(output[output.len() * 7 / 8] > 0.4);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = RawAudio::mono(sine(220.0, 22050, 300), 22050);
        assert_eq!(normalize(&raw).unwrap(), normalize(&raw).unwrap());
    }

    #[test]
    fn test_normalize_rejects_degenerate_format() {
        assert!(normalize(&RawAudio::new(vec![0.0], 44100, 0)).is_err());
        assert!(normalize(&RawAudio::new(vec![0.0], 0, 1)).is_err());
    }

    #[test]
    fn test_normalize_empty_audio() {
        let pcm = normalize(&RawAudio::mono(Vec::new(), 16000)).unwrap();
        assert!(pcm.is_empty());
    }

    #[test]
    fn test_decode_wav_int16() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0i16, 16384, -16384, i16::MAX] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        cursor.set_position(0);
        let raw = decode_wav_reader(cursor).unwrap();
        assert_eq!(raw.sample_rate, 44100);
        assert_eq!(raw.channels, 1);
        assert_eq!(raw.samples.len(), 4);
        assert!((raw.samples[1] - 0.5).abs() < 1e-6);

        // Decoding then normalizing restores the original i16 values
        let pcm = normalize(&raw).unwrap();
        assert_eq!(pcm.samples, vec![0, 16384, -16384, i16::MAX]);
    }

    #[test]
    fn test_decode_wav_rejects_garbage() {
        assert!(decode_wav_reader(Cursor::new(b"not a wav file".to_vec())).is_err());
    }

    #[test]
    fn test_duration_ms() {
        let raw = RawAudio::new(vec![0.0; 88200], 44100, 2);
        assert_eq!(raw.duration_ms(), 1000);
    }
}

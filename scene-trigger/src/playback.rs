/// WAV cue playback
///
/// Peripheral to triggering: failures here are reported to the caller, which
/// logs them and carries on. Also generates the steady sine cue the `term`
/// policy is meant to pick up.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use parking_lot::Mutex;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("WAV file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported WAV format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("No audio output device available")]
    NoOutputDevice,

    #[error("Output stream error: {0}")]
    Stream(String),
}

/// Decoded 16-bit PCM clip
#[derive(Debug, Clone)]
pub struct WavClip {
    /// Interleaved samples
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavClip {
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

/// Read a 16-bit integer PCM WAV file
pub fn load_wav(path: &Path) -> Result<WavClip, PlaybackError> {
    if !path.exists() {
        return Err(PlaybackError::NotFound(path.to_path_buf()));
    }

    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(PlaybackError::UnsupportedFormat(format!(
            "{:?} {}-bit (expected 16-bit integer PCM)",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;

    Ok(WavClip {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Write a mono 16-bit sine wave
pub fn write_sine_wav(
    path: &Path,
    frequency: f64,
    seconds: f64,
    sample_rate: u32,
    amplitude: i16,
) -> Result<(), PlaybackError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total = (sample_rate as f64 * seconds) as usize;

    for i in 0..total {
        let t = i as f64 / sample_rate as f64;
        let sample = amplitude as f64 * (2.0 * PI * frequency * t).sin();
        writer.write_sample(sample as i16)?;
    }

    writer.finalize()?;
    debug!("Wrote {} samples of {} Hz sine to {}", total, frequency, path.display());
    Ok(())
}

/// Play a WAV file on the default output device, blocking until it ends
pub fn play_wav(path: &Path) -> Result<(), PlaybackError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let clip = load_wav(path)?;
    let duration = clip.duration();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;

    let sample_format = device
        .default_output_config()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?
        .sample_format();

    let stream_config = cpal::StreamConfig {
        channels: clip.channels,
        sample_rate: cpal::SampleRate(clip.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cursor = Arc::new(Mutex::new(ClipCursor::new(clip.samples)));
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let on_error = |err: cpal::StreamError| tracing::warn!("Playback error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::I16 => {
            let cursor = Arc::clone(&cursor);
            let done_tx = done_tx.clone();
            device.build_output_stream(
                &stream_config,
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if cursor.lock().fill(out, |s| s) {
                        let _ = done_tx.send(());
                    }
                },
                on_error,
                None,
            )
        }
        cpal::SampleFormat::F32 => {
            let cursor = Arc::clone(&cursor);
            let done_tx = done_tx.clone();
            device.build_output_stream(
                &stream_config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if cursor.lock().fill(out, |s| s as f32 / i16::MAX as f32) {
                        let _ = done_tx.send(());
                    }
                },
                on_error,
                None,
            )
        }
        other => {
            return Err(PlaybackError::UnsupportedFormat(format!(
                "output device format {:?}",
                other
            )))
        }
    }
    .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    info!("Playing {} ({:.1}s)", path.display(), duration.as_secs_f64());

    // Generous margin; a stalled device should not hang the caller forever
    let _ = done_rx.recv_timeout(duration + Duration::from_secs(2));
    drop(stream);

    Ok(())
}

/// Read position inside a clip being played
struct ClipCursor {
    samples: Vec<i16>,
    position: usize,
}

impl ClipCursor {
    fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }

    /// Fill `out`, padding with silence past the end. Returns true once the
    /// clip has been fully consumed.
    fn fill<T: Default + Copy>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T) -> bool {
        for slot in out.iter_mut() {
            *slot = match self.samples.get(self.position) {
                Some(&s) => {
                    self.position += 1;
                    convert(s)
                }
                None => T::default(),
            };
        }
        self.position >= self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("14000Hz_sine.wav");

        match load_wav(&path) {
            Err(PlaybackError::NotFound(p)) => assert_eq!(p, path),
            other => panic!("Expected NotFound, got {:?}", other.map(|c| c.samples.len())),
        }
        assert!(matches!(play_wav(&path), Err(PlaybackError::NotFound(_))));
    }

    #[test]
    fn test_sine_roundtrip_properties() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cue.wav");

        write_sine_wav(&path, 1000.0, 0.5, 16_000, 10_000).unwrap();
        let clip = load_wav(&path).unwrap();

        assert_eq!(clip.channels, 1);
        assert_eq!(clip.sample_rate, 16_000);
        assert_eq!(clip.samples.len(), 8000);
        assert!((clip.duration().as_secs_f64() - 0.5).abs() < 1e-9);

        let peak = clip.samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 9_900 && peak <= 10_000);

        // A steady sine reads ~amplitude / sqrt(2)
        let rms = crate::loudness::compute_rms(&clip.samples);
        assert!((rms - 10_000.0 / 2f64.sqrt()).abs() < 50.0);
    }

    #[test]
    fn test_float_wav_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            load_wav(&path),
            Err(PlaybackError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_cursor_pads_with_silence() {
        let mut cursor = ClipCursor::new(vec![1, 2, 3]);

        let mut out = [9i16; 2];
        assert!(!cursor.fill(&mut out, |s| s));
        assert_eq!(out, [1, 2]);

        let mut out = [9i16; 3];
        assert!(cursor.fill(&mut out, |s| s));
        assert_eq!(out, [3, 0, 0]);
    }
}

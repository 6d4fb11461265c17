/// Microphone capture
///
/// [`AudioSource`] is the seam the sampling loop reads frames through.
/// [`CpalSource`] implements it on the default input device: the cpal
/// stream lives on a dedicated thread (streams are not `Send` on every
/// platform) and pushes samples into a [`CaptureBuffer`]; `read` waits on a
/// notification until a whole frame is buffered.

pub mod buffer;

pub use buffer::{AudioBufferError, CaptureBuffer};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Audio sample format (16-bit PCM)
pub type AudioSample = i16;

/// One sampling iteration's worth of samples
pub type Frame = Vec<AudioSample>;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_FRAME_SIZE: usize = 1024; // ~23ms at 44.1kHz

/// Frames of slack between the capture callback and the sampling loop
const BUFFERED_FRAMES: usize = 16;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device available")]
    NoInputDevice,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to open input stream: {0}")]
    Stream(String),

    #[error("Input device failed: {0}")]
    Device(String),

    #[error("No audio received for {0:?}")]
    Stalled(Duration),

    #[error("Frame size {0} exceeds capture buffer capacity {1}")]
    FrameTooLarge(usize, usize),

    #[error("Invalid audio configuration: {0}")]
    InvalidConfig(String),

    #[error("Audio source closed")]
    Closed,

    #[error(transparent)]
    Buffer(#[from] AudioBufferError),
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Samples per frame (one sampling iteration)
    pub frame_size: usize,

    /// How long `read` waits for samples before declaring the device dead
    pub stall_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            stall_timeout_ms: 2000,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfig(
                "sample_rate must be greater than 0".to_string(),
            ));
        }

        if self.frame_size == 0 {
            return Err(AudioError::InvalidConfig(
                "frame_size must be greater than 0".to_string(),
            ));
        }

        if self.stall_timeout_ms == 0 {
            return Err(AudioError::InvalidConfig(
                "stall_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Wall-clock duration of one frame
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }
}

/// Source of fixed-size sample frames
#[async_trait]
pub trait AudioSource: Send {
    /// Wait for the next `frame_size` samples.
    async fn read(&mut self, frame_size: usize) -> Result<Frame, AudioError>;

    /// Release the underlying device. Further reads fail with `Closed`.
    fn close(&mut self);
}

/// State shared with the cpal callbacks
struct CaptureShared {
    buffer: CaptureBuffer,
    notify: Notify,
    fault: Mutex<Option<String>>,
}

/// Default input device, mono, 16-bit
pub struct CpalSource {
    shared: Arc<CaptureShared>,
    stall_timeout: Duration,
    device_name: String,
    shutdown: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalSource {
    /// Open the default input device and start capturing
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        config.validate()?;

        let shared = Arc::new(CaptureShared {
            buffer: CaptureBuffer::with_capacity(config.frame_size * BUFFERED_FRAMES)?,
            notify: Notify::new(),
            fault: Mutex::new(None),
        });

        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<String, AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let worker_shared = Arc::clone(&shared);
        let worker_config = config.clone();
        let worker = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match start_capture_stream(&worker_config, worker_shared) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until close(); a dropped sender also ends the wait
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Capture stream released");
            })
            .map_err(|e| AudioError::Stream(format!("failed to spawn capture thread: {}", e)))?;

        let device_name = match ready_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(AudioError::Stream(
                    "capture thread exited before reporting".to_string(),
                ))
            }
        };

        info!(
            "Using microphone: {} ({} Hz, {} samples/frame)",
            device_name, config.sample_rate, config.frame_size
        );

        Ok(Self {
            shared,
            stall_timeout: config.stall_timeout(),
            device_name,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[async_trait]
impl AudioSource for CpalSource {
    async fn read(&mut self, frame_size: usize) -> Result<Frame, AudioError> {
        if self.worker.is_none() {
            return Err(AudioError::Closed);
        }

        let capacity = self.shared.buffer.capacity();
        if frame_size > capacity {
            return Err(AudioError::FrameTooLarge(frame_size, capacity));
        }

        loop {
            let fault = self.shared.fault.lock().take();
            if let Some(fault) = fault {
                return Err(AudioError::Device(fault));
            }

            if self.shared.buffer.len() >= frame_size {
                return Ok(self.shared.buffer.read(frame_size)?);
            }

            if tokio::time::timeout(self.stall_timeout, self.shared.notify.notified())
                .await
                .is_err()
            {
                return Err(AudioError::Stalled(self.stall_timeout));
            }
        }
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Capture thread panicked");
            }
            self.shared.buffer.clear();
            info!("Audio source closed");
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build and start the cpal input stream. Runs on the capture thread.
fn start_capture_stream(
    config: &AudioConfig,
    shared: Arc<CaptureShared>,
) -> Result<(cpal::Stream, String), AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AudioError::NoInputDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let sample_format = device
        .default_input_config()
        .map_err(|e| AudioError::Stream(e.to_string()))?
        .sample_format();

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_shared = Arc::clone(&shared);
    let on_error = move |err: cpal::StreamError| match err {
        cpal::StreamError::DeviceNotAvailable => {
            error!("Input device no longer available");
            *err_shared.fault.lock() = Some(err.to_string());
            err_shared.notify.notify_one();
        }
        other => warn!("Audio capture error: {}", other),
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                shared.buffer.write(data);
                shared.notify.notify_one();
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                shared.buffer.write(&converted);
                shared.notify.notify_one();
            },
            on_error,
            None,
        ),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }
    .map_err(|e| AudioError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::Stream(format!("failed to start stream: {}", e)))?;

    Ok((stream, name))
}

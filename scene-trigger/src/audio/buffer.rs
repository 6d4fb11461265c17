/// Capture buffer between the device callback and the sampling loop
///
/// The cpal callback thread writes, the sampling loop reads whole frames.
/// When the loop falls behind, the oldest samples are dropped so reads
/// always see recent audio. Both sides go through one short-lived lock.

use super::AudioSample;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Error, Debug)]
pub enum AudioBufferError {
    #[error("Buffer underflow: attempted to read {0} samples, but only {1} available")]
    Underflow(usize, usize),

    #[error("Invalid buffer size: {0}")]
    InvalidSize(usize),
}

/// Ring buffer for captured samples
pub struct CaptureBuffer {
    ring: Mutex<HeapRb<AudioSample>>,
}

impl CaptureBuffer {
    /// Create a buffer holding up to `capacity` samples
    pub fn with_capacity(capacity: usize) -> Result<Self, AudioBufferError> {
        if capacity == 0 {
            return Err(AudioBufferError::InvalidSize(capacity));
        }

        Ok(Self {
            ring: Mutex::new(HeapRb::new(capacity)),
        })
    }

    /// Write samples, dropping the oldest ones if there is not enough room.
    ///
    /// Returns the number of samples written.
    pub fn write(&self, samples: &[AudioSample]) -> usize {
        let mut ring = self.ring.lock();

        // Anything beyond capacity can never be read; keep only the tail
        let capacity = ring.capacity().get();
        let samples = if samples.len() > capacity {
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let available_space = ring.vacant_len();
        if samples.len() > available_space {
            let to_drop = samples.len() - available_space;
            ring.skip(to_drop);
            warn!("Sampling loop behind, dropped {} oldest samples", to_drop);
        }

        let written = ring.push_slice(samples);
        trace!("Wrote {} samples to capture buffer", written);
        written
    }

    /// Read and remove exactly `count` samples
    pub fn read(&self, count: usize) -> Result<Vec<AudioSample>, AudioBufferError> {
        let mut ring = self.ring.lock();
        let available = ring.occupied_len();

        if count > available {
            return Err(AudioBufferError::Underflow(count, available));
        }

        let mut frame = vec![0; count];
        let read = ring.pop_slice(&mut frame);
        frame.truncate(read);
        Ok(frame)
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.ring.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity().get()
    }

    /// Discard everything buffered
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        let occupied = ring.occupied_len();
        ring.skip(occupied);
    }
}

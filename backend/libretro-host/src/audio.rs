//! Audio sample sink.
//!
//! The plug-in pushes interleaved stereo i16 samples during `retro_run`; a
//! toolkit-owned audio thread drains them through [`AudioRingHandle`]. The
//! mutex-guarded ring is the only structure in the host that crosses threads.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

#[derive(Debug, Clone)]
pub struct AudioRingHandle {
    ring: Arc<Mutex<VecDeque<i16>>>,
}

impl AudioRingHandle {
    /// Move up to `out.len()` queued samples into `out`, returning how many
    /// were written. Called from the audio thread.
    #[allow(clippy::missing_panics_doc)]
    pub fn drain_into(&self, out: &mut [i16]) -> usize {
        let mut ring = self.ring.lock().unwrap();
        let count = out.len().min(ring.len());
        for sample in &mut out[..count] {
            *sample = ring.pop_front().unwrap();
        }
        count
    }

    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn queued_samples(&self) -> usize {
        self.ring.lock().unwrap().len()
    }
}

#[derive(Debug)]
pub(crate) struct AudioSink {
    ring: Arc<Mutex<VecDeque<i16>>>,
    capacity_samples: usize,
    enabled: bool,
}

impl AudioSink {
    pub fn new(enabled: bool, buffer_ms: u32) -> Self {
        let mut sink = Self {
            ring: Arc::new(Mutex::new(VecDeque::new())),
            capacity_samples: 0,
            enabled,
        };
        sink.configure(DEFAULT_SAMPLE_RATE, buffer_ms);
        sink
    }

    /// Pre-size the ring from the plug-in's reported sample rate and the
    /// configured buffer length.
    pub fn configure(&mut self, sample_rate: f64, buffer_ms: u32) {
        let sample_rate = if sample_rate > 0.0 { sample_rate } else { DEFAULT_SAMPLE_RATE };
        // Stereo interleaved, so two entries per frame
        self.capacity_samples =
            ((sample_rate * f64::from(buffer_ms) / 1000.0).ceil() as usize).max(1) * 2;

        let mut ring = self.ring.lock().unwrap();
        let additional = self.capacity_samples.saturating_sub(ring.capacity());
        ring.reserve(additional);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.ring.lock().unwrap().clear();
        }
    }

    pub fn push_pair(&self, left: i16, right: i16) {
        if !self.enabled {
            return;
        }

        let mut ring = self.ring.lock().unwrap();
        // Drop the oldest samples rather than the newest; latency bounded by
        // the configured buffer length
        while ring.len() + 2 > self.capacity_samples {
            ring.pop_front();
        }
        ring.push_back(left);
        ring.push_back(right);
    }

    pub fn push_batch(&self, samples: &[i16]) {
        if !self.enabled || samples.is_empty() {
            return;
        }

        let mut ring = self.ring.lock().unwrap();
        let keep = samples.len().min(self.capacity_samples);
        while ring.len() + keep > self.capacity_samples {
            ring.pop_front();
        }
        ring.extend(&samples[samples.len() - keep..]);
    }

    pub fn handle(&self) -> AudioRingHandle {
        AudioRingHandle { ring: Arc::clone(&self.ring) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_bounded() {
        let mut sink = AudioSink::new(true, 1);
        sink.configure(1000.0, 1);
        // capacity = ceil(1000 * 1 / 1000) * 2 = 2 samples
        sink.push_pair(1, 2);
        sink.push_pair(3, 4);

        let handle = sink.handle();
        assert_eq!(handle.queued_samples(), 2);

        let mut out = [0; 4];
        assert_eq!(handle.drain_into(&mut out), 2);
        assert_eq!(&out[..2], &[3, 4]);
    }

    #[test]
    fn disabled_sink_drops_samples() {
        let sink = AudioSink::new(false, 50);
        sink.push_pair(1, 2);
        sink.push_batch(&[3, 4, 5, 6]);
        assert_eq!(sink.handle().queued_samples(), 0);
    }
}

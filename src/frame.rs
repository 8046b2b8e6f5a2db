//! Sampled video frames.
//!
//! - `Frame`: owned pixel buffer for one sampled frame. Bytes are private.
//! - `FrameGeometry`: pixel dimensions, the only part of a frame the overlay sees.
//!
//! A frame is captured once per detection cycle and handed to the detector
//! worker. Pixels are zeroized when the frame is dropped.

use anyhow::Result;
use std::time::{Duration, Instant};
use zeroize::Zeroize;

use crate::detect::{DetectionSet, DetectorBackend};

/// Pixel dimensions of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One decoded frame, read from a single device.
///
/// There is no `Clone` and no byte accessor; detectors receive the pixels
/// through `run_detector` only.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Device the frame was read from.
    pub device_id: String,
    captured_at: Instant,
}

impl Frame {
    /// Called only by frame sources.
    pub(crate) fn new(data: Vec<u8>, width: u32, height: u32, device_id: &str) -> Self {
        Self {
            data,
            width,
            height,
            device_id: device_id.to_string(),
            captured_at: Instant::now(),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Run a detector on this frame. The detector only borrows the pixels.
    pub fn run_detector(&self, detector: &mut dyn DetectorBackend) -> Result<DetectionSet> {
        detector.detect(&self.data, self.width, self.height)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

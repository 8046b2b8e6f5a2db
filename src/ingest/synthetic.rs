//! Synthetic camera.
//!
//! Generates patterned frames for any enumerated device. Used by tests and by
//! `sentryd` when no hardware source is configured. Devices listed in
//! `denied` refuse access on bind, the way a camera does when the user
//! declines the permission prompt.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::{CameraDevice, FrameSource, StaticCatalog};
use crate::error::SentryError;
use crate::frame::Frame;

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    pub devices: Vec<CameraDevice>,
    pub width: u32,
    pub height: u32,
    /// Time between bind and the first decoded frame.
    pub warmup: Duration,
    /// Device ids that refuse access.
    pub denied: Vec<String>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            devices: vec![CameraDevice::new("synthetic:0", "Synthetic camera")],
            width: 640,
            height: 480,
            warmup: Duration::from_millis(300),
            denied: Vec::new(),
        }
    }
}

/// Frame statistics for a synthetic camera.
#[derive(Clone, Debug, Default)]
pub struct SyntheticStats {
    pub frames_captured: u64,
    pub binds: u64,
    pub device_id: Option<String>,
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    bound: Option<Binding>,
    frame_count: u64,
    binds: u64,
}

struct Binding {
    device_id: String,
    bound_at: Instant,
    /// Per-device offset so a device switch changes the picture.
    scene_state: u8,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Self {
        Self {
            config,
            bound: None,
            frame_count: 0,
            binds: 0,
        }
    }

    /// Catalog listing this camera's devices.
    pub fn catalog(&self) -> StaticCatalog {
        StaticCatalog::new(self.config.devices.clone())
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_captured: self.frame_count,
            binds: self.binds,
            device_id: self.bound.as_ref().map(|b| b.device_id.clone()),
        }
    }

    fn generate_synthetic_pixels(&self, scene_state: u8) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn bind(&mut self, device_id: &str) -> Result<(), SentryError> {
        self.release();

        let Some(index) = self
            .config
            .devices
            .iter()
            .position(|d| d.device_id == device_id)
        else {
            return Err(SentryError::UnknownDevice {
                device_id: device_id.to_string(),
            });
        };
        if self.config.denied.iter().any(|d| d == device_id) {
            return Err(SentryError::DeviceAccessDenied {
                device_id: device_id.to_string(),
            });
        }

        self.binds += 1;
        self.bound = Some(Binding {
            device_id: device_id.to_string(),
            bound_at: Instant::now(),
            scene_state: (index as u8).wrapping_mul(37),
        });
        log::info!("SyntheticCamera: bound to {} (synthetic)", device_id);
        Ok(())
    }

    fn bound_device(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.device_id.as_str())
    }

    fn is_ready(&self) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|b| b.bound_at.elapsed() >= self.config.warmup)
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        if !self.is_ready() {
            return Ok(None);
        }
        let Some(binding) = self.bound.as_ref() else {
            return Ok(None);
        };
        let scene_state = binding.scene_state;
        let device_id = binding.device_id.clone();

        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels(scene_state);
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            &device_id,
        )))
    }

    fn release(&mut self) {
        if let Some(binding) = self.bound.take() {
            log::debug!("SyntheticCamera: released {}", binding.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::DeviceCatalog;

    fn config() -> SyntheticCameraConfig {
        SyntheticCameraConfig {
            devices: vec![
                CameraDevice::new("cam-a", "A"),
                CameraDevice::new("cam-b", "B"),
            ],
            width: 4,
            height: 2,
            warmup: Duration::ZERO,
            denied: vec!["cam-b".to_string()],
        }
    }

    #[test]
    fn not_ready_until_bound() {
        let mut camera = SyntheticCamera::new(config());
        assert!(!camera.is_ready());
        assert!(camera.capture().unwrap().is_none());

        camera.bind("cam-a").unwrap();
        assert!(camera.is_ready());
        let frame = camera.capture().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(frame.device_id, "cam-a");
        assert_eq!(camera.stats().frames_captured, 1);
    }

    #[test]
    fn warmup_delays_readiness() {
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig {
            warmup: Duration::from_secs(60),
            ..config()
        });
        camera.bind("cam-a").unwrap();
        assert!(!camera.is_ready());
        assert!(camera.capture().unwrap().is_none());
    }

    #[test]
    fn denied_device_leaves_source_unbound() {
        let mut camera = SyntheticCamera::new(config());
        camera.bind("cam-a").unwrap();

        let err = camera.bind("cam-b").unwrap_err();
        assert_eq!(
            err,
            SentryError::DeviceAccessDenied {
                device_id: "cam-b".to_string()
            }
        );
        assert!(camera.bound_device().is_none());
        assert!(!camera.is_ready());

        assert!(matches!(
            camera.bind("cam-z"),
            Err(SentryError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn catalog_lists_configured_devices() {
        let camera = SyntheticCamera::new(config());
        let devices = camera.catalog().enumerate().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].device_id, "cam-b");
    }
}

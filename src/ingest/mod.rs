//! Camera frame sources and device enumeration.
//!
//! A `FrameSource` is bound to one camera device at a time and exposes the
//! current decoded frame once the stream is ready. A `DeviceCatalog` lists the
//! cameras the user can switch between.
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond handoff to the detection cycle
//! - Log pixel content

pub mod synthetic;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::SentryError;
use crate::frame::Frame;

pub use synthetic::{SyntheticCamera, SyntheticCameraConfig};

/// A video input device as reported by enumeration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub device_id: String,
    #[serde(default)]
    pub label: String,
}

impl CameraDevice {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
        }
    }

    /// Label for a device picker; unlabeled devices are numbered from 1.
    pub fn display_label(&self, index: usize) -> String {
        if self.label.trim().is_empty() {
            format!("Camera {}", index + 1)
        } else {
            self.label.clone()
        }
    }
}

/// Lists the video input devices available to the session.
pub trait DeviceCatalog: Send {
    fn enumerate(&self) -> Result<Vec<CameraDevice>>;
}

/// Fixed device list.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    devices: Vec<CameraDevice>,
}

impl StaticCatalog {
    pub fn new(devices: Vec<CameraDevice>) -> Self {
        Self { devices }
    }
}

impl DeviceCatalog for StaticCatalog {
    fn enumerate(&self) -> Result<Vec<CameraDevice>> {
        Ok(self.devices.clone())
    }
}

/// Source of decoded frames for the currently selected device.
pub trait FrameSource: Send {
    /// Bind the source to a device, releasing any previous one.
    ///
    /// A refused permission is reported as `SentryError::DeviceAccessDenied`
    /// and leaves the source unbound.
    fn bind(&mut self, device_id: &str) -> Result<(), SentryError>;

    /// Device currently bound, if any.
    fn bound_device(&self) -> Option<&str>;

    /// True once the bound stream is delivering decoded frames.
    fn is_ready(&self) -> bool;

    /// Read the current frame. Returns `None` while the source is not ready.
    fn capture(&mut self) -> Result<Option<Frame>>;

    /// Stop the stream.
    fn release(&mut self) {}
}

/// Pick the initial device: the preferred one if it is present, else the first.
pub fn select_initial_device<'a>(
    devices: &'a [CameraDevice],
    preferred: Option<&str>,
) -> Result<&'a CameraDevice, SentryError> {
    if let Some(preferred) = preferred {
        if let Some(device) = devices.iter().find(|d| d.device_id == preferred) {
            return Ok(device);
        }
        log::warn!(
            "preferred camera '{}' not found, falling back to first device",
            preferred
        );
    }
    devices.first().ok_or(SentryError::NoCameraDevices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<CameraDevice> {
        vec![
            CameraDevice::new("front", "Front door"),
            CameraDevice::new("rear", ""),
        ]
    }

    #[test]
    fn unlabeled_devices_are_numbered() {
        let devices = devices();
        assert_eq!(devices[0].display_label(0), "Front door");
        assert_eq!(devices[1].display_label(1), "Camera 2");
    }

    #[test]
    fn initial_device_prefers_configured_id() {
        let devices = devices();
        assert_eq!(
            select_initial_device(&devices, Some("rear")).unwrap().device_id,
            "rear"
        );
        assert_eq!(
            select_initial_device(&devices, Some("side")).unwrap().device_id,
            "front"
        );
        assert_eq!(select_initial_device(&devices, None).unwrap().device_id, "front");
        assert_eq!(
            select_initial_device(&[], None).unwrap_err(),
            SentryError::NoCameraDevices
        );
    }
}

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::DetectionSet;

/// Backend that never detects anything. Useful for bring-up of a camera
/// without a model.
#[derive(Default)]
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionSet> {
        self.frames_seen += 1;
        Ok(DetectionSet::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_reports_nothing() {
        let mut backend = StubBackend::new();
        let set = backend.detect(b"frame1", 10, 10).unwrap();
        assert!(set.is_empty());
        assert_eq!(backend.frames_seen(), 1);
    }
}

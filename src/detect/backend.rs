use anyhow::Result;

use crate::detect::result::DetectionSet;

/// Object detector backend.
///
/// The sentry treats the detector as opaque: pixels go in, a `DetectionSet`
/// comes out. Backends run on a blocking worker thread, one call at a time.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// The pixel slice is only valid for the duration of the call.
    /// An `Err` marks the cycle as failed; it never stops the session.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionSet>;

    /// Optional warm-up hook (model load, first inference).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
